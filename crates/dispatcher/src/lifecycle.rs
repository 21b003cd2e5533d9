//! Worker lifecycle: `Running -> Stopping -> Stopped`, single shot.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use observability::StatsSummary;

/// Worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum WorkerState {
    Running = 0,
    /// Stop token observed (or input closed), cleaning up
    Stopping = 1,
    /// Barrier slot released
    Stopped = 2,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Shared view of one worker's state.
///
/// Transitions only move forward; there is no restart.
#[derive(Debug, Clone, Default)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Advance to `state`; returns false if the worker was already there or past it
    pub fn advance(&self, state: WorkerState) -> bool {
        let previous = self.0.fetch_max(state as u8, Ordering::AcqRel);
        previous < state as u8
    }
}

/// Worker kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRole {
    Source,
    Sink,
}

impl WorkerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Sink => "sink",
        }
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// How a worker ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Stop token or end of input
    Clean,
    /// Gave up on an error
    Failed(String),
    /// Task panicked or was aborted
    Panicked(String),
}

impl WorkerExit {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Failed(_) => "failed",
            Self::Panicked(_) => "panicked",
        }
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => f.write_str("clean"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Panicked(reason) => write!(f, "panicked: {reason}"),
        }
    }
}

/// Value a worker task resolves to
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    pub exit: WorkerExit,
    /// Delivery latency in ms (sinks only)
    pub latency: Option<StatsSummary>,
}

impl WorkerOutcome {
    pub fn new(exit: WorkerExit) -> Self {
        Self {
            exit,
            latency: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_only_moves_forward() {
        let state = StateCell::new();
        assert_eq!(state.get(), WorkerState::Running);

        assert!(state.advance(WorkerState::Stopping));
        assert!(state.advance(WorkerState::Stopped));
        assert!(!state.advance(WorkerState::Stopping));
        assert!(!state.advance(WorkerState::Stopped));
        assert_eq!(state.get(), WorkerState::Stopped);
    }

    #[test]
    fn test_exit_status() {
        assert!(WorkerExit::Clean.is_clean());
        assert_eq!(WorkerExit::Failed("x".into()).status(), "failed");
        assert_eq!(
            WorkerExit::Panicked("boom".into()).to_string(),
            "panicked: boom"
        );
    }
}
