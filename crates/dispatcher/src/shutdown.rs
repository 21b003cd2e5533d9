//! Shutdown coordination
//!
//! - `ShutdownTrigger`: fires every worker's stop token, exactly once
//! - `CompletionBarrier`: the N+1 worker join handles
//! - `ShutdownCoordinator`: waits for a termination request, fires, joins

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use observability::StatsSummary;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::lifecycle::{StateCell, WorkerExit, WorkerOutcome, WorkerRole, WorkerState};

struct TriggerInner {
    fired: AtomicBool,
    done: CancellationToken,
    tokens: Vec<(String, CancellationToken)>,
}

/// Cloneable, idempotent stop signal for the whole graph
#[derive(Clone)]
pub struct ShutdownTrigger {
    inner: Arc<TriggerInner>,
}

impl ShutdownTrigger {
    /// One `(worker name, stop token)` pair per worker
    pub fn new(tokens: Vec<(String, CancellationToken)>) -> Self {
        Self {
            inner: Arc::new(TriggerInner {
                fired: AtomicBool::new(false),
                done: CancellationToken::new(),
                tokens,
            }),
        }
    }

    /// Cancel every stop token.
    ///
    /// Returns `false` if the trigger had already fired; nothing is re-signalled.
    pub fn fire(&self) -> bool {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            debug!("Shutdown already in progress");
            return false;
        }

        info!(workers = self.inner.tokens.len(), "Signalling stop to all workers");
        for (name, token) in &self.inner.tokens {
            debug!(worker = %name, "Stop token cancelled");
            token.cancel();
        }
        self.inner.done.cancel();
        true
    }

    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Resolves once `fire` has run
    pub async fn fired(&self) {
        self.inner.done.cancelled().await
    }

    pub fn worker_count(&self) -> usize {
        self.inner.tokens.len()
    }
}

impl fmt::Debug for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownTrigger")
            .field("workers", &self.worker_count())
            .field("fired", &self.is_fired())
            .finish()
    }
}

struct WorkerSlot {
    name: String,
    role: WorkerRole,
    state: StateCell,
    handle: Option<JoinHandle<WorkerOutcome>>,
    outcome: Option<WorkerOutcome>,
}

/// Outstanding worker completions
#[derive(Default)]
pub struct CompletionBarrier {
    slots: Vec<WorkerSlot>,
}

impl CompletionBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        role: WorkerRole,
        state: StateCell,
        handle: JoinHandle<WorkerOutcome>,
    ) {
        self.slots.push(WorkerSlot {
            name: name.into(),
            role,
            state,
            handle: Some(handle),
            outcome: None,
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots not yet released
    pub fn outstanding(&self) -> usize {
        self.slots.iter().filter(|s| s.outcome.is_none()).count()
    }

    pub fn states(&self) -> Vec<(String, WorkerState)> {
        self.slots
            .iter()
            .map(|s| (s.name.clone(), s.state.get()))
            .collect()
    }

    /// Wait for every worker to complete.
    ///
    /// Cancel safe: slots joined before a cancellation stay released.
    pub async fn join_all(&mut self) {
        for slot in &mut self.slots {
            let Some(handle) = slot.handle.as_mut() else {
                continue;
            };

            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(worker = %slot.name, error = %e, "Worker task panicked");
                    observability::record_worker_stopped(slot.role.as_str(), "panicked");
                    WorkerOutcome::new(WorkerExit::Panicked(e.to_string()))
                }
            };

            slot.handle = None;
            slot.state.advance(WorkerState::Stopped);
            debug!(worker = %slot.name, exit = %outcome.exit, "Barrier slot released");
            slot.outcome = Some(outcome);
        }
    }

    /// Per-worker report; call after `join_all`
    pub fn into_report(self) -> ShutdownReport {
        let workers = self
            .slots
            .into_iter()
            .map(|slot| {
                let outcome = slot.outcome.unwrap_or_else(|| {
                    if let Some(handle) = slot.handle {
                        handle.abort();
                    }
                    WorkerOutcome::new(WorkerExit::Failed("not joined".to_string()))
                });
                WorkerReport {
                    name: slot.name,
                    role: slot.role,
                    exit: outcome.exit,
                    latency: outcome.latency,
                }
            })
            .collect();
        ShutdownReport { workers }
    }
}

/// How one worker ended
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub name: String,
    pub role: WorkerRole,
    pub exit: WorkerExit,
    /// Delivery latency in ms (sinks only)
    pub latency: Option<StatsSummary>,
}

/// Completion report for all workers
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub workers: Vec<WorkerReport>,
}

impl ShutdownReport {
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// True when no worker failed or panicked
    pub fn is_clean(&self) -> bool {
        self.workers.iter().all(|w| w.exit.is_clean())
    }

    pub fn failures(&self) -> impl Iterator<Item = &WorkerReport> {
        self.workers.iter().filter(|w| !w.exit.is_clean())
    }
}

impl fmt::Display for ShutdownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for worker in &self.workers {
            write!(f, "{:<6} {:<16} {}", worker.role, worker.name, worker.exit)?;
            if let Some(latency) = &worker.latency {
                write!(f, "  latency_ms: {latency}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Stop trigger plus completion barrier
pub struct ShutdownCoordinator {
    trigger: ShutdownTrigger,
    barrier: CompletionBarrier,
}

impl ShutdownCoordinator {
    pub fn new(trigger: ShutdownTrigger, barrier: CompletionBarrier) -> Self {
        Self { trigger, barrier }
    }

    pub fn trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.barrier.len()
    }

    pub fn outstanding(&self) -> usize {
        self.barrier.outstanding()
    }

    pub fn states(&self) -> Vec<(String, WorkerState)> {
        self.barrier.states()
    }

    /// Wait for `signal` (or for every worker to end on its own), then shut down
    #[instrument(name = "shutdown_coordinator_run", skip_all, fields(workers = self.barrier.len()))]
    pub async fn run_until<F>(mut self, signal: F) -> ShutdownReport
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = signal => info!("Termination requested"),
            _ = self.barrier.join_all() => warn!("All workers exited before a stop was requested"),
        }
        self.shutdown().await
    }

    /// Fire the trigger and join every worker
    pub async fn shutdown(mut self) -> ShutdownReport {
        self.trigger.fire();
        self.barrier.join_all().await;

        let report = self.barrier.into_report();
        if report.is_clean() {
            info!(workers = report.len(), "All workers stopped");
        } else {
            for failure in report.failures() {
                error!(worker = %failure.name, role = %failure.role, exit = %failure.exit, "Worker ended with an error");
            }
        }
        report
    }
}
