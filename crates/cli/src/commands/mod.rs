//! Command implementations.

mod run;
mod validate;

pub use run::run_fanout;
pub use validate::run_validate;
