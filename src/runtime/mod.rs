//! Batch runtime: sample store, worker pool, checkpoints and notifications.

pub mod config;
pub mod dispatch;
pub mod executor;
mod scheduler;
pub mod store;

use std::fmt;

pub use config::{RuntimeConfig, MAX_WORKERS};
pub use dispatch::{Callbacks, Completion, NoopObserver, Observer, Progress, RunSummary};
pub use executor::Runtime;
pub use store::{Claim, Disposition, SampleInfo, SampleStatus, SampleStore};

/// Lifecycle of a [`Runtime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Accepting samples, stages and checkpoints.
    Idle,
    /// Workers are driving samples.
    Running,
    /// Every sample was completed or failed.
    Completed,
    /// The run stopped after [`Runtime::cancel`].
    Cancelled,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
