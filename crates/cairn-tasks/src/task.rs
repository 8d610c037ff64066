//! The unit of work the scheduler executes

use thiserror::Error;

use crate::progress::Progress;

/// One build step.
///
/// A task's `run` performs the actual work: typically it folds its inputs
/// into a determinant hash, asks the stash for a matching artifact, and only
/// does real work on a miss. On success the task must have driven its
/// progress record to a finished state before returning; the scheduler
/// treats "returned without signalling completion" as a protocol violation
/// and asserts.
pub trait Task: Send + Sync + 'static {
    /// Execute the task, reporting through `progress`
    fn run(&self, progress: &mut Progress) -> Result<(), TaskError>;
}

/// Failure of a supplied build action.
///
/// Cloneable so a run's resolution can be observed by any number of waiters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TaskError(String);

impl TaskError {
    /// Create a task error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// The failure message
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}
