//! Stage trait definitions.

use crate::data::Sample;

/// What a stage reports about the rest of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// More stages may follow.
    Continue,
    /// This was the last stage for the sample.
    Final,
}

/// Error reported by a stage function.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StageError {
    message: String,
}

impl StageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<crate::error::Error> for StageError {
    fn from(err: crate::error::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// A pipeline step applied to one sample in place.
///
/// The runtime never inspects what a stage does; it only sequences calls and
/// tracks stage numbers. Any `Fn(&mut Sample) -> Result<StageOutcome, StageError>`
/// closure is a stage.
pub trait Stage: Send + Sync {
    /// Process a sample through this stage.
    fn process(&self, sample: &mut Sample) -> Result<StageOutcome, StageError>;

    /// Get the stage name.
    fn name(&self) -> &str {
        "anonymous"
    }
}

impl<F> Stage for F
where
    F: Fn(&mut Sample) -> Result<StageOutcome, StageError> + Send + Sync,
{
    fn process(&self, sample: &mut Sample) -> Result<StageOutcome, StageError> {
        self(sample)
    }
}
