//! Error type and status vocabulary shared by every fallible operation.

use crate::stage::StageError;

/// Result status codes.
///
/// Every [`Error`] maps onto one of these via [`Error::status`]. `NullPointer`
/// and `InvalidUtf8` are produced only by foreign-language bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Operation succeeded.
    Ok = 0,
    /// Null pointer was passed.
    NullPointer = 1,
    /// Invalid argument.
    InvalidArgument = 2,
    /// Array length mismatch.
    LengthMismatch = 3,
    /// Invalid UTF-8 string.
    InvalidUtf8 = 4,
    /// Runtime error.
    RuntimeError = 5,
    /// Operation was cancelled.
    Cancelled = 6,
    /// Resource not found.
    NotFound = 7,
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

/// Errors produced by the runtime, the sample store and the array primitives.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed argument (NaN threshold, empty input, bad configuration).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The three sample arrays differ in length.
    #[error("Array length mismatch: q={q_len}, intensity={intensity_len}, err={err_len}")]
    LengthMismatch {
        q_len: usize,
        intensity_len: usize,
        err_len: usize,
    },

    /// Caller-supplied output buffer has the wrong length.
    #[error("Output buffer length mismatch: expected {expected}, got {actual}")]
    BufferLength { expected: usize, actual: usize },

    /// A sample with this identifier is already in the store.
    #[error("Duplicate sample identifier: {0}")]
    DuplicateSample(String),

    /// No sample with this identifier is in the store.
    #[error("Sample not found: {0}")]
    NotFound(String),

    /// The sample is currently held by a worker.
    #[error("Sample {0} is being processed")]
    SampleBusy(String),

    /// Operation not allowed in the current run state.
    #[error("Operation `{operation}` not allowed while runtime is {state}")]
    InvalidState {
        operation: &'static str,
        state: crate::runtime::RunState,
    },

    /// Attempt to move a sample's stage backwards.
    #[error("Stage of sample {id} cannot go from {current} back to {requested}")]
    StageRegression {
        id: String,
        current: u32,
        requested: u32,
    },

    /// A stage function failed for one sample.
    #[error("Stage {stage} failed for sample {id}: {source}")]
    Stage {
        id: String,
        stage: u32,
        #[source]
        source: StageError,
    },

    /// The worker pool or dispatcher thread could not be started.
    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[source] std::io::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Map this error onto the status vocabulary.
    pub fn status(&self) -> Status {
        match self {
            Error::InvalidArgument(_)
            | Error::DuplicateSample(_)
            | Error::InvalidState { .. }
            | Error::Config(_) => Status::InvalidArgument,
            Error::LengthMismatch { .. } | Error::BufferLength { .. } => Status::LengthMismatch,
            Error::NotFound(_) => Status::NotFound,
            Error::SampleBusy(_)
            | Error::StageRegression { .. }
            | Error::Stage { .. }
            | Error::WorkerPool(_)
            | Error::Io(_) => Status::RuntimeError,
            Error::Cancelled => Status::Cancelled,
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RunState;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::DuplicateSample("a".into()).status(),
            Status::InvalidArgument
        );
        assert_eq!(
            Error::BufferLength {
                expected: 2,
                actual: 3
            }
            .status(),
            Status::LengthMismatch
        );
        assert_eq!(Error::NotFound("a".into()).status(), Status::NotFound);
        assert_eq!(
            Error::InvalidState {
                operation: "run",
                state: RunState::Running
            }
            .status(),
            Status::InvalidArgument
        );
        assert_eq!(
            Error::StageRegression {
                id: "a".into(),
                current: 3,
                requested: 1
            }
            .status(),
            Status::RuntimeError
        );
        assert_eq!(Error::Cancelled.status(), Status::Cancelled);
    }

    #[test]
    fn test_display() {
        let err = Error::LengthMismatch {
            q_len: 2,
            intensity_len: 3,
            err_len: 2,
        };
        assert_eq!(
            err.to_string(),
            "Array length mismatch: q=2, intensity=3, err=2"
        );
    }
}
