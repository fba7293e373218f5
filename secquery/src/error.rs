//! Secquery error types.

use serde::{Deserialize, Serialize};

/// Common error type used throughout.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Compute error in {op}: {message}")]
    Compute { op: String, message: String },

    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    #[error("Kernel error: {0}")]
    KernelError(String),

    #[error("Networking error: {0}")]
    Networking(String),

    #[error("Operator not registered: {0}")]
    UnknownOperator(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Test runtime error: {0}")]
    TestRuntime(String),
}

/// Coarse classification of an [`Error`].
///
/// Operator callers only ever need to tell these apart; the remaining
/// variants are infrastructure failures reported as `Other`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Compute,
    Unimplemented,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Compute { .. } => ErrorKind::Compute,
            Error::Unimplemented(_) => ErrorKind::Unimplemented,
            _ => ErrorKind::Other,
        }
    }

    /// Tag a failure raised inside one of the computation paths with the
    /// operator that was running.
    ///
    /// Backend failures become `Compute`; validation and unimplemented
    /// errors keep their kind.
    pub(crate) fn into_compute(self, op: &str) -> Error {
        match self {
            Error::KernelError(message) | Error::Networking(message) => Error::Compute {
                op: op.to_string(),
                message,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_errors_become_compute_errors() {
        let err = Error::KernelError("divide by zero".to_string()).into_compute("IntDiv");
        assert_eq!(err.kind(), ErrorKind::Compute);
        assert_eq!(err.to_string(), "Compute error in IntDiv: divide by zero");
    }

    #[test]
    fn unimplemented_keeps_its_kind() {
        let err = Error::Unimplemented("Mod".to_string()).into_compute("Mod");
        assert_eq!(err.kind(), ErrorKind::Unimplemented);
    }
}
