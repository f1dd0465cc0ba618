use miette::Diagnostic;
use pakt_state::StateError;
use pakt_types::PkError;
use thiserror::Error;

/// A failure that ends a job: the typed error code plus the message the
/// user will see. Role entry points bubble these up with `?` and the
/// engine records them on the job.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
#[diagnostic(code(pakt_engine::job_failure))]
pub struct JobFailure {
    pub code: PkError,
    pub message: String,
}

impl JobFailure {
    pub fn new(code: PkError, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(PkError::InternalError, message)
    }
}

impl From<StateError> for JobFailure {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Cancelled => {
                Self::new(PkError::TransactionCancelled, "transaction was cancelled")
            }
            other => Self::internal(other.to_string()),
        }
    }
}

pub type OpResult<T> = std::result::Result<T, JobFailure>;
