use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum UtilsError {
    #[error("Failed to acquire lock: {0}")]
    #[diagnostic(
        code(pakt_utils::lock_acquire),
        help("Another process may be holding the lock; check for a stale daemon")
    )]
    LockAcquireFailed(String),

    #[error("IO error while {action}")]
    #[diagnostic(code(pakt_utils::io), help("Check file permissions and disk space"))]
    Io {
        action: String,
        #[source]
        source: std::io::Error,
    },
}

impl UtilsError {
    pub fn io(action: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let action = action.into();
        move |source| Self::Io { action, source }
    }
}

pub type UtilsResult<T> = std::result::Result<T, UtilsError>;
