use miette::Diagnostic;
use pakt_types::Role;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum BackendError {
    #[error("Role '{0}' is not supported by this backend")]
    #[diagnostic(
        code(pakt_backend::not_supported),
        help("Check the backend's advertised roles before dispatching")
    )]
    NotSupported(Role),

    #[error("No backend named '{0}' is registered")]
    #[diagnostic(
        code(pakt_backend::unknown_backend),
        help("Use a registered backend name or 'auto'")
    )]
    UnknownBackend(String),

    #[error("No backends are registered")]
    #[diagnostic(code(pakt_backend::no_backends))]
    NoBackends,

    #[error("Backend failed to load: {0}")]
    #[diagnostic(code(pakt_backend::load))]
    LoadFailed(String),

    #[error("File monitor error: {0}")]
    #[diagnostic(code(pakt_backend::monitor))]
    Monitor(#[from] notify::Error),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;
