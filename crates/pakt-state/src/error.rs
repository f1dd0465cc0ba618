use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum StateError {
    #[error("Invalid state operation: {0}")]
    #[diagnostic(
        code(pakt_state::invalid),
        help("Step weights must sum to 100 and step_done must not overrun the declared steps")
    )]
    Invalid(String),

    #[error("Operation was cancelled")]
    #[diagnostic(code(pakt_state::cancelled))]
    Cancelled,

    #[error(transparent)]
    #[diagnostic(code(pakt_state::lock))]
    Lock(#[from] pakt_utils::error::UtilsError),
}

pub type StateResult<T> = std::result::Result<T, StateError>;
