use miette::Diagnostic;
use thiserror::Error;

/// Why one helper record was rejected. Rejection is per-record: the
/// stream keeps flowing.
#[derive(Error, Diagnostic, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid command '{command}', size {got}")]
    #[diagnostic(code(pakt_spawn::field_count))]
    FieldCount { command: String, got: usize },

    #[error("invalid command '{0}'")]
    #[diagnostic(code(pakt_spawn::unknown_command))]
    UnknownCommand(String),

    #[error("invalid package_id '{0}'")]
    #[diagnostic(code(pakt_spawn::package_id))]
    InvalidPackageId(String),

    #[error("{kind} enum not recognised, and hence ignored: '{value}'")]
    #[diagnostic(code(pakt_spawn::unknown_enum))]
    UnknownEnum { kind: &'static str, value: String },

    #[error("invalid percentage value {0}")]
    #[diagnostic(code(pakt_spawn::percentage))]
    InvalidPercentage(String),

    #[error("failed to parse {field}: '{value}'")]
    #[diagnostic(code(pakt_spawn::number))]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid qualifier '{0}'")]
    #[diagnostic(code(pakt_spawn::boolean))]
    InvalidBoolean(String),

    #[error("{0} blank, and hence ignored")]
    #[diagnostic(code(pakt_spawn::blank))]
    BlankField(&'static str),

    #[error("package size cannot be that large")]
    #[diagnostic(code(pakt_spawn::size))]
    PackageSizeTooLarge,

    #[error("cat_id cannot be the same as parent_id")]
    #[diagnostic(code(pakt_spawn::category_parent))]
    CategoryParentCycle,

    #[error("icon '{0}' should be a named icon, not a path")]
    #[diagnostic(code(pakt_spawn::category_icon))]
    IconIsPath(String),

    #[error("line was not valid UTF-8")]
    #[diagnostic(code(pakt_spawn::utf8))]
    InvalidUtf8,
}

#[derive(Error, Diagnostic, Debug)]
pub enum SpawnError {
    #[error("failed to launch helper: {0}")]
    #[diagnostic(
        code(pakt_spawn::launch),
        help("Check that the helper exists and is executable")
    )]
    Launch(#[from] std::io::Error),
}
