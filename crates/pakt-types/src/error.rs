use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum TypesError {
    #[error("Invalid package id '{id}': {reason}")]
    #[diagnostic(
        code(pakt_types::package_id),
        help("A package id is 'name;version;arch;data' with exactly three semicolons")
    )]
    InvalidPackageId { id: String, reason: &'static str },

    #[error("Package id field '{0}' contains a reserved character")]
    #[diagnostic(
        code(pakt_types::package_id_field),
        help("Fields of a package id may not contain ';' or newlines")
    )]
    InvalidPackageIdField(String),

    #[error("Category id '{0}' cannot equal its parent id")]
    #[diagnostic(code(pakt_types::category_parent))]
    CategoryParentCycle(String),

    #[error("Category icon '{0}' must be a named icon, not a path")]
    #[diagnostic(code(pakt_types::category_icon))]
    CategoryIconIsPath(String),
}
