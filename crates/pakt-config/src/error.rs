use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    #[diagnostic(
        code(pakt_config::io),
        help("Check that the file exists and is readable")
    )]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    #[diagnostic(
        code(pakt_config::parse),
        help("Check the [Daemon] section syntax; string values must be quoted")
    )]
    Parse(#[from] toml::de::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
