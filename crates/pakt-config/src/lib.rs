//! Daemon configuration.
//!
//! The config file keeps the historical `[Daemon]` / `[Updates]` key
//! vocabulary. A minimal file looks like:
//!
//! ```toml
//! [Daemon]
//! DefaultBackend = "auto"
//! DestDir = "/"
//! BackendShutdownTimeout = 5
//! ```

pub mod error;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigResult;

/// `[Daemon]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    /// Backend to load; `auto` means detect.
    #[serde(rename = "DefaultBackend")]
    pub default_backend: String,

    /// Root all cache, run and repo paths are resolved under.
    #[serde(rename = "DestDir")]
    pub dest_dir: PathBuf,

    /// Keep downloaded payloads after a successful commit.
    #[serde(rename = "KeepCache")]
    pub keep_cache: bool,

    /// Seconds an idle spawned helper is kept alive.
    #[serde(rename = "BackendShutdownTimeout")]
    pub backend_shutdown_timeout: u64,

    /// Pass the daemon's own environment through to helpers unsanitized.
    /// Debug only.
    #[serde(rename = "KeepEnvironment")]
    pub keep_environment: bool,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            default_backend: "auto".to_string(),
            dest_dir: PathBuf::from("/"),
            keep_cache: false,
            backend_shutdown_timeout: 5,
            keep_environment: false,
        }
    }
}

/// `[Updates]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdatesSection {
    /// Hide the daemon's own packages from update listings.
    #[serde(rename = "HidePackages")]
    pub hide_packages: bool,
}

/// Whole daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "Daemon")]
    pub daemon: DaemonSection,
    #[serde(rename = "Updates")]
    pub updates: UpdatesSection,
}

impl Config {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path)?;
        let config = toml::from_str(&raw)?;
        debug!(path = %path.display(), "loaded daemon config");
        Ok(config)
    }
}

static CONFIG: LazyLock<RwLock<Option<Config>>> = LazyLock::new(|| RwLock::new(None));

/// Installs a configuration for the lifetime of the process.
pub fn init(config: Config) {
    *CONFIG.write().unwrap() = Some(config);
}

/// Loads and installs a configuration from a file.
pub fn init_from_file(path: &Path) -> ConfigResult<()> {
    init(Config::load(path)?);
    Ok(())
}

/// The process configuration, defaulted when `init` was never called.
pub fn get_config() -> Config {
    let guard = CONFIG.read().unwrap();
    guard.clone().unwrap_or_default()
}

/// Explicit teardown, used at unload and between tests.
pub fn reset() {
    *CONFIG.write().unwrap() = None;
}
