//! Best-effort plugin hooks.
//!
//! Plugins run at well-defined points around transactions and refresh.
//! A failing plugin logs a warning and the transaction proceeds; only a
//! plugin that explicitly sets an error on the job can fail it.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use pakt_backend::Job;
use tracing::{debug, warn};

pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn transaction_finished(&self, _job: &Arc<Job>) -> Result<(), String> {
        Ok(())
    }

    fn refresh_finished(&self, _job: &Arc<Job>) -> Result<(), String> {
        Ok(())
    }
}

/// An ordered set of plugins.
#[derive(Default)]
pub struct PluginSet {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginSet {
    pub fn add(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn run_transaction_finished(&self, job: &Arc<Job>) {
        for plugin in &self.plugins {
            if let Err(message) = plugin.transaction_finished(job) {
                warn!(plugin = plugin.name(), message, "plugin hook failed");
            }
        }
    }

    pub fn run_refresh_finished(&self, job: &Arc<Job>) {
        for plugin in &self.plugins {
            if let Err(message) = plugin.refresh_finished(job) {
                warn!(plugin = plugin.name(), message, "plugin hook failed");
            }
        }
    }
}

/// Clears the transient firmware-request queue left behind by udev so
/// a completed update does not re-prompt for firmware that was just
/// installed.
pub struct ClearFirmwareRequests {
    dir: PathBuf,
}

impl ClearFirmwareRequests {
    pub fn new(dest_dir: &std::path::Path) -> Self {
        Self {
            dir: pakt_utils::path::firmware_requests_dir(dest_dir),
        }
    }
}

impl Plugin for ClearFirmwareRequests {
    fn name(&self) -> &str {
        "clear-firmware-requests"
    }

    fn transaction_finished(&self, _job: &Arc<Job>) -> Result<(), String> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            // nothing queued
            Err(_) => return Ok(()),
        };
        for entry in entries.flatten() {
            debug!(path = %entry.path().display(), "clearing firmware request");
            fs::remove_file(entry.path())
                .map_err(|err| format!("cannot remove {}: {err}", entry.path().display()))?;
        }
        Ok(())
    }
}
