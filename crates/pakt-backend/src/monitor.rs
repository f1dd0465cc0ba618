//! Config file watching.
//!
//! A loaded backend may watch its own configuration; edits fire a
//! callback so the backend can invalidate caches built from the old
//! settings. Events arrive on the watcher's thread.

use std::path::Path;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::error::BackendResult;

/// Keeps a file under watch for as long as the value lives.
pub struct ConfigMonitor {
    _watcher: RecommendedWatcher,
}

impl ConfigMonitor {
    pub fn watch(path: &Path, callback: impl Fn() + Send + 'static) -> BackendResult<Self> {
        let watched = path.to_path_buf();
        let mut watcher =
            notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
                match result {
                    Ok(event) => {
                        if matches!(
                            event.kind,
                            EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                        ) {
                            debug!(path = %watched.display(), "watched config changed");
                            callback();
                        }
                    }
                    Err(err) => warn!(%err, "config watch error"),
                }
            })?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;
        Ok(Self {
            _watcher: watcher,
        })
    }
}
