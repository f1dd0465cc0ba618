use std::path::PathBuf;
use std::sync::Arc;

use pakt_backend::{EulaRegistry, SignatureRegistry, TransactionInhibitor};

use crate::plugins::{ClearFirmwareRequests, PluginSet};
use crate::providers::Providers;
use crate::sack::SackCache;

/// Shared engine-side state for one loaded backend.
///
/// The registries and the inhibitor outlive any single job; jobs borrow
/// this context for their lifetime.
#[derive(Clone)]
pub struct EngineContext {
    pub providers: Providers,
    pub sack_cache: Arc<SackCache>,
    pub eulas: Arc<EulaRegistry>,
    pub signatures: Arc<SignatureRegistry>,
    pub inhibitor: Arc<TransactionInhibitor>,
    pub plugins: Arc<PluginSet>,
    pub dest_dir: PathBuf,
}

impl EngineContext {
    pub fn new(providers: Providers) -> Self {
        let config = pakt_config::get_config();
        let dest_dir = config.daemon.dest_dir;
        let mut plugins = PluginSet::default();
        plugins.add(Box::new(ClearFirmwareRequests::new(&dest_dir)));

        let sack_cache = Arc::new(SackCache::default());
        let inhibitor = Arc::new(TransactionInhibitor::default());
        // an external write to the installed DB invalidates every sack;
        // our own commits are masked by the inhibitor
        let cache = Arc::clone(&sack_cache);
        inhibitor.set_changed_callback(move || {
            cache.invalidate("installed database changed externally");
        });

        Self {
            providers,
            sack_cache,
            eulas: Arc::new(EulaRegistry::default()),
            signatures: Arc::new(SignatureRegistry::default()),
            inhibitor,
            plugins: Arc::new(plugins),
            dest_dir,
        }
    }
}
