//! A backend implemented by an external helper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pakt_backend::{Backend, BackendInfo, Capabilities, EulaRegistry, Job, JobParams};
use pakt_types::{PkError, Role};
use tracing::warn;

use crate::bridge::{SpawnBridge, SpawnConfig};

/// Backend whose every role is dispatched to a spawned helper.
pub struct SpawnBackend {
    info: BackendInfo,
    capabilities: Capabilities,
    config: SpawnConfig,
    eulas: Arc<EulaRegistry>,
    online: AtomicBool,
}

impl SpawnBackend {
    pub fn new(info: BackendInfo, capabilities: Capabilities, config: SpawnConfig) -> Self {
        Self {
            info,
            capabilities,
            config,
            eulas: Arc::new(EulaRegistry::default()),
            online: AtomicBool::new(true),
        }
    }

    pub fn eulas(&self) -> &Arc<EulaRegistry> {
        &self.eulas
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// The helper's argv: the role name followed by its parameters in
    /// their text forms. Lists travel `&`-joined, filters and flags as
    /// bitfield text.
    fn role_args(job: &Job) -> Vec<String> {
        let mut args = vec![job.role().to_text().to_string()];
        match job.params() {
            JobParams::None => {}
            JobParams::Search {
                filters,
                values,
            } => {
                args.push(filters.to_text());
                args.push(values.join("&"));
            }
            JobParams::Filters(filters) => args.push(filters.to_text()),
            JobParams::PackageIds(ids) => {
                args.push(job.transaction_flags().to_text());
                args.push(
                    ids.iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("&"),
                );
            }
            JobParams::Files(paths) => {
                args.push(job.transaction_flags().to_text());
                args.push(
                    paths
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join("&"),
                );
            }
            JobParams::Refresh {
                force,
            } => args.push(force.to_string()),
            JobParams::RemovePackages {
                package_ids,
                allow_deps,
                autoremove,
            } => {
                args.push(job.transaction_flags().to_text());
                args.push(
                    package_ids
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("&"),
                );
                args.push(allow_deps.to_string());
                args.push(autoremove.to_string());
            }
            JobParams::RepoEnable {
                repo_id,
                enabled,
            } => {
                args.push(repo_id.clone());
                args.push(enabled.to_string());
            }
            JobParams::RepoRemove {
                repo_id,
                autoremove,
            } => {
                args.push(repo_id.clone());
                args.push(autoremove.to_string());
            }
            JobParams::RepoSetData {
                repo_id,
                key,
                value,
            } => {
                args.push(repo_id.clone());
                args.push(key.clone());
                args.push(value.clone());
            }
            JobParams::AcceptEula {
                eula_id,
            } => args.push(eula_id.clone()),
            JobParams::InstallSignature {
                sig_type,
                key_id,
                package_id,
            } => {
                args.push(sig_type.to_text().to_string());
                args.push(key_id.clone());
                args.push(package_id.to_string());
            }
            JobParams::UpgradeSystem {
                distro_id,
                kind,
            } => {
                args.push(distro_id.clone());
                args.push(kind.to_text().to_string());
            }
        }
        args
    }
}

impl Backend for SpawnBackend {
    fn info(&self) -> BackendInfo {
        self.info.clone()
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn run_job(&self, job: &Arc<Job>) {
        // accept-eula is handled daemon-side; the registry travels to
        // the helper in its environment
        if job.role() == Role::AcceptEula {
            if let JobParams::AcceptEula {
                eula_id,
            } = job.params()
            {
                self.eulas.accept(eula_id);
            }
            job.finished();
            return;
        }

        let args = Self::role_args(job);
        let result = SpawnBridge::run(
            self.config.clone(),
            job,
            &args,
            self.eulas.accepted_string(),
            self.is_online(),
        );
        if let Err(err) = result {
            warn!(%err, "failed to launch helper");
            job.error_code(PkError::FailedInitialization, err.to_string());
            job.finished();
        }
    }
}
