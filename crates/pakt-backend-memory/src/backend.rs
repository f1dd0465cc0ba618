use std::sync::Arc;

use pakt_backend::{Backend, BackendInfo, Capabilities, Job};
use pakt_engine::providers::Providers;
use pakt_engine::{ops, EngineContext};
use pakt_types::{Bitfield, Filter, Group, Role};

use crate::providers::{WorldDownloader, WorldRepos, WorldRunner, WorldSolver, WorldSource};
use crate::world::MemoryWorld;

/// Backend over the in-memory fixture world.
pub struct MemoryBackend {
    ctx: EngineContext,
}

impl MemoryBackend {
    pub fn new(world: Arc<MemoryWorld>) -> Self {
        let providers = Providers {
            source: Arc::new(WorldSource(Arc::clone(&world))),
            repos: Arc::new(WorldRepos(Arc::clone(&world))),
            solver: Arc::new(WorldSolver(Arc::clone(&world))),
            downloader: Arc::new(WorldDownloader(Arc::clone(&world))),
            runner: Arc::new(WorldRunner(world)),
        };
        Self {
            ctx: EngineContext::new(providers),
        }
    }

    /// The engine context, for tests that poke at registries directly.
    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }
}

impl Backend for MemoryBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: "memory".to_string(),
            author: "pakt developers".to_string(),
            description: "In-memory backend for tests and diagnostics".to_string(),
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            roles: Bitfield::from_values(&[
                Role::Resolve,
                Role::SearchName,
                Role::SearchDetails,
                Role::SearchFile,
                Role::WhatProvides,
                Role::GetPackages,
                Role::GetUpdates,
                Role::GetUpdateDetail,
                Role::GetDetails,
                Role::GetFiles,
                Role::GetRepoList,
                Role::GetDistroUpgrades,
                Role::GetCategories,
                Role::RepoEnable,
                Role::RepoSetData,
                Role::RepoRemove,
                Role::RefreshCache,
                Role::InstallPackages,
                Role::InstallFiles,
                Role::InstallSignature,
                Role::RemovePackages,
                Role::UpdatePackages,
                Role::UpgradeSystem,
                Role::DownloadPackages,
                Role::AcceptEula,
            ]),
            filters: Bitfield::from_values(&[
                Filter::Installed,
                Filter::NotInstalled,
                Filter::Arch,
                Filter::NotArch,
                Filter::Source,
                Filter::NotSource,
                Filter::Application,
                Filter::NotApplication,
                Filter::Devel,
                Filter::NotDevel,
                Filter::Newest,
            ]),
            groups: Bitfield::from_values(&[Group::System, Group::Internet, Group::Multimedia]),
            mime_types: vec!["application/x-rpm".to_string()],
            supports_parallelization: false,
        }
    }

    fn run_job(&self, job: &Arc<Job>) {
        ops::dispatch(&self.ctx, job);
    }
}
