//! Role entry points.
//!
//! Each role is a plain function taking the engine context and the job;
//! [`dispatch`] routes a job to its entry, records any failure as the
//! job's typed error and always finishes the job.

mod details;
mod misc;
mod repos;
mod search;
mod transactions;

use std::sync::Arc;

use pakt_backend::Job;
use pakt_types::Role;
use tracing::debug;

use crate::context::EngineContext;
use crate::error::{JobFailure, OpResult};

pub use details::{get_details, get_files, get_update_detail};
pub use misc::{accept_eula, get_categories, get_distro_upgrades, install_signature};
pub use repos::{get_repo_list, repo_enable, repo_remove, repo_set_data};
pub use search::search;
pub use transactions::{
    download_packages, install_files, install_packages, refresh_cache, remove_packages,
    update_packages, upgrade_system,
};

fn run_role(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    match job.role() {
        Role::Resolve
        | Role::SearchName
        | Role::SearchDetails
        | Role::SearchFile
        | Role::SearchGroup
        | Role::WhatProvides
        | Role::GetPackages
        | Role::GetUpdates => search(ctx, job),
        Role::GetDetails => get_details(ctx, job),
        Role::GetFiles => get_files(ctx, job),
        Role::GetUpdateDetail => get_update_detail(ctx, job),
        Role::GetRepoList => get_repo_list(ctx, job),
        Role::RepoEnable => repo_enable(ctx, job),
        Role::RepoSetData => repo_set_data(ctx, job),
        Role::RepoRemove => repo_remove(ctx, job),
        Role::RefreshCache => refresh_cache(ctx, job),
        Role::InstallPackages => install_packages(ctx, job),
        Role::InstallFiles => install_files(ctx, job),
        Role::RemovePackages => remove_packages(ctx, job),
        Role::UpdatePackages => update_packages(ctx, job),
        Role::UpgradeSystem => upgrade_system(ctx, job),
        Role::DownloadPackages => download_packages(ctx, job),
        Role::GetDistroUpgrades => get_distro_upgrades(ctx, job),
        Role::GetCategories => get_categories(ctx, job),
        Role::AcceptEula => accept_eula(ctx, job),
        Role::InstallSignature => install_signature(ctx, job),
        other => Err(JobFailure::new(
            pakt_types::PkError::NotSupported,
            format!("role {other} has no entry point"),
        )),
    }
}

/// Runs the job's role to completion, recording failures and firing
/// the post-hooks.
pub fn dispatch(ctx: &EngineContext, job: &Arc<Job>) {
    let result = run_role(ctx, job);
    if let Err(failure) = result {
        debug!(role = %job.role(), code = %failure.code, "role entry failed");
        job.error_code(failure.code, failure.message);
    }
    match job.role() {
        Role::InstallPackages
        | Role::InstallFiles
        | Role::RemovePackages
        | Role::UpdatePackages
        | Role::UpgradeSystem => ctx.plugins.run_transaction_finished(job),
        Role::RefreshCache => ctx.plugins.run_refresh_finished(job),
        _ => {}
    }
    job.finished();
}
