//! Mutating roles: refresh, install, install-files, remove, update,
//! upgrade-system and download-packages.

use std::sync::Arc;

use pakt_backend::{Job, JobParams};
use pakt_state::{LockKind, LockMode};
use pakt_types::{Bitfield, Filter, PackageId, PkError, Status};

use crate::context::EngineContext;
use crate::error::{JobFailure, OpResult};
use crate::providers::{DownloadProgress, Goal, GoalOp};
use crate::refresh;
use crate::transaction;

fn package_ids(job: &Job) -> OpResult<Vec<PackageId>> {
    match job.params() {
        JobParams::PackageIds(ids) => Ok(ids.clone()),
        _ => Err(JobFailure::internal("expected package ids")),
    }
}

/// Checks that every license attached to the goal's packages was
/// accepted, raising the prompt for the first one that was not.
fn check_eulas(ctx: &EngineContext, job: &Arc<Job>, goal: &Goal) -> OpResult<()> {
    for op in &goal.ops {
        let package = match op {
            GoalOp::Install(p)
            | GoalOp::Reinstall(p)
            | GoalOp::Update(p)
            | GoalOp::Downgrade(p) => p,
            _ => continue,
        };
        let Some(eula) = &package.eula else {
            continue;
        };
        if ctx.eulas.is_valid(&eula.eula_id) {
            continue;
        }
        if let Ok(id) = package.package_id() {
            job.eula_required(
                eula.eula_id.clone(),
                id,
                eula.vendor.clone(),
                eula.license_agreement.clone(),
            );
        }
        return Err(JobFailure::new(
            PkError::NoLicenseAgreement,
            format!("license {} has not been accepted", eula.eula_id),
        ));
    }
    Ok(())
}

pub fn refresh_cache(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    let force = match job.params() {
        JobParams::Refresh {
            force,
        } => *force,
        _ => false,
    };
    let mut state = job.create_state();
    state.take_lock(LockKind::Metadata, LockMode::Process)?;
    let result = refresh::refresh_cache(ctx, job, &mut state, force);
    state.release_locks();
    result
}

pub fn install_packages(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    let ids = package_ids(job)?;
    let mut state = job.create_state();
    state.set_steps(&[3, 1, 1, 95])?;
    job.set_status(Status::Query);
    job.set_percentage(0);

    let sack = {
        let mut sack_state = state.child()?;
        ctx.sack_cache.get_or_build(
            &ctx.providers,
            job,
            Bitfield::from_values(&[Filter::NotInstalled]),
            true,
            &mut sack_state,
        )?
    };
    state.step_done()?;

    // flag matrix against the installed set
    let goal = transaction::build_install_goal(job, &sack, &ids)?;
    state.step_done()?;

    check_eulas(ctx, job, &goal)?;
    state.step_done()?;

    state.take_lock(LockKind::RpmDb, LockMode::Process)?;
    let mut txn_state = state.child()?;
    let result = transaction::transaction_run(ctx, job, &mut txn_state, &sack, &goal);
    state.release_locks();
    result?;
    state.step_done()?;
    Ok(())
}

pub fn install_files(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    let paths = match job.params() {
        JobParams::Files(paths) => paths.clone(),
        _ => return Err(JobFailure::internal("expected file paths")),
    };
    let mut state = job.create_state();
    state.set_steps(&[5, 95])?;
    job.set_status(Status::Setup);

    let mut sack_state = state.child()?;
    let sack = ctx.sack_cache.get_or_build(
        &ctx.providers,
        job,
        Bitfield::none(),
        true,
        &mut sack_state,
    )?;

    let mut goal = Goal::default();
    for path in &paths {
        if !path.exists() {
            return Err(JobFailure::new(
                PkError::FileNotFound,
                format!("{} does not exist", path.display()),
            ));
        }
        let package = ctx.providers.source.load_local_file(path)?;
        goal.push(GoalOp::Install(package));
    }
    state.step_done()?;

    state.take_lock(LockKind::RpmDb, LockMode::Process)?;
    let mut txn_state = state.child()?;
    let result = transaction::transaction_run(ctx, job, &mut txn_state, &sack, &goal);
    state.release_locks();
    result?;
    state.step_done()?;
    Ok(())
}

pub fn remove_packages(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    let JobParams::RemovePackages {
        package_ids,
        allow_deps,
        autoremove,
    } = job.params()
    else {
        return Err(JobFailure::internal("expected remove parameters"));
    };
    let ids = package_ids.clone();
    let allow_deps = *allow_deps;
    let autoremove = *autoremove;

    let mut state = job.create_state();
    state.set_steps(&[5, 95])?;
    job.set_status(Status::Setup);

    let sack = {
        let mut sack_state = state.child()?;
        ctx.sack_cache.get_or_build(
            &ctx.providers,
            job,
            Bitfield::from_values(&[Filter::Installed]),
            true,
            &mut sack_state,
        )?
    };

    let mut goal = Goal::default();
    for id in &ids {
        let package = transaction::find_installed(&sack, id)?;
        goal.push(GoalOp::Remove {
            package,
            allow_deps,
            autoremove,
        });
    }
    state.step_done()?;

    state.take_lock(LockKind::RpmDb, LockMode::Process)?;
    let mut txn_state = state.child()?;
    let result = transaction::transaction_run(ctx, job, &mut txn_state, &sack, &goal);
    state.release_locks();
    result?;
    state.step_done()?;
    Ok(())
}

pub fn update_packages(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    let ids = package_ids(job)?;
    let mut state = job.create_state();
    state.set_steps(&[5, 95])?;
    job.set_status(Status::Setup);

    let sack = {
        let mut sack_state = state.child()?;
        ctx.sack_cache
            .get_or_build(&ctx.providers, job, Bitfield::none(), true, &mut sack_state)?
    };

    let mut goal = Goal::default();
    for id in &ids {
        let package = transaction::find_available(&sack, id)?;
        goal.push(GoalOp::Update(package));
    }
    check_eulas(ctx, job, &goal)?;
    state.step_done()?;

    state.take_lock(LockKind::RpmDb, LockMode::Process)?;
    let mut txn_state = state.child()?;
    let result = transaction::transaction_run(ctx, job, &mut txn_state, &sack, &goal);
    state.release_locks();
    result?;
    state.step_done()?;
    Ok(())
}

pub fn upgrade_system(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    let JobParams::UpgradeSystem {
        distro_id, ..
    } = job.params()
    else {
        return Err(JobFailure::internal("expected upgrade parameters"));
    };
    let distro_id = distro_id.clone();

    let mut state = job.create_state();
    state.set_steps(&[5, 95])?;
    job.set_status(Status::Setup);

    let sack = {
        let mut sack_state = state.child()?;
        ctx.sack_cache
            .get_or_build(&ctx.providers, job, Bitfield::none(), true, &mut sack_state)?
    };
    state.step_done()?;

    let goal = Goal {
        ops: vec![GoalOp::DistroUpgrade(distro_id)],
    };
    state.take_lock(LockKind::RpmDb, LockMode::Process)?;
    let mut txn_state = state.child()?;
    let result = transaction::transaction_run(ctx, job, &mut txn_state, &sack, &goal);
    state.release_locks();
    result?;
    state.step_done()?;
    Ok(())
}

/// Downloads payloads without committing anything.
pub fn download_packages(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    let ids = package_ids(job)?;
    let mut state = job.create_state();
    state.set_steps(&[10, 90])?;
    job.set_status(Status::Download);

    let sack = {
        let mut sack_state = state.child()?;
        ctx.sack_cache.get_or_build(
            &ctx.providers,
            job,
            Bitfield::from_values(&[Filter::NotInstalled]),
            true,
            &mut sack_state,
        )?
    };
    state.step_done()?;

    let mut packages = Vec::with_capacity(ids.len());
    for id in &ids {
        packages.push(transaction::find_available(&sack, id)?);
    }

    let job_events = Arc::clone(job);
    let mut on_progress = move |progress: DownloadProgress| {
        if let Ok(id) = progress.package.package_id() {
            job_events.item_progress(id, Status::Download, progress.percentage);
        }
        job_events.set_speed(progress.speed);
        job_events.set_download_size_remaining(progress.size_remaining);
    };
    let mut download_state = state.child()?;
    ctx.providers
        .downloader
        .download(&packages, &mut download_state, &mut on_progress)?;
    state.step_done()?;
    Ok(())
}
