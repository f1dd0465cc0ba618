//! Lookup roles: get-details, get-files, get-update-detail.

use std::sync::Arc;

use pakt_backend::{Job, JobParams};
use pakt_state::State;
use pakt_types::{Bitfield, Details, PackageId, PkError, Status, UpdateDetail};

use crate::context::EngineContext;
use crate::error::{JobFailure, OpResult};
use crate::providers::PackageMeta;
use crate::sack::Sack;

fn package_ids(job: &Job) -> OpResult<&[PackageId]> {
    match job.params() {
        JobParams::PackageIds(ids) => Ok(ids),
        _ => Err(JobFailure::internal("expected package ids")),
    }
}

fn lookup_sack(ctx: &EngineContext, job: &Arc<Job>, state: &mut State) -> OpResult<Arc<Sack>> {
    let mut sack_state = state.child()?;
    ctx.sack_cache
        .get_or_build(&ctx.providers, job, Bitfield::none(), true, &mut sack_state)
}

/// Any instance matching the id, preferring the installed one.
fn find_any(sack: &Sack, id: &PackageId) -> OpResult<Arc<PackageMeta>> {
    sack.installed()
        .chain(sack.available())
        .find(|p| p.matches_id(id))
        .cloned()
        .ok_or_else(|| {
            JobFailure::new(PkError::PackageNotFound, format!("Failed to find {id}"))
        })
}

pub fn get_details(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    let mut state = job.create_state();
    state.set_steps(&[50, 50])?;
    job.set_status(Status::Query);

    let sack = lookup_sack(ctx, job, &mut state)?;
    state.step_done()?;

    let ids = package_ids(job)?.to_vec();
    for id in &ids {
        let package = find_any(&sack, id)?;
        job.details(Details {
            package_id: id.clone(),
            summary: package.summary.clone(),
            license: package.license.clone(),
            group: package.group,
            description: package.description.clone(),
            url: package.url.clone(),
            size: package.size,
        });
    }
    state.step_done()?;
    Ok(())
}

pub fn get_files(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    let mut state = job.create_state();
    state.set_steps(&[50, 50])?;
    job.set_status(Status::Query);

    let sack = lookup_sack(ctx, job, &mut state)?;
    state.step_done()?;

    let ids = package_ids(job)?.to_vec();
    for id in &ids {
        let package = find_any(&sack, id)?;
        if package.files.is_empty() && !sack.flags.filelists {
            return Err(JobFailure::new(
                PkError::CannotGetFilelist,
                format!("no filelist metadata loaded for {id}"),
            ));
        }
        job.files(id.clone(), package.files.clone());
    }
    state.step_done()?;
    Ok(())
}

pub fn get_update_detail(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    let mut state = job.create_state();
    state.set_steps(&[50, 50])?;
    job.set_status(Status::Query);

    let sack = lookup_sack(ctx, job, &mut state)?;
    state.step_done()?;

    let ids = package_ids(job)?.to_vec();
    for id in &ids {
        let package = find_any(&sack, id)?;
        let mut detail = package.advisory.clone().unwrap_or_else(UpdateDetail::default);
        detail.package_id = Some(id.clone());
        job.update_detail(detail);
    }
    state.step_done()?;
    Ok(())
}
