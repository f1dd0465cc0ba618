//! Repository roles: get-repo-list, repo-enable, repo-set-data,
//! repo-remove.

use std::sync::Arc;

use pakt_backend::{Job, JobParams};
use pakt_types::{Bitfield, Status};

use crate::context::EngineContext;
use crate::error::{JobFailure, OpResult};
use crate::providers::{Goal, GoalOp};
use crate::transaction;

pub fn get_repo_list(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    job.set_status(Status::Query);
    for repo in ctx.providers.repos.repos()? {
        job.repo_detail(repo.id, repo.description, repo.enabled);
    }
    Ok(())
}

pub fn repo_enable(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    let JobParams::RepoEnable {
        repo_id,
        enabled,
    } = job.params()
    else {
        return Err(JobFailure::internal("expected repo enable parameters"));
    };
    job.set_status(Status::Request);
    ctx.providers.repos.set_enabled(repo_id, *enabled)?;
    ctx.sack_cache.invalidate("repository enablement changed");
    Ok(())
}

pub fn repo_set_data(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    let JobParams::RepoSetData {
        repo_id,
        key,
        value,
    } = job.params()
    else {
        return Err(JobFailure::internal("expected repo set-data parameters"));
    };
    job.set_status(Status::Request);
    ctx.providers.repos.set_data(repo_id, key, value)?;
    ctx.sack_cache.invalidate("repository configuration changed");
    Ok(())
}

/// Disables a repository and, with autoremove, removes every installed
/// package that originated from it.
pub fn repo_remove(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    let JobParams::RepoRemove {
        repo_id,
        autoremove,
    } = job.params()
    else {
        return Err(JobFailure::internal("expected repo remove parameters"));
    };
    let repo_id = repo_id.clone();
    let autoremove = *autoremove;

    let mut state = job.create_state();
    state.set_steps(&[10, 90])?;
    job.set_status(Status::Setup);

    let sack = {
        let mut sack_state = state.child()?;
        ctx.sack_cache
            .get_or_build(&ctx.providers, job, Bitfield::none(), true, &mut sack_state)?
    };
    state.step_done()?;

    ctx.providers.repos.set_enabled(&repo_id, false)?;
    ctx.sack_cache.invalidate("repository removed");

    if autoremove {
        // remove exactly the packages the origin query returned
        let originated: Vec<_> = sack
            .installed()
            .filter(|p| p.origin.as_deref() == Some(repo_id.as_str()))
            .cloned()
            .collect();
        if !originated.is_empty() {
            let mut goal = Goal::default();
            for package in originated {
                goal.push(GoalOp::Remove {
                    package,
                    allow_deps: true,
                    autoremove: false,
                });
            }
            let mut txn_state = state.child()?;
            transaction::transaction_run(ctx, job, &mut txn_state, &sack, &goal)?;
        }
    }
    state.step_done()?;
    Ok(())
}
