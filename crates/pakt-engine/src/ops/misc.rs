//! Small roles: accept-eula, install-signature, distro upgrades and
//! categories.

use std::sync::Arc;

use pakt_backend::{Job, JobParams};
use pakt_types::Status;
use tracing::debug;

use crate::context::EngineContext;
use crate::error::{JobFailure, OpResult};

pub fn accept_eula(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    let JobParams::AcceptEula {
        eula_id,
    } = job.params()
    else {
        return Err(JobFailure::internal("expected an eula id"));
    };
    job.set_status(Status::Request);
    ctx.eulas.accept(eula_id);
    debug!(eula_id, "eula accepted");
    Ok(())
}

pub fn install_signature(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    let JobParams::InstallSignature {
        key_id, ..
    } = job.params()
    else {
        return Err(JobFailure::internal("expected signature parameters"));
    };
    job.set_status(Status::SigCheck);
    ctx.signatures.import(key_id);
    debug!(key_id, "signature imported");
    Ok(())
}

pub fn get_distro_upgrades(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    job.set_status(Status::Query);
    for upgrade in ctx.providers.source.distro_upgrades() {
        job.distro_upgrade(upgrade);
    }
    Ok(())
}

pub fn get_categories(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    job.set_status(Status::Query);
    for category in ctx.providers.source.categories() {
        job.category(category);
    }
    Ok(())
}
