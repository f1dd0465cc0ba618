//! Query roles: resolve, the searches, what-provides, get-packages and
//! get-updates.

use std::sync::Arc;

use pakt_backend::{Job, JobParams};
use pakt_types::{Bitfield, Filter, Info, PkError, Role, Status};

use crate::context::EngineContext;
use crate::error::{JobFailure, OpResult};
use crate::providers::{Goal, GoalOp, PackageMeta};
use crate::query::{self, SearchKind};

fn kind_for_role(role: Role) -> OpResult<SearchKind> {
    Ok(match role {
        Role::Resolve => SearchKind::Resolve,
        Role::SearchName | Role::SearchGroup => SearchKind::Name,
        Role::SearchDetails => SearchKind::Details,
        Role::SearchFile => SearchKind::File,
        Role::WhatProvides => SearchKind::Provides,
        Role::GetPackages | Role::GetUpdates => SearchKind::All,
        other => {
            return Err(JobFailure::internal(format!(
                "role {other} is not a query role"
            )))
        }
    })
}

fn request(job: &Job) -> OpResult<(Bitfield<Filter>, Vec<String>, SearchKind)> {
    let kind = kind_for_role(job.role())?;
    match job.params() {
        JobParams::Filters(filters) => Ok((*filters, Vec::new(), kind)),
        JobParams::Search {
            filters,
            values,
        } => {
            let terms = if kind == SearchKind::Provides {
                query::what_provides_decompose(values)
            } else {
                values.clone()
            };
            Ok((*filters, terms, kind))
        }
        _ => Err(JobFailure::internal("wrong parameters for a query role")),
    }
}

/// Shared query entry point.
pub fn search(ctx: &EngineContext, job: &Arc<Job>) -> OpResult<()> {
    let mut state = job.create_state();
    state.set_steps(&[39, 50, 1, 1, 9])?;
    job.set_status(Status::Query);

    let (filters, terms, kind) = request(job)?;

    let mut sack_state = state.child()?;
    let sack = ctx
        .sack_cache
        .get_or_build(&ctx.providers, job, filters, true, &mut sack_state)?;
    state.step_done()?;

    let results = if job.role() == Role::GetUpdates {
        updates_query(ctx, &sack)?
    } else {
        query::run_query(
            &sack,
            &ctx.providers.source.native_arches(),
            kind,
            &terms,
            filters,
        )
    };
    state.step_done()?;

    // the source list and origin are already part of the metadata
    state.step_done()?;
    state.step_done()?;

    if job.role() == Role::GetUpdates {
        for package in &results {
            if let Ok(id) = package.package_id() {
                job.package(update_info(package), id, package.summary.clone());
            }
        }
    } else {
        for package in query::order_for_emission(results) {
            if let Ok(id) = package.package_id() {
                job.package(query::info_for(&package), id, package.summary.clone());
            }
        }
    }
    state.step_done()?;
    Ok(())
}

/// An available update is as important as its advisory says.
fn update_info(package: &PackageMeta) -> Info {
    match &package.advisory {
        Some(advisory) if advisory.cve_urls.is_empty() => Info::Normal,
        Some(_) => Info::Security,
        None => Info::Normal,
    }
}

/// get-updates builds an upgrade-all goal and reports the packages the
/// solver would pull in.
fn updates_query(ctx: &EngineContext, sack: &crate::sack::Sack) -> OpResult<Vec<Arc<PackageMeta>>> {
    let goal = Goal {
        ops: vec![GoalOp::UpgradeAll],
    };
    let plan = ctx.providers.solver.depsolve(sack, &goal).map_err(|problems| {
        let description = problems
            .iter()
            .map(|p| p.description.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        JobFailure::new(PkError::DepResolutionFailed, description)
    })?;

    let mut updates = plan.updates.clone();
    updates.extend(plan.installs.iter().cloned());

    // optionally hide the daemon's own packages from listings
    if pakt_config::get_config().updates.hide_packages {
        updates.retain(|p| p.name != "pakt" && !p.name.starts_with("pakt-"));
    }
    Ok(updates)
}
