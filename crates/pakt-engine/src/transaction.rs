//! The transaction planner.
//!
//! Turns a user request into a depsolved plan, classifies the touched
//! packages, optionally simulates, then downloads and commits with the
//! installed-DB inhibitor held across the mutation.

use std::cmp::Ordering;
use std::sync::Arc;

use pakt_backend::Job;
use pakt_state::State;
use pakt_types::{Evr, Info, PackageId, PkError, Status, TransactionFlag};
use tracing::debug;

use crate::context::EngineContext;
use crate::error::{JobFailure, OpResult};
use crate::providers::{CommitFlags, CommitProgress, DownloadProgress, Goal, GoalOp, PackageMeta, Plan};
use crate::sack::Sack;

/// Packages that may never be removed, simulate or not.
pub const PROTECTED_PACKAGES: &[&str] = &["glibc", "PackageKit", "rpm", "libzypp"];

/// How a requested install relates to what is already on the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallRelation {
    /// Nothing with this name and arch is installed.
    NotInstalled,
    /// The same EVR is installed; only valid with allow-reinstall.
    Same,
    /// The requested EVR is newer than the installed one.
    Newer,
    /// The requested EVR is older; only valid with allow-downgrade.
    Older,
}

/// Classifies one requested package id against the installed set.
pub fn install_relation(sack: &Sack, id: &PackageId) -> (InstallRelation, Option<Evr>) {
    let requested = Evr::parse(id.version());
    let mut relation = InstallRelation::NotInstalled;
    let mut latest_installed: Option<Evr> = None;

    for installed in sack
        .installed()
        .filter(|p| p.name == id.name() && p.arch == id.arch())
    {
        match requested.cmp(&installed.evr) {
            Ordering::Equal => {
                relation = InstallRelation::Same;
                break;
            }
            Ordering::Greater => {
                if relation == InstallRelation::NotInstalled {
                    relation = InstallRelation::Newer;
                }
            }
            Ordering::Less => {
                if relation != InstallRelation::Same {
                    relation = InstallRelation::Older;
                    let candidate = installed.evr.clone();
                    if latest_installed
                        .as_ref()
                        .map(|l| *l < candidate)
                        .unwrap_or(true)
                    {
                        latest_installed = Some(candidate);
                    }
                }
            }
        }
    }
    (relation, latest_installed)
}

/// Builds the goal for install-packages, applying the flag matrix:
/// an exact reinstall needs allow-reinstall, an older version needs
/// allow-downgrade, and just-reinstall refuses everything else.
pub fn build_install_goal(
    job: &Job,
    sack: &Sack,
    package_ids: &[PackageId],
) -> OpResult<Goal> {
    let mut goal = Goal::default();

    for id in package_ids {
        let (relation, latest) = install_relation(sack, id);

        if relation == InstallRelation::Same
            && !job.has_transaction_flag(TransactionFlag::AllowReinstall)
        {
            return Err(JobFailure::new(
                PkError::PackageAlreadyInstalled,
                format!("{} is already installed", id.printable()),
            ));
        }
        if relation == InstallRelation::Older
            && !job.has_transaction_flag(TransactionFlag::AllowDowngrade)
        {
            let latest = latest.map(|l| l.to_string()).unwrap_or_default();
            return Err(JobFailure::new(
                PkError::PackageAlreadyInstalled,
                format!(
                    "higher version \"{}\" of package {}.{} is already installed",
                    latest,
                    id.name(),
                    id.arch()
                ),
            ));
        }
        if !matches!(relation, InstallRelation::NotInstalled | InstallRelation::Same)
            && job.has_transaction_flag(TransactionFlag::JustReinstall)
        {
            return Err(JobFailure::new(
                PkError::NotAuthorized,
                "missing authorization to update or downgrade software",
            ));
        }

        let package = find_available(sack, id)?;
        let op = match relation {
            InstallRelation::Older => GoalOp::Downgrade(package),
            InstallRelation::Same => GoalOp::Reinstall(package),
            InstallRelation::Newer => GoalOp::Update(package),
            InstallRelation::NotInstalled => GoalOp::Install(package),
        };
        goal.push(op);
    }
    Ok(goal)
}

/// Finds the remote (or local) package a request names.
pub fn find_available(sack: &Sack, id: &PackageId) -> OpResult<Arc<PackageMeta>> {
    sack.available()
        .find(|p| p.matches_id(id))
        .cloned()
        .ok_or_else(|| {
            JobFailure::new(
                PkError::PackageNotFound,
                format!("Failed to find {id}"),
            )
        })
}

/// Finds an installed package by id, for remove and update requests.
pub fn find_installed(sack: &Sack, id: &PackageId) -> OpResult<Arc<PackageMeta>> {
    sack.installed()
        .find(|p| p.matches_id(id))
        .cloned()
        .ok_or_else(|| {
            JobFailure::new(
                PkError::PackageNotInstalled,
                format!("{} is not already installed", id.printable()),
            )
        })
}

/// Every plan member whose payload would be installed, partitioned into
/// the untrusted subset: standalone files always, otherwise any package
/// whose repo has no gpgcheck.
pub fn check_untrusted(
    ctx: &EngineContext,
    plan: &Plan,
) -> OpResult<Vec<Arc<PackageMeta>>> {
    let mut untrusted = Vec::new();
    for package in plan.incoming() {
        if package.is_local() {
            untrusted.push(Arc::clone(package));
            continue;
        }
        match ctx.providers.repos.gpgcheck(&package.repo_id) {
            Some(true) => {}
            Some(false) => untrusted.push(Arc::clone(package)),
            None => {
                return Err(JobFailure::new(
                    PkError::RepoNotFound,
                    format!("Can't GPG check {}: unknown repo {}", package.name, package.repo_id),
                ));
            }
        }
    }
    Ok(untrusted)
}

fn protected_removal(plan: &Plan) -> Option<&str> {
    plan.removals
        .iter()
        .chain(plan.obsoleted.iter())
        .map(|p| p.name.as_str())
        .find(|name| PROTECTED_PACKAGES.contains(name))
}

fn emit_class(job: &Job, info: Info, packages: &[Arc<PackageMeta>]) {
    for package in packages {
        if let Ok(id) = package.package_id() {
            job.package(info, id, package.summary.clone());
        }
    }
}

/// Emits the simulate classification: exactly one class per touched
/// package, untrusted first, and never a commit.
fn simulate(
    ctx: &EngineContext,
    job: &Job,
    state: &mut State,
    plan: &Plan,
) -> OpResult<()> {
    state.set_steps(&[99, 1])?;

    let untrusted = check_untrusted(ctx, plan)?;
    state.step_done()?;

    let untrusted_keys: Vec<(String, String)> = untrusted
        .iter()
        .map(|p| (p.name.clone(), p.arch.clone()))
        .collect();
    let trusted = |packages: &[Arc<PackageMeta>]| -> Vec<Arc<PackageMeta>> {
        packages
            .iter()
            .filter(|p| !untrusted_keys.contains(&(p.name.clone(), p.arch.clone())))
            .cloned()
            .collect()
    };

    emit_class(job, Info::Untrusted, &untrusted);
    emit_class(job, Info::Removing, &plan.removals);
    emit_class(job, Info::Installing, &trusted(&plan.installs));
    emit_class(job, Info::Obsoleting, &plan.obsoleted);
    emit_class(job, Info::Reinstalling, &trusted(&plan.reinstalls));
    emit_class(job, Info::Updating, &trusted(&plan.updates));
    emit_class(job, Info::Downgrading, &trusted(&plan.downgrades));

    state.step_done()?;
    Ok(())
}

fn commit_flags(job: &Job) -> CommitFlags {
    CommitFlags {
        only_trusted: job.has_transaction_flag(TransactionFlag::OnlyTrusted),
        allow_reinstall: job.has_transaction_flag(TransactionFlag::AllowReinstall),
        // downgrades are allowed for every transaction type
        allow_downgrade: true,
        test_only: job.has_transaction_flag(TransactionFlag::OnlyDownload),
    }
}

fn run_commit(
    ctx: &EngineContext,
    job: &Arc<Job>,
    state: &mut State,
    plan: &Plan,
) -> OpResult<()> {
    let job_events = Arc::clone(job);
    let mut on_progress = move |progress: CommitProgress| {
        if let Ok(id) = progress.package.package_id() {
            job_events.item_progress(id, progress.status, progress.percentage);
        }
    };

    ctx.inhibitor.inhibit_start();
    let result = ctx
        .providers
        .runner
        .commit(plan, commit_flags(job), state, &mut on_progress);
    ctx.inhibitor.inhibit_end();
    result?;
    ctx.sack_cache.invalidate("installed database changed");
    Ok(())
}

/// Downloads the remote payloads and commits, splitting progress evenly
/// between the phases; a plan with nothing remote goes straight to
/// commit.
fn download_commit(
    ctx: &EngineContext,
    job: &Arc<Job>,
    state: &mut State,
    plan: &Plan,
) -> OpResult<()> {
    let remote = plan.remote_packages();
    if remote.is_empty() {
        return run_commit(ctx, job, state, plan);
    }

    state.set_steps(&[50, 50])?;
    state.set_action(Status::Download, None);

    {
        let mut download_state = state.child()?;
        let job_events = Arc::clone(job);
        let mut on_progress = move |progress: DownloadProgress| {
            if let Ok(id) = progress.package.package_id() {
                job_events.item_progress(id, Status::Download, progress.percentage);
            }
            job_events.set_speed(progress.speed);
            job_events.set_download_size_remaining(progress.size_remaining);
        };
        ctx.providers
            .downloader
            .download(&remote, &mut download_state, &mut on_progress)?;
    }
    state.step_done()?;

    state.set_action(Status::Commit, None);
    {
        let mut commit_state = state.child()?;
        run_commit(ctx, job, &mut commit_state, plan)?;
    }
    state.step_done()?;
    Ok(())
}

/// Runs a prepared goal through depsolve and either simulate or
/// download+commit.
pub fn transaction_run(
    ctx: &EngineContext,
    job: &Arc<Job>,
    state: &mut State,
    sack: &Sack,
    goal: &Goal,
) -> OpResult<()> {
    state.set_steps(&[5, 95])?;
    state.set_action(Status::DepResolve, None);

    let plan = match ctx.providers.solver.depsolve(sack, goal) {
        Ok(plan) => plan,
        Err(problems) => {
            let description = problems
                .iter()
                .map(|p| p.description.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            return Err(JobFailure::new(PkError::DepResolutionFailed, description));
        }
    };
    state.step_done()?;

    // protected packages can never leave the system
    if let Some(name) = protected_removal(&plan) {
        return Err(JobFailure::new(
            PkError::CannotRemoveSystemPackage,
            format!("The package {name} is essential to the system and cannot be removed"),
        ));
    }

    if job.has_transaction_flag(TransactionFlag::Simulate) {
        let mut simulate_state = state.child()?;
        simulate(ctx, job, &mut simulate_state, &plan)?;
        state.step_done()?;
        return Ok(());
    }

    if job.has_transaction_flag(TransactionFlag::OnlyTrusted) {
        let untrusted = check_untrusted(ctx, &plan)?;
        if !untrusted.is_empty() {
            let names: Vec<&str> = untrusted.iter().map(|p| p.name.as_str()).collect();
            return Err(JobFailure::new(
                PkError::GpgFailure,
                format!("untrusted packages: {}", names.join(", ")),
            ));
        }
    }

    debug!(
        installs = plan.installs.len(),
        removals = plan.removals.len(),
        updates = plan.updates.len(),
        "committing transaction"
    );
    let mut commit_state = state.child()?;
    download_commit(ctx, job, &mut commit_state, &plan)?;
    state.step_done()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pakt_types::Group;

    use super::*;
    use crate::sack::SackFlags;

    fn meta(name: &str, version: &str, repo: &str) -> Arc<PackageMeta> {
        Arc::new(PackageMeta {
            name: name.to_string(),
            evr: Evr::parse(version),
            arch: "x86_64".to_string(),
            repo_id: repo.to_string(),
            origin: None,
            summary: String::new(),
            description: String::new(),
            license: String::new(),
            group: Group::System,
            url: String::new(),
            size: 0,
            files: Vec::new(),
            provides: Vec::new(),
            requires: Vec::new(),
            obsoletes: Vec::new(),
            advisory: None,
            eula: None,
        })
    }

    fn sack(packages: Vec<Arc<PackageMeta>>) -> Sack {
        Sack {
            packages,
            flags: SackFlags::default(),
            generation: 1,
        }
    }

    fn id(name: &str, version: &str) -> PackageId {
        PackageId::new(name, version, "x86_64", "fedora").unwrap()
    }

    #[test]
    fn test_relation_not_installed() {
        let sack = sack(vec![meta("hal", "1.0", "fedora")]);
        let (relation, _) = install_relation(&sack, &id("hal", "1.0"));
        assert_eq!(relation, InstallRelation::NotInstalled);
    }

    #[test]
    fn test_relation_same_newer_older() {
        let sack = sack(vec![meta("hal", "1.0", "installed")]);
        assert_eq!(
            install_relation(&sack, &id("hal", "1.0")).0,
            InstallRelation::Same
        );
        assert_eq!(
            install_relation(&sack, &id("hal", "1.1")).0,
            InstallRelation::Newer
        );
        assert_eq!(
            install_relation(&sack, &id("hal", "0.9")).0,
            InstallRelation::Older
        );
    }

    #[test]
    fn test_relation_reports_latest_installed() {
        let sack = sack(vec![
            meta("hal", "1.1", "installed"),
            meta("hal", "1.2", "installed"),
        ]);
        let (relation, latest) = install_relation(&sack, &id("hal", "1.0"));
        assert_eq!(relation, InstallRelation::Older);
        assert_eq!(latest.unwrap().to_string(), "1.2");
    }

    #[test]
    fn test_protected_removal_detection() {
        let mut plan = Plan::default();
        plan.removals.push(meta("glibc", "2.38", "installed"));
        assert_eq!(protected_removal(&plan), Some("glibc"));

        let mut plan = Plan::default();
        plan.obsoleted.push(meta("rpm", "4.18", "installed"));
        assert_eq!(protected_removal(&plan), Some("rpm"));

        let mut plan = Plan::default();
        plan.removals.push(meta("hal", "1.0", "installed"));
        assert_eq!(protected_removal(&plan), None);
    }
}
