//! Provider implementations over the fixture world.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pakt_engine::error::{JobFailure, OpResult};
use pakt_engine::providers::{
    CommitFlags, CommitProgress, DepsolveProblem, DownloadProgress, Downloader, Goal, GoalOp,
    PackageMeta, PackageSource, Plan, RefreshError, RepoInfo, RepoKind, RepoLoader, Solver,
    TransactionRunner, UpdateFlags, SYSTEM_REPO_ID,
};
use pakt_engine::sack::Sack;
use pakt_state::State;
use pakt_types::{Category, DistroUpgrade, PkError, RepoSignature, Status};
use tracing::debug;

use crate::world::MemoryWorld;

pub struct WorldSource(pub Arc<MemoryWorld>);
pub struct WorldRepos(pub Arc<MemoryWorld>);
pub struct WorldSolver(pub Arc<MemoryWorld>);
pub struct WorldDownloader(pub Arc<MemoryWorld>);
pub struct WorldRunner(pub Arc<MemoryWorld>);

impl PackageSource for WorldSource {
    fn release_version(&self) -> String {
        self.0.release.clone()
    }

    fn native_arches(&self) -> Vec<String> {
        self.0.arches.clone()
    }

    fn installed(&self) -> OpResult<Vec<Arc<PackageMeta>>> {
        Ok(self.0.installed.lock().unwrap().clone())
    }

    fn repo_packages(&self, repo_id: &str) -> OpResult<Vec<Arc<PackageMeta>>> {
        let repos = self.0.repos.lock().unwrap();
        let repo = repos
            .iter()
            .find(|r| r.info.id == repo_id)
            .ok_or_else(|| JobFailure::new(PkError::RepoNotFound, format!("no repo {repo_id}")))?;
        Ok(repo.packages.clone())
    }

    fn load_local_file(&self, path: &Path) -> OpResult<Arc<PackageMeta>> {
        self.0
            .local_files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| {
                JobFailure::new(
                    PkError::LocalInstallFailed,
                    format!("{} is not a readable package file", path.display()),
                )
            })
    }

    fn distro_upgrades(&self) -> Vec<DistroUpgrade> {
        self.0.distro_upgrades.lock().unwrap().clone()
    }

    fn categories(&self) -> Vec<Category> {
        self.0.categories.lock().unwrap().clone()
    }
}

impl RepoLoader for WorldRepos {
    fn repos(&self) -> OpResult<Vec<RepoInfo>> {
        Ok(self
            .0
            .repos
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.info.clone())
            .collect())
    }

    fn check(&self, repo_id: &str, _max_age: u32) -> bool {
        let repos = self.0.repos.lock().unwrap();
        repos
            .iter()
            .find(|r| r.info.id == repo_id)
            .map(|r| !r.stale)
            .unwrap_or(false)
    }

    fn clean(&self, repo_id: &str) -> OpResult<()> {
        debug!(repo = repo_id, "cleaned repo cache");
        Ok(())
    }

    fn update(
        &self,
        repo_id: &str,
        flags: UpdateFlags,
        state: &mut State,
    ) -> Result<(), RefreshError> {
        let mut repos = self.0.repos.lock().unwrap();
        let repo = repos
            .iter_mut()
            .find(|r| r.info.id == repo_id)
            .ok_or_else(|| RefreshError::Other(format!("no repo {repo_id}")))?;

        if let Some(message) = &repo.fetch_failure {
            return Err(RefreshError::CannotFetchSource(message.clone()));
        }
        if let Some(signature) = &repo.signature {
            if !repo.key_imported && !flags.import_pubkey {
                return Err(RefreshError::SignatureRequired(Box::new(signature.clone())));
            }
            repo.key_imported = true;
        }

        let stepped = state
            .set_number_steps(2)
            .and_then(|_| state.step_done())
            .and_then(|_| state.step_done());
        stepped.map_err(|err| RefreshError::Other(err.to_string()))?;
        repo.stale = false;
        Ok(())
    }

    fn import_key(&self, signature: &RepoSignature) -> OpResult<()> {
        let mut repos = self.0.repos.lock().unwrap();
        for repo in repos.iter_mut() {
            if let Some(pending) = &repo.signature {
                if pending.key_id == signature.key_id {
                    repo.key_imported = true;
                }
            }
        }
        Ok(())
    }

    fn appstream_payloads(&self, repo_id: &str) -> Vec<PathBuf> {
        let repos = self.0.repos.lock().unwrap();
        repos
            .iter()
            .find(|r| r.info.id == repo_id)
            .map(|r| r.appstream.clone())
            .unwrap_or_default()
    }

    fn set_enabled(&self, repo_id: &str, enabled: bool) -> OpResult<()> {
        let mut repos = self.0.repos.lock().unwrap();
        let repo = repos
            .iter_mut()
            .find(|r| r.info.id == repo_id)
            .ok_or_else(|| JobFailure::new(PkError::RepoNotFound, format!("no repo {repo_id}")))?;
        repo.info.enabled = enabled;
        Ok(())
    }

    fn set_data(&self, repo_id: &str, key: &str, value: &str) -> OpResult<()> {
        let mut repos = self.0.repos.lock().unwrap();
        let repo = repos
            .iter_mut()
            .find(|r| r.info.id == repo_id)
            .ok_or_else(|| JobFailure::new(PkError::RepoNotFound, format!("no repo {repo_id}")))?;
        match key {
            "enabled" => repo.info.enabled = value == "1" || value == "true",
            _ => {
                repo.data.insert(key.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    fn gpgcheck(&self, repo_id: &str) -> Option<bool> {
        let repos = self.0.repos.lock().unwrap();
        repos
            .iter()
            .find(|r| r.info.id == repo_id)
            .map(|r| r.info.gpgcheck)
    }

    fn has_removable_repos(&self) -> bool {
        let repos = self.0.repos.lock().unwrap();
        repos.iter().any(|r| r.info.kind == RepoKind::Media)
    }
}

/// Whether `requirement` is satisfied by any package in `candidates`.
fn satisfies<'a, I>(candidates: I, requirement: &str) -> bool
where
    I: IntoIterator<Item = &'a Arc<PackageMeta>>,
{
    candidates
        .into_iter()
        .any(|p| p.name == requirement || p.provides.iter().any(|pr| pr == requirement))
}

impl Solver for WorldSolver {
    /// A one-level-at-a-time requires closure: not a SAT solver, but
    /// deterministic and honest about unsolvable requests.
    fn depsolve(&self, sack: &Sack, goal: &Goal) -> Result<Plan, Vec<DepsolveProblem>> {
        let mut plan = Plan::default();
        let mut problems = Vec::new();

        let installed: Vec<Arc<PackageMeta>> = sack.installed().cloned().collect();

        for op in &goal.ops {
            match op {
                GoalOp::Install(package) => plan.installs.push(Arc::clone(package)),
                GoalOp::Reinstall(package) => plan.reinstalls.push(Arc::clone(package)),
                GoalOp::Update(package) => plan.updates.push(Arc::clone(package)),
                GoalOp::Downgrade(package) => plan.downgrades.push(Arc::clone(package)),
                GoalOp::Remove {
                    package,
                    allow_deps,
                    autoremove: _,
                } => {
                    plan.removals.push(Arc::clone(package));
                    // drag dependents in, or refuse
                    for dependent in installed.iter().filter(|p| {
                        p.name != package.name
                            && p.requires
                                .iter()
                                .any(|r| *r == package.name || package.provides.contains(r))
                    }) {
                        if *allow_deps {
                            plan.removals.push(Arc::clone(dependent));
                        } else {
                            problems.push(DepsolveProblem {
                                description: format!(
                                    "package {} requires {}",
                                    dependent.name, package.name
                                ),
                            });
                        }
                    }
                }
                GoalOp::UpgradeAll | GoalOp::DistroUpgrade(_) => {
                    for current in &installed {
                        let newest = sack
                            .available()
                            .filter(|p| {
                                p.name == current.name
                                    && p.arch == current.arch
                                    && p.evr > current.evr
                            })
                            .max_by(|a, b| a.evr.cmp(&b.evr));
                        if let Some(newest) = newest {
                            plan.updates.push(Arc::clone(newest));
                        }
                    }
                }
            }
        }

        // obsoletes: an incoming package may replace an unrelated
        // installed one
        let incoming: Vec<Arc<PackageMeta>> = plan.incoming().cloned().collect();
        for package in &incoming {
            for obsoleted_name in &package.obsoletes {
                if let Some(existing) = installed.iter().find(|p| p.name == *obsoleted_name) {
                    plan.obsoleted.push(Arc::clone(existing));
                }
            }
        }

        // requires closure over everything coming in
        let mut queue: Vec<Arc<PackageMeta>> = incoming;
        while let Some(package) = queue.pop() {
            for requirement in &package.requires {
                let in_plan: Vec<Arc<PackageMeta>> = plan.incoming().cloned().collect();
                if satisfies(installed.iter(), requirement)
                    || satisfies(in_plan.iter(), requirement)
                {
                    continue;
                }
                match sack
                    .available()
                    .find(|p| p.name == *requirement || p.provides.iter().any(|pr| pr == requirement))
                {
                    Some(dependency) => {
                        plan.installs.push(Arc::clone(dependency));
                        queue.push(Arc::clone(dependency));
                    }
                    None => problems.push(DepsolveProblem {
                        description: format!(
                            "nothing provides {} needed by {}",
                            requirement, package.name
                        ),
                    }),
                }
            }
        }

        if problems.is_empty() {
            Ok(plan)
        } else {
            Err(problems)
        }
    }
}

impl Downloader for WorldDownloader {
    fn download(
        &self,
        packages: &[Arc<PackageMeta>],
        state: &mut State,
        progress: &mut dyn FnMut(DownloadProgress),
    ) -> OpResult<()> {
        state.set_number_steps(packages.len().max(1))?;
        let total: u64 = packages.iter().map(|p| p.size).sum();
        let mut fetched = 0u64;
        for package in packages {
            for percentage in [25u32, 50, 75, 100] {
                progress(DownloadProgress {
                    package: Arc::clone(package),
                    percentage,
                    speed: 4096,
                    size_remaining: total - fetched - package.size * u64::from(percentage) / 100,
                });
            }
            fetched += package.size;
            if let Ok(id) = package.package_id() {
                self.0.downloaded.lock().unwrap().push(id.to_string());
            }
            state.step_done()?;
        }
        if packages.is_empty() {
            state.step_done()?;
        }
        Ok(())
    }
}

impl TransactionRunner for WorldRunner {
    fn commit(
        &self,
        plan: &Plan,
        flags: CommitFlags,
        state: &mut State,
        progress: &mut dyn FnMut(CommitProgress),
    ) -> OpResult<()> {
        let outgoing: Vec<Arc<PackageMeta>> = plan
            .removals
            .iter()
            .chain(plan.obsoleted.iter())
            .cloned()
            .collect();
        let incoming: Vec<Arc<PackageMeta>> = plan.incoming().cloned().collect();
        let total = outgoing.len() + incoming.len();
        state.set_number_steps(total.max(1))?;
        if total == 0 {
            state.step_done()?;
            return Ok(());
        }

        if flags.test_only {
            // transaction test: walk the plan without touching the
            // installed set
            for package in outgoing.iter().chain(incoming.iter()) {
                progress(CommitProgress {
                    package: Arc::clone(package),
                    status: Status::TestCommit,
                    percentage: 100,
                });
                state.step_done()?;
            }
            return Ok(());
        }

        let mut installed = self.0.installed.lock().unwrap();
        for package in &outgoing {
            progress(CommitProgress {
                package: Arc::clone(package),
                status: Status::Remove,
                percentage: 100,
            });
            installed.retain(|p| !(p.name == package.name && p.arch == package.arch));
            state.step_done()?;
        }
        for package in &incoming {
            progress(CommitProgress {
                package: Arc::clone(package),
                status: Status::Install,
                percentage: 100,
            });
            // an upgrade or downgrade replaces the installed instance
            installed.retain(|p| !(p.name == package.name && p.arch == package.arch));
            let mut record = PackageMeta::clone(package);
            record.origin = Some(package.repo_id.clone());
            record.repo_id = SYSTEM_REPO_ID.to_string();
            installed.push(Arc::new(record));
            state.step_done()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pakt_engine::sack::SackFlags;

    use super::*;
    use crate::world::{package, MemoryWorld};

    fn sack(packages: Vec<Arc<PackageMeta>>) -> Sack {
        Sack {
            packages,
            flags: SackFlags::default(),
            generation: 1,
        }
    }

    fn installed(name: &str, version: &str) -> Arc<PackageMeta> {
        let mut p = package(name, version, "x86_64", SYSTEM_REPO_ID);
        p.origin = Some("fedora".to_string());
        Arc::new(p)
    }

    #[test]
    fn test_solver_pulls_missing_requirement() {
        let mut app = package("app", "1.0", "x86_64", "fedora");
        app.requires = vec!["libdep".to_string()];
        let lib = package("libdep", "1.0", "x86_64", "fedora");
        let app = Arc::new(app);
        let sack = sack(vec![Arc::clone(&app), Arc::new(lib)]);

        let world = MemoryWorld::new("38");
        let solver = WorldSolver(world);
        let goal = Goal {
            ops: vec![GoalOp::Install(app)],
        };
        let plan = solver.depsolve(&sack, &goal).unwrap();
        let names: Vec<&str> = plan.installs.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"app"));
        assert!(names.contains(&"libdep"));
    }

    #[test]
    fn test_solver_refuses_removal_with_dependents() {
        let mut dependent = package("dependent", "1.0", "x86_64", SYSTEM_REPO_ID);
        dependent.requires = vec!["base".to_string()];
        let base = installed("base", "1.0");
        let sack = sack(vec![Arc::new(dependent), Arc::clone(&base)]);

        let world = MemoryWorld::new("38");
        let solver = WorldSolver(world);
        let goal = Goal {
            ops: vec![GoalOp::Remove {
                package: base,
                allow_deps: false,
                autoremove: false,
            }],
        };
        let problems = solver.depsolve(&sack, &goal).unwrap_err();
        assert!(problems[0].description.contains("requires base"));
    }

    #[test]
    fn test_solver_upgrade_all_picks_newest() {
        let current = installed("tool", "1.0");
        let sack = sack(vec![
            Arc::clone(&current),
            Arc::new(package("tool", "1.1", "x86_64", "fedora")),
            Arc::new(package("tool", "1.2", "x86_64", "fedora")),
        ]);

        let world = MemoryWorld::new("38");
        let solver = WorldSolver(world);
        let goal = Goal {
            ops: vec![GoalOp::UpgradeAll],
        };
        let plan = solver.depsolve(&sack, &goal).unwrap();
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].evr.to_string(), "1.2");
    }
}
