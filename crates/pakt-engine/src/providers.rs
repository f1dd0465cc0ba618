//! Seams to the native package libraries.
//!
//! The engine never talks HTTP, SQL or rpm itself; it consumes a repo
//! loader, a package source, a depsolver, a downloader and a
//! transaction runner. Native backends wire these to the real
//! libraries; tests and the direct harness wire them to in-memory
//! doubles.

use std::path::PathBuf;
use std::sync::Arc;

use pakt_state::State;
use pakt_types::{
    Category, DistroUpgrade, Evr, Group, PackageId, RepoSignature, Status, TypesResult,
    UpdateDetail,
};
use thiserror::Error;

use crate::error::OpResult;

/// The well-known repo id of the installed system.
pub const SYSTEM_REPO_ID: &str = "installed";
/// The pseudo-repo for ad-hoc local files; always untrusted.
pub const CMDLINE_REPO_ID: &str = "cmdline";

/// One package as known to a sack.
#[derive(Debug, Clone)]
pub struct PackageMeta {
    pub name: String,
    pub evr: Evr,
    pub arch: String,
    /// Repo this instance lives in; `SYSTEM_REPO_ID` for installed
    /// packages, `CMDLINE_REPO_ID` for local files.
    pub repo_id: String,
    /// For installed packages, the repo they were installed from.
    pub origin: Option<String>,
    pub summary: String,
    pub description: String,
    pub license: String,
    pub group: Group,
    pub url: String,
    pub size: u64,
    pub files: Vec<String>,
    pub provides: Vec<String>,
    pub requires: Vec<String>,
    pub obsoletes: Vec<String>,
    /// Advisory data when this package is an update.
    pub advisory: Option<UpdateDetail>,
    /// License that must be accepted before this package installs.
    pub eula: Option<EulaNotice>,
}

/// A license agreement attached to a package.
#[derive(Debug, Clone)]
pub struct EulaNotice {
    pub eula_id: String,
    pub vendor: String,
    pub license_agreement: String,
}

impl PackageMeta {
    pub fn is_installed(&self) -> bool {
        self.repo_id == SYSTEM_REPO_ID
    }

    pub fn is_local(&self) -> bool {
        self.repo_id == CMDLINE_REPO_ID
    }

    /// The canonical id, with origin data for installed packages.
    pub fn package_id(&self) -> TypesResult<PackageId> {
        let data = if self.is_installed() {
            match &self.origin {
                Some(origin) => format!("installed:{origin}"),
                None => "installed".to_string(),
            }
        } else if self.is_local() {
            "local".to_string()
        } else {
            self.repo_id.clone()
        };
        PackageId::new(&self.name, self.evr.to_string(), &self.arch, data)
    }

    /// True when the id's name, version and arch match this package.
    pub fn matches_id(&self, id: &PackageId) -> bool {
        self.name == id.name()
            && self.arch == id.arch()
            && self.evr == Evr::parse(id.version())
    }
}

/// Kinds of configured repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoKind {
    Remote,
    Media,
    Local,
}

/// One configured repository.
#[derive(Debug, Clone)]
pub struct RepoInfo {
    pub id: String,
    pub description: String,
    pub enabled: bool,
    pub kind: RepoKind,
    pub gpgcheck: bool,
}

/// Options for a metadata update.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateFlags {
    /// Import the repo's published signing key while fetching.
    pub import_pubkey: bool,
}

/// Per-repo refresh failures. `CannotFetchSource` is soft: the refresh
/// loop reports it and moves on. `SignatureRequired` carries the prompt
/// as a value so no unwinding crosses the refresh frame.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("cannot fetch source: {0}")]
    CannotFetchSource(String),
    #[error("repository signature requires approval")]
    SignatureRequired(Box<RepoSignature>),
    #[error("{0}")]
    Other(String),
}

/// Loads and maintains repository configuration and metadata.
pub trait RepoLoader: Send + Sync {
    fn repos(&self) -> OpResult<Vec<RepoInfo>>;

    /// Whether the repo's cached metadata is within `max_age` seconds.
    fn check(&self, repo_id: &str, max_age: u32) -> bool;

    /// Drops cached metadata for the repo.
    fn clean(&self, repo_id: &str) -> OpResult<()>;

    /// Downloads fresh metadata, reporting progress through `state`.
    fn update(
        &self,
        repo_id: &str,
        flags: UpdateFlags,
        state: &mut State,
    ) -> Result<(), RefreshError>;

    /// Records a signing key as trusted for this loader.
    fn import_key(&self, signature: &RepoSignature) -> OpResult<()>;

    /// AppStream payload files published by the repo, installed into
    /// the shared cache after a successful refresh.
    fn appstream_payloads(&self, repo_id: &str) -> Vec<PathBuf>;

    fn set_enabled(&self, repo_id: &str, enabled: bool) -> OpResult<()>;

    fn set_data(&self, repo_id: &str, key: &str, value: &str) -> OpResult<()>;

    /// Whether the repo's gpgcheck flag is set; `None` for unknown
    /// repos.
    fn gpgcheck(&self, repo_id: &str) -> Option<bool>;

    /// Media repos can disappear between jobs, which limits sack
    /// caching.
    fn has_removable_repos(&self) -> bool;
}

/// Supplies the package universes a sack is built from.
pub trait PackageSource: Send + Sync {
    fn release_version(&self) -> String;

    fn native_arches(&self) -> Vec<String>;

    fn installed(&self) -> OpResult<Vec<Arc<PackageMeta>>>;

    fn repo_packages(&self, repo_id: &str) -> OpResult<Vec<Arc<PackageMeta>>>;

    /// Reads a local package file into metadata. Used by install-files.
    fn load_local_file(&self, path: &std::path::Path) -> OpResult<Arc<PackageMeta>>;

    fn distro_upgrades(&self) -> Vec<DistroUpgrade> {
        Vec::new()
    }

    fn categories(&self) -> Vec<Category> {
        Vec::new()
    }
}

/// What the user asked the solver to do.
#[derive(Debug, Clone)]
pub enum GoalOp {
    Install(Arc<PackageMeta>),
    Reinstall(Arc<PackageMeta>),
    Update(Arc<PackageMeta>),
    Downgrade(Arc<PackageMeta>),
    Remove {
        package: Arc<PackageMeta>,
        allow_deps: bool,
        autoremove: bool,
    },
    UpgradeAll,
    DistroUpgrade(String),
}

#[derive(Debug, Clone, Default)]
pub struct Goal {
    pub ops: Vec<GoalOp>,
}

impl Goal {
    pub fn push(&mut self, op: GoalOp) {
        self.ops.push(op);
    }
}

/// A depsolved transaction, classified by operation.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub installs: Vec<Arc<PackageMeta>>,
    pub reinstalls: Vec<Arc<PackageMeta>>,
    /// The incoming packages of upgrades; the outgoing halves are
    /// implied and never reported as removals.
    pub updates: Vec<Arc<PackageMeta>>,
    pub downgrades: Vec<Arc<PackageMeta>>,
    pub removals: Vec<Arc<PackageMeta>>,
    pub obsoleted: Vec<Arc<PackageMeta>>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.installs.is_empty()
            && self.reinstalls.is_empty()
            && self.updates.is_empty()
            && self.downgrades.is_empty()
            && self.removals.is_empty()
            && self.obsoleted.is_empty()
    }

    /// Packages whose payload has to come from somewhere, in the order
    /// they will be fetched.
    pub fn incoming(&self) -> impl Iterator<Item = &Arc<PackageMeta>> {
        self.installs
            .iter()
            .chain(self.reinstalls.iter())
            .chain(self.updates.iter())
            .chain(self.downgrades.iter())
    }

    /// Incoming packages that live in a remote repo.
    pub fn remote_packages(&self) -> Vec<Arc<PackageMeta>> {
        self.incoming()
            .filter(|p| !p.is_installed() && !p.is_local())
            .cloned()
            .collect()
    }
}

/// A single unsolvable dependency problem.
#[derive(Debug, Clone)]
pub struct DepsolveProblem {
    pub description: String,
}

/// The external depsolver.
pub trait Solver: Send + Sync {
    fn depsolve(&self, sack: &crate::sack::Sack, goal: &Goal)
        -> Result<Plan, Vec<DepsolveProblem>>;
}

/// Streaming download progress for one package.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub package: Arc<PackageMeta>,
    pub percentage: u32,
    pub speed: u64,
    pub size_remaining: u64,
}

/// The external payload downloader.
pub trait Downloader: Send + Sync {
    fn download(
        &self,
        packages: &[Arc<PackageMeta>],
        state: &mut State,
        progress: &mut dyn FnMut(DownloadProgress),
    ) -> OpResult<()>;
}

/// Per-item commit progress.
#[derive(Debug, Clone)]
pub struct CommitProgress {
    pub package: Arc<PackageMeta>,
    pub status: Status,
    pub percentage: u32,
}

/// Flags forwarded into the native transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitFlags {
    pub only_trusted: bool,
    pub allow_reinstall: bool,
    pub allow_downgrade: bool,
    /// Run a transaction test instead of mutating the system; used by
    /// only-download.
    pub test_only: bool,
}

/// Applies a depsolved plan to the system.
pub trait TransactionRunner: Send + Sync {
    fn commit(
        &self,
        plan: &Plan,
        flags: CommitFlags,
        state: &mut State,
        progress: &mut dyn FnMut(CommitProgress),
    ) -> OpResult<()>;
}

/// Everything a native backend plugs into the engine.
#[derive(Clone)]
pub struct Providers {
    pub source: Arc<dyn PackageSource>,
    pub repos: Arc<dyn RepoLoader>,
    pub solver: Arc<dyn Solver>,
    pub downloader: Arc<dyn Downloader>,
    pub runner: Arc<dyn TransactionRunner>,
}
