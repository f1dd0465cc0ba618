//! The fixture universe.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use pakt_engine::providers::{PackageMeta, RepoInfo, RepoKind, SYSTEM_REPO_ID};
use pakt_types::{Category, DistroUpgrade, Evr, Group, RepoSignature};

/// One fixture repository with its failure knobs.
pub struct MemoryRepo {
    pub info: RepoInfo,
    pub packages: Vec<Arc<PackageMeta>>,
    /// Stale metadata: refresh will re-download it.
    pub stale: bool,
    /// Makes update fail softly with CannotFetchSource.
    pub fetch_failure: Option<String>,
    /// Signing key that needs a trust decision before updates succeed.
    pub signature: Option<RepoSignature>,
    pub key_imported: bool,
    /// AppStream payload files published by this repo.
    pub appstream: Vec<PathBuf>,
    pub data: BTreeMap<String, String>,
}

impl MemoryRepo {
    pub fn new(id: &str, description: &str) -> Self {
        Self {
            info: RepoInfo {
                id: id.to_string(),
                description: description.to_string(),
                enabled: true,
                kind: RepoKind::Remote,
                gpgcheck: true,
            },
            packages: Vec::new(),
            stale: false,
            fetch_failure: None,
            signature: None,
            key_imported: false,
            appstream: Vec::new(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_package(mut self, package: PackageMeta) -> Self {
        self.packages.push(Arc::new(package));
        self
    }
}

/// The whole fixture state shared by all providers.
pub struct MemoryWorld {
    pub release: String,
    pub arches: Vec<String>,
    pub installed: Mutex<Vec<Arc<PackageMeta>>>,
    pub repos: Mutex<Vec<MemoryRepo>>,
    pub local_files: Mutex<HashMap<PathBuf, Arc<PackageMeta>>>,
    /// Package-id text of every payload the downloader fetched.
    pub downloaded: Mutex<Vec<String>>,
    pub distro_upgrades: Mutex<Vec<DistroUpgrade>>,
    pub categories: Mutex<Vec<Category>>,
}

impl MemoryWorld {
    pub fn new(release: &str) -> Arc<Self> {
        Arc::new(Self {
            release: release.to_string(),
            arches: vec!["x86_64".to_string(), "noarch".to_string()],
            installed: Mutex::new(Vec::new()),
            repos: Mutex::new(Vec::new()),
            local_files: Mutex::new(HashMap::new()),
            downloaded: Mutex::new(Vec::new()),
            distro_upgrades: Mutex::new(Vec::new()),
            categories: Mutex::new(Vec::new()),
        })
    }

    /// Marks a package as installed, recording which repo it came from.
    pub fn add_installed(&self, mut package: PackageMeta, origin: Option<&str>) {
        package.origin = origin.map(str::to_string);
        package.repo_id = SYSTEM_REPO_ID.to_string();
        self.installed.lock().unwrap().push(Arc::new(package));
    }

    pub fn add_repo(&self, repo: MemoryRepo) {
        self.repos.lock().unwrap().push(repo);
    }

    /// Registers a package file for install-files.
    pub fn add_local_file(&self, path: PathBuf, mut package: PackageMeta) {
        package.repo_id = pakt_engine::providers::CMDLINE_REPO_ID.to_string();
        self.local_files
            .lock()
            .unwrap()
            .insert(path, Arc::new(package));
    }

    pub fn installed_names(&self) -> Vec<String> {
        self.installed
            .lock()
            .unwrap()
            .iter()
            .map(|p| format!("{}-{}", p.name, p.evr))
            .collect()
    }

    pub fn is_installed(&self, name: &str, version: &str) -> bool {
        let evr = Evr::parse(version);
        self.installed
            .lock()
            .unwrap()
            .iter()
            .any(|p| p.name == name && p.evr == evr)
    }
}

/// Builds a plain package for fixtures.
pub fn package(name: &str, version: &str, arch: &str, repo_id: &str) -> PackageMeta {
    PackageMeta {
        name: name.to_string(),
        evr: Evr::parse(version),
        arch: arch.to_string(),
        repo_id: repo_id.to_string(),
        origin: None,
        summary: format!("{name} test package"),
        description: format!("The {name} package used by the in-memory backend."),
        license: "GPLv2+".to_string(),
        group: Group::System,
        url: format!("https://example.com/{name}"),
        size: 1024,
        files: vec![format!("/usr/bin/{name}")],
        provides: vec![name.to_string()],
        requires: Vec::new(),
        obsoletes: Vec::new(),
        advisory: None,
        eula: None,
    }
}
