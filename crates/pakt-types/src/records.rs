//! Result records carried by job events.

use chrono::{DateTime, Utc};

use crate::enums::{DistroUpgradeState, Group, Info, Restart, SigType, UpdateState};
use crate::error::TypesError;
use crate::package_id::PackageId;
use crate::TypesResult;

/// A package as emitted from a query or transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub package_id: PackageId,
    pub info: Info,
    pub summary: String,
}

impl Package {
    pub fn new(package_id: PackageId, info: Info, summary: impl Into<String>) -> Self {
        Self {
            package_id,
            info,
            summary: summary.into(),
        }
    }
}

/// Extended metadata for a single package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Details {
    pub package_id: PackageId,
    pub summary: String,
    pub license: String,
    pub group: Group,
    pub description: String,
    pub url: String,
    pub size: u64,
}

/// The file list of a single package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Files {
    pub package_id: PackageId,
    pub files: Vec<String>,
}

/// Advisory metadata attached to one available update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateDetail {
    pub package_id: Option<PackageId>,
    pub updates: Vec<String>,
    pub obsoletes: Vec<String>,
    pub vendor_urls: Vec<String>,
    pub bugzilla_urls: Vec<String>,
    pub cve_urls: Vec<String>,
    pub restart: Restart,
    pub update_text: String,
    pub changelog: String,
    pub state: UpdateState,
    pub issued: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

impl Default for Restart {
    fn default() -> Self {
        Restart::Unknown
    }
}

impl Default for UpdateState {
    fn default() -> Self {
        UpdateState::Unknown
    }
}

/// An available distribution upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistroUpgrade {
    pub state: DistroUpgradeState,
    pub name: String,
    pub summary: String,
}

/// A node in the package-group category tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub parent_id: String,
    pub cat_id: String,
    pub name: String,
    pub summary: String,
    pub icon: String,
}

impl Category {
    /// Validates the structural rules: a category is not its own parent
    /// and the icon is a named icon, never a filesystem path.
    pub fn new(
        parent_id: impl Into<String>,
        cat_id: impl Into<String>,
        name: impl Into<String>,
        summary: impl Into<String>,
        icon: impl Into<String>,
    ) -> TypesResult<Self> {
        let category = Self {
            parent_id: parent_id.into(),
            cat_id: cat_id.into(),
            name: name.into(),
            summary: summary.into(),
            icon: icon.into(),
        };
        if category.cat_id == category.parent_id {
            return Err(TypesError::CategoryParentCycle(category.cat_id));
        }
        if category.icon.starts_with('/') {
            return Err(TypesError::CategoryIconIsPath(category.icon));
        }
        Ok(category)
    }
}

/// One repository as reported by get-repo-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoDetail {
    pub repo_id: String,
    pub description: String,
    pub enabled: bool,
}

/// A pending signature-trust decision raised during refresh or install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSignature {
    pub package_id: PackageId,
    pub repo_id: String,
    pub url: String,
    pub key_name: String,
    pub key_id: String,
    pub fingerprint: String,
    pub timestamp: String,
    pub sig_type: SigType,
}
