//! The canonical four-part package identifier.

use std::fmt;
use std::str::FromStr;

use crate::error::TypesError;
use crate::TypesResult;

/// `data` value for a package installed from an unknown origin.
pub const DATA_INSTALLED: &str = "installed";
/// `data` prefix for a package installed from a known repository.
pub const DATA_INSTALLED_PREFIX: &str = "installed:";
/// `data` value for an ad-hoc local file.
pub const DATA_LOCAL: &str = "local";

/// Canonical package identifier: `name;version;arch;data`.
///
/// `data` encodes the origin: `installed`, `installed:<repo>`, `local`,
/// or a repository id. Equality is component-wise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageId {
    name: String,
    version: String,
    arch: String,
    data: String,
}

impl PackageId {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        arch: impl Into<String>,
        data: impl Into<String>,
    ) -> TypesResult<Self> {
        let id = Self {
            name: name.into(),
            version: version.into(),
            arch: arch.into(),
            data: data.into(),
        };
        for field in [&id.name, &id.version, &id.arch, &id.data] {
            if field.contains(';') || field.contains('\n') {
                return Err(TypesError::InvalidPackageIdField(field.clone()));
            }
        }
        Ok(id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    /// True for both `installed` and `installed:<repo>`.
    pub fn is_installed(&self) -> bool {
        self.data == DATA_INSTALLED || self.data.starts_with(DATA_INSTALLED_PREFIX)
    }

    /// The repository this package was installed from, when recorded.
    pub fn installed_from(&self) -> Option<&str> {
        self.data.strip_prefix(DATA_INSTALLED_PREFIX)
    }

    pub fn is_local(&self) -> bool {
        self.data == DATA_LOCAL
    }

    /// The repository id for an available package, `None` for installed
    /// or local packages.
    pub fn repo_id(&self) -> Option<&str> {
        if self.is_installed() || self.is_local() {
            None
        } else {
            Some(&self.data)
        }
    }

    /// Human-facing form used in error messages: `name-version.arch`.
    pub fn printable(&self) -> String {
        format!("{}-{}.{}", self.name, self.version, self.arch)
    }

    /// Checks a candidate string without building a `PackageId`.
    pub fn is_valid_text(text: &str) -> bool {
        Self::from_str(text).is_ok()
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{};{}", self.name, self.version, self.arch, self.data)
    }
}

impl FromStr for PackageId {
    type Err = TypesError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if text.contains('\n') {
            return Err(TypesError::InvalidPackageId {
                id: text.to_string(),
                reason: "embedded newline",
            });
        }
        let fields: Vec<&str> = text.split(';').collect();
        if fields.len() != 4 {
            return Err(TypesError::InvalidPackageId {
                id: text.to_string(),
                reason: "expected exactly four fields",
            });
        }
        if fields[0].is_empty() {
            return Err(TypesError::InvalidPackageId {
                id: text.to_string(),
                reason: "empty name",
            });
        }
        Ok(Self {
            name: fields[0].to_string(),
            version: fields[1].to_string(),
            arch: fields[2].to_string(),
            data: fields[3].to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build() {
        let id = PackageId::new("gnome-power-manager", "3.6.1", "x86_64", "G:F").unwrap();
        assert_eq!(id.to_string(), "gnome-power-manager;3.6.1;x86_64;G:F");
    }

    #[test]
    fn test_round_trip() {
        let id = PackageId::new("hal", "0.5.8", "i386", "fedora").unwrap();
        let parsed: PackageId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_split_rejects_wrong_field_count() {
        assert!(PackageId::from_str("a;b;c").is_err());
        assert!(PackageId::from_str("a;b;c;d;e").is_err());
    }

    #[test]
    fn test_rejects_embedded_newline() {
        assert!(PackageId::from_str("a;b;c;d\ne").is_err());
        assert!(PackageId::new("a\nb", "1", "noarch", "repo").is_err());
    }

    #[test]
    fn test_rejects_semicolon_in_field() {
        assert!(PackageId::new("a;b", "1", "noarch", "repo").is_err());
    }

    #[test]
    fn test_data_classifiers() {
        let installed: PackageId = "hal;0.5.8;i386;installed".parse().unwrap();
        assert!(installed.is_installed());
        assert_eq!(installed.repo_id(), None);

        let from_repo: PackageId = "hal;0.5.8;i386;installed:fedora".parse().unwrap();
        assert!(from_repo.is_installed());
        assert_eq!(from_repo.installed_from(), Some("fedora"));

        let local: PackageId = "hal;0.5.8;i386;local".parse().unwrap();
        assert!(local.is_local());

        let available: PackageId = "hal;0.5.8;i386;updates".parse().unwrap();
        assert_eq!(available.repo_id(), Some("updates"));
    }
}
