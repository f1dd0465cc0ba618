//! Filesystem layout under the configured destination root.

use std::path::{Path, PathBuf};

/// Repository metadata cache: `<dest>/var/cache/pakt/<release>/metadata`.
pub fn metadata_dir(dest_dir: &Path, release: &str) -> PathBuf {
    dest_dir
        .join("var/cache/pakt")
        .join(release)
        .join("metadata")
}

/// Solver cache: `<dest>/var/cache/pakt/<release>/solv`.
pub fn solv_dir(dest_dir: &Path, release: &str) -> PathBuf {
    dest_dir.join("var/cache/pakt").join(release).join("solv")
}

/// Named-lock directory: `<dest>/var/run/pakt`.
pub fn run_dir(dest_dir: &Path) -> PathBuf {
    dest_dir.join("var/run/pakt")
}

/// Shared AppStream cache picked up by software centers.
pub fn appstream_dir(dest_dir: &Path) -> PathBuf {
    dest_dir.join("var/cache/app-info/xmls")
}

/// Transient firmware-request queue cleared after transactions.
pub fn firmware_requests_dir(dest_dir: &Path) -> PathBuf {
    run_dir(dest_dir).join("udev")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let dest = Path::new("/");
        assert_eq!(
            metadata_dir(dest, "38"),
            PathBuf::from("/var/cache/pakt/38/metadata")
        );
        assert_eq!(solv_dir(dest, "38"), PathBuf::from("/var/cache/pakt/38/solv"));
        assert_eq!(run_dir(dest), PathBuf::from("/var/run/pakt"));
        assert_eq!(firmware_requests_dir(dest), PathBuf::from("/var/run/pakt/udev"));
    }

    #[test]
    fn test_respects_dest_dir() {
        let dest = Path::new("/tmp/root");
        assert!(metadata_dir(dest, "38").starts_with("/tmp/root"));
    }
}
