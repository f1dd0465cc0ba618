//! The query and filter engine.
//!
//! Builds a result set from search terms plus a filter bitfield. The
//! post-filters apply in a fixed order: arch pin, install origin, kind,
//! content match, newest. Emission puts installed packages first and
//! suppresses available duplicates of them.

use std::collections::HashSet;
use std::sync::Arc;

use pakt_types::{Bitfield, Filter, Info};

use crate::providers::PackageMeta;
use crate::sack::Sack;

/// How the search terms are matched against the sack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    /// No content match; used by get-packages and get-updates.
    All,
    /// Exact name match.
    Resolve,
    /// Substring match on the name.
    Name,
    /// Substring match on summary and description.
    Details,
    /// Exact or glob match against the file list.
    File,
    /// Match against the provides namespaces.
    Provides,
}

/// Name suffixes treated as development packages.
const DEVEL_SUFFIXES: &[&str] = &["-devel", "-debuginfo", "-debugsource"];

const APPLICATION_GLOB: &str = "/usr/share/applications/*.desktop";

/// Expands each what-provides term into the provides namespaces.
pub fn what_provides_decompose(values: &[String]) -> Vec<String> {
    let mut decomposed = Vec::with_capacity(values.len() * 8);
    for value in values {
        decomposed.push(value.clone());
        decomposed.push(format!("gstreamer0.10({value})"));
        decomposed.push(format!("gstreamer1({value})"));
        decomposed.push(format!("font({value})"));
        decomposed.push(format!("mimehandler({value})"));
        decomposed.push(format!("postscriptdriver({value})"));
        decomposed.push(format!("plasma4({value})"));
        decomposed.push(format!("plasma5({value})"));
    }
    decomposed
}

fn matches_content(package: &PackageMeta, kind: SearchKind, terms: &[String]) -> bool {
    match kind {
        SearchKind::All => true,
        SearchKind::Resolve => terms.iter().any(|t| package.name == *t),
        SearchKind::Name => {
            let name = package.name.to_lowercase();
            terms.iter().any(|t| name.contains(&t.to_lowercase()))
        }
        SearchKind::Details => {
            let haystack =
                format!("{} {}", package.summary, package.description).to_lowercase();
            terms.iter().any(|t| haystack.contains(&t.to_lowercase()))
        }
        SearchKind::File => terms.iter().any(|t| {
            package
                .files
                .iter()
                .any(|f| f == t || fast_glob::glob_match(t, f))
        }),
        SearchKind::Provides => terms
            .iter()
            .any(|t| package.provides.iter().any(|p| p == t)),
    }
}

fn is_devel(package: &PackageMeta) -> bool {
    DEVEL_SUFFIXES.iter().any(|s| package.name.ends_with(s))
}

fn ships_application(package: &PackageMeta) -> bool {
    package
        .files
        .iter()
        .any(|f| fast_glob::glob_match(APPLICATION_GLOB, f))
}

/// Runs a query over the sack.
pub fn run_query(
    sack: &Sack,
    native_arches: &[String],
    kind: SearchKind,
    terms: &[String],
    filters: Bitfield<Filter>,
) -> Vec<Arc<PackageMeta>> {
    let mut results: Vec<Arc<PackageMeta>> = sack
        .packages
        .iter()
        .filter(|p| {
            // arch
            if filters.contains(Filter::Arch) && !native_arches.contains(&p.arch) {
                return false;
            }
            if filters.contains(Filter::NotArch) && native_arches.contains(&p.arch) {
                return false;
            }
            // install origin
            if filters.contains(Filter::Installed) && !p.is_installed() {
                return false;
            }
            if filters.contains(Filter::NotInstalled) && p.is_installed() {
                return false;
            }
            // kind
            if filters.contains(Filter::Source) && p.arch != "src" {
                return false;
            }
            if filters.contains(Filter::NotSource) && p.arch == "src" {
                return false;
            }
            if filters.contains(Filter::Devel) && !is_devel(p) {
                return false;
            }
            if filters.contains(Filter::NotDevel) && is_devel(p) {
                return false;
            }
            if filters.contains(Filter::Application) && !ships_application(p) {
                return false;
            }
            if filters.contains(Filter::NotApplication) && ships_application(p) {
                return false;
            }
            // content
            matches_content(p, kind, terms)
        })
        .cloned()
        .collect();

    if filters.contains(Filter::Newest) {
        results = newest_filter(results);
    }

    results
}

/// Per (name, arch): the greatest installed EVR unioned with the
/// greatest available EVR.
fn newest_filter(packages: Vec<Arc<PackageMeta>>) -> Vec<Arc<PackageMeta>> {
    let mut newest: Vec<Arc<PackageMeta>> = Vec::new();
    for installed in [true, false] {
        let mut best: Vec<Arc<PackageMeta>> = Vec::new();
        for package in packages.iter().filter(|p| p.is_installed() == installed) {
            match best
                .iter_mut()
                .find(|b| b.name == package.name && b.arch == package.arch)
            {
                Some(existing) => {
                    if package.evr > existing.evr {
                        *existing = Arc::clone(package);
                    }
                }
                None => best.push(Arc::clone(package)),
            }
        }
        newest.extend(best);
    }
    newest
}

/// Orders results for emission: installed first, then available
/// packages that do not duplicate an already-emitted installed
/// `(name, version, arch)`.
pub fn order_for_emission(packages: Vec<Arc<PackageMeta>>) -> Vec<Arc<PackageMeta>> {
    let mut ordered: Vec<Arc<PackageMeta>> = Vec::with_capacity(packages.len());
    let mut seen: HashSet<(String, String, String)> = HashSet::new();

    for package in packages.iter().filter(|p| p.is_installed()) {
        seen.insert((
            package.name.clone(),
            package.evr.to_string(),
            package.arch.clone(),
        ));
        ordered.push(Arc::clone(package));
    }
    for package in packages.iter().filter(|p| !p.is_installed()) {
        let key = (
            package.name.clone(),
            package.evr.to_string(),
            package.arch.clone(),
        );
        if !seen.contains(&key) {
            ordered.push(Arc::clone(package));
        }
    }
    ordered
}

/// Info classification for emitted query results.
pub fn info_for(package: &PackageMeta) -> Info {
    if package.is_installed() {
        Info::Installed
    } else {
        Info::Available
    }
}

#[cfg(test)]
mod tests {
    use pakt_types::{Evr, Group};

    use super::*;
    use crate::sack::SackFlags;

    fn meta(name: &str, version: &str, arch: &str, repo: &str) -> Arc<PackageMeta> {
        Arc::new(PackageMeta {
            name: name.to_string(),
            evr: Evr::parse(version),
            arch: arch.to_string(),
            repo_id: repo.to_string(),
            origin: None,
            summary: format!("{name} summary"),
            description: String::new(),
            license: "GPLv2".to_string(),
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

    fn arches() -> Vec<String> {
        vec!["x86_64".to_string(), "noarch".to_string()]
    }

    #[test]
    fn test_resolve_is_exact() {
        let sack = sack(vec![meta("hal", "1.0", "x86_64", "fedora"), meta("hal-info", "1.0", "x86_64", "fedora")]);
        let results = run_query(
            &sack,
            &arches(),
            SearchKind::Resolve,
            &["hal".to_string()],
            Bitfield::none(),
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "hal");
    }

    #[test]
    fn test_search_name_is_substring() {
        let sack = sack(vec![meta("hal", "1.0", "x86_64", "fedora"), meta("hal-info", "1.0", "x86_64", "fedora")]);
        let results = run_query(
            &sack,
            &arches(),
            SearchKind::Name,
            &["hal".to_string()],
            Bitfield::none(),
        );
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_installed_filter() {
        let sack = sack(vec![
            meta("hal", "1.0", "x86_64", "installed"),
            meta("hal", "1.1", "x86_64", "updates"),
        ]);
        let installed = run_query(
            &sack,
            &arches(),
            SearchKind::All,
            &[],
            Bitfield::from_values(&[Filter::Installed]),
        );
        assert_eq!(installed.len(), 1);
        assert!(installed[0].is_installed());

        let available = run_query(
            &sack,
            &arches(),
            SearchKind::All,
            &[],
            Bitfield::from_values(&[Filter::NotInstalled]),
        );
        assert_eq!(available.len(), 1);
        assert!(!available[0].is_installed());
    }

    #[test]
    fn test_arch_and_source_filters() {
        let sack = sack(vec![
            meta("hal", "1.0", "x86_64", "fedora"),
            meta("hal", "1.0", "i686", "fedora"),
            meta("hal", "1.0", "src", "fedora-source"),
        ]);
        let native = run_query(
            &sack,
            &arches(),
            SearchKind::All,
            &[],
            Bitfield::from_values(&[Filter::Arch]),
        );
        assert_eq!(native.len(), 1);
        assert_eq!(native[0].arch, "x86_64");

        let sources = run_query(
            &sack,
            &arches(),
            SearchKind::All,
            &[],
            Bitfield::from_values(&[Filter::Source]),
        );
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].arch, "src");
    }

    #[test]
    fn test_file_search_exact_and_glob() {
        let mut package = PackageMeta::clone(&meta("gimp", "2.10", "x86_64", "fedora"));
        package.files = vec![
            "/usr/bin/gimp".to_string(),
            "/usr/share/applications/gimp.desktop".to_string(),
        ];
        let sack = sack(vec![Arc::new(package)]);

        let by_path = run_query(
            &sack,
            &arches(),
            SearchKind::File,
            &["/usr/bin/gimp".to_string()],
            Bitfield::none(),
        );
        assert_eq!(by_path.len(), 1);

        let by_glob = run_query(
            &sack,
            &arches(),
            SearchKind::File,
            &["/usr/bin/*".to_string()],
            Bitfield::none(),
        );
        assert_eq!(by_glob.len(), 1);

        let applications = run_query(
            &sack,
            &arches(),
            SearchKind::All,
            &[],
            Bitfield::from_values(&[Filter::Application]),
        );
        assert_eq!(applications.len(), 1);
    }

    #[test]
    fn test_newest_unions_installed_and_available() {
        let sack = sack(vec![
            meta("hal", "1.0", "x86_64", "installed"),
            meta("hal", "1.1", "x86_64", "updates"),
            meta("hal", "1.2", "x86_64", "updates-testing"),
        ]);
        let results = run_query(
            &sack,
            &arches(),
            SearchKind::All,
            &[],
            Bitfield::from_values(&[Filter::Newest]),
        );
        let mut versions: Vec<String> = results.iter().map(|p| p.evr.to_string()).collect();
        versions.sort();
        // greatest installed (1.0) plus greatest available (1.2)
        assert_eq!(versions, vec!["1.0".to_string(), "1.2".to_string()]);
    }

    #[test]
    fn test_what_provides_decompose() {
        let decomposed = what_provides_decompose(&["audio/mp3".to_string()]);
        assert!(decomposed.contains(&"audio/mp3".to_string()));
        assert!(decomposed.contains(&"gstreamer1(audio/mp3)".to_string()));
        assert!(decomposed.contains(&"font(audio/mp3)".to_string()));
        assert!(decomposed.contains(&"postscriptdriver(audio/mp3)".to_string()));
        assert_eq!(decomposed.len(), 8);
    }

    #[test]
    fn test_emission_order_suppresses_duplicates() {
        let ordered = order_for_emission(vec![
            meta("hal", "1.0", "x86_64", "fedora"),
            meta("hal", "1.0", "x86_64", "installed"),
            meta("dbus", "2.0", "x86_64", "fedora"),
        ]);
        assert_eq!(ordered.len(), 2);
        assert!(ordered[0].is_installed());
        assert_eq!(ordered[1].name, "dbus");
    }

    #[test]
    fn test_devel_filter() {
        let sack = sack(vec![
            meta("hal", "1.0", "x86_64", "fedora"),
            meta("hal-devel", "1.0", "x86_64", "fedora"),
        ]);
        let devel = run_query(
            &sack,
            &arches(),
            SearchKind::All,
            &[],
            Bitfield::from_values(&[Filter::Devel]),
        );
        assert_eq!(devel.len(), 1);
        assert_eq!(devel[0].name, "hal-devel");
    }
}
