//! The package-set cache.
//!
//! Loading a sack (installed set plus enabled remote repos) is the
//! expensive part of most queries, so built sacks are cached per
//! release and metadata-flag combination and only invalidated, never
//! eagerly rebuilt, when repos or the installed DB change.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pakt_backend::Job;
use pakt_state::State;
use pakt_types::{Bitfield, Filter, Role, Status, CACHE_AGE_UNLIMITED};
use tracing::debug;

use crate::error::OpResult;
use crate::providers::{PackageMeta, Providers, RepoKind};

/// Which metadata a sack was loaded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SackFlags {
    pub filelists: bool,
    pub updateinfo: bool,
    pub remote: bool,
    pub unavailable: bool,
}

impl SackFlags {
    /// Stable text used in cache keys: flag names joined with `|`,
    /// `none` when empty.
    pub fn key_fragment(&self) -> String {
        let mut parts = Vec::new();
        if self.filelists {
            parts.push("filelists");
        }
        if self.updateinfo {
            parts.push("updateinfo");
        }
        if self.remote {
            parts.push("remote");
        }
        if self.unavailable {
            parts.push("unavailable");
        }
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join("|")
        }
    }

    /// Flags appropriate for a job: filelists always, remote unless
    /// the query is pinned to installed packages, updateinfo only when
    /// advisories will be read, unavailable only for lookup roles.
    pub fn for_job(role: Role, filters: Bitfield<Filter>) -> Self {
        let mut flags = SackFlags {
            filelists: true,
            ..SackFlags::default()
        };
        if !filters.contains(Filter::Installed) {
            flags.remote = true;
        }
        if role == Role::GetUpdateDetail {
            flags.updateinfo = true;
        }
        if matches!(
            role,
            Role::Resolve
                | Role::SearchName
                | Role::SearchDetails
                | Role::SearchFile
                | Role::GetDetails
                | Role::WhatProvides
        ) {
            flags.unavailable = true;
        }
        flags
    }
}

/// A loaded package universe.
#[derive(Debug)]
pub struct Sack {
    pub packages: Vec<Arc<PackageMeta>>,
    pub flags: SackFlags,
    /// Bumped once per build; lets callers assert a sack was not
    /// swapped under them.
    pub generation: u64,
}

impl Sack {
    pub fn installed(&self) -> impl Iterator<Item = &Arc<PackageMeta>> {
        self.packages.iter().filter(|p| p.is_installed())
    }

    pub fn available(&self) -> impl Iterator<Item = &Arc<PackageMeta>> {
        self.packages.iter().filter(|p| !p.is_installed())
    }
}

pub fn cache_key(release: &str, flags: &SackFlags) -> String {
    format!("Sack::release_ver[{release}]::{}", flags.key_fragment())
}

struct CacheItem {
    sack: Arc<Sack>,
    valid: bool,
}

/// Concurrent cache of built sacks.
///
/// One mutex guards the map for the short lookup/insert sections;
/// building happens outside the lock and the finished sack is inserted
/// atomically.
pub struct SackCache {
    items: Mutex<HashMap<String, CacheItem>>,
    /// Media repos may vanish between jobs; a sack is only reused when
    /// the previous request was recent.
    repos_timer: Mutex<Instant>,
    generation: AtomicU64,
}

impl Default for SackCache {
    fn default() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            repos_timer: Mutex::new(Instant::now()),
            generation: AtomicU64::new(0),
        }
    }
}

/// How long after the last sack request removable-media repos are
/// assumed unchanged.
const MEDIA_REUSE_WINDOW: Duration = Duration::from_secs(1);

impl SackCache {
    /// Returns a cached sack when permitted, else builds one.
    ///
    /// `state` is stepped through the build: one step for the system
    /// repo, one for the remotes when the flags include them.
    pub fn get_or_build(
        &self,
        providers: &Providers,
        job: &Job,
        filters: Bitfield<Filter>,
        use_cache: bool,
        state: &mut State,
    ) -> OpResult<Arc<Sack>> {
        let flags = SackFlags::for_job(job.role(), filters);
        let mut use_cache = use_cache;

        // media repos could disappear at any time
        {
            let mut timer = self.repos_timer.lock().unwrap();
            if use_cache
                && providers.repos.has_removable_repos()
                && timer.elapsed() > MEDIA_REUSE_WINDOW
            {
                debug!("not reusing sack as media may have disappeared");
                use_cache = false;
            }
            *timer = Instant::now();
        }

        // an explicit cache-age means the caller wants fresh metadata
        if flags.remote && job.cache_age() != CACHE_AGE_UNLIMITED {
            debug!("not reusing sack, specific cache age requested");
            use_cache = false;
        }

        let key = cache_key(&providers.source.release_version(), &flags);
        if use_cache {
            let mut items = self.items.lock().unwrap();
            if let Some(item) = items.get(&key) {
                if item.valid {
                    debug!(key, "using cached sack");
                    return Ok(Arc::clone(&item.sack));
                }
                items.remove(&key);
            }
        }

        state.set_action(Status::Query, None);
        let sack = self.build(providers, &flags, state)?;
        let sack = Arc::new(sack);

        let mut items = self.items.lock().unwrap();
        debug!(key, "created cached sack");
        items.insert(
            key,
            CacheItem {
                sack: Arc::clone(&sack),
                valid: true,
            },
        );
        Ok(sack)
    }

    fn build(
        &self,
        providers: &Providers,
        flags: &SackFlags,
        state: &mut State,
    ) -> OpResult<Sack> {
        if flags.remote {
            state.set_steps(&[8, 92])?;
        } else {
            state.set_number_steps(1)?;
        }

        let mut packages = providers.source.installed()?;
        state.step_done()?;

        if flags.remote {
            let repos = providers.repos.repos()?;
            let enabled: Vec<_> = repos
                .iter()
                .filter(|r| r.enabled && r.kind != RepoKind::Local)
                .collect();
            if enabled.is_empty() {
                state.step_done()?;
            } else {
                let mut child = state.child()?;
                child.set_number_steps(enabled.len())?;
                for repo in enabled {
                    packages.extend(providers.source.repo_packages(&repo.id)?);
                    child.step_done()?;
                }
                state.step_done()?;
            }
        }

        Ok(Sack {
            packages,
            flags: *flags,
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
        })
    }

    /// Marks every cached sack invalid without evicting it.
    pub fn invalidate(&self, why: &str) {
        debug!(why, "invalidating sack cache");
        let mut items = self.items.lock().unwrap();
        for item in items.values_mut() {
            item.valid = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_fragment() {
        assert_eq!(SackFlags::default().key_fragment(), "none");
        let flags = SackFlags {
            filelists: true,
            remote: true,
            ..SackFlags::default()
        };
        assert_eq!(flags.key_fragment(), "filelists|remote");
        assert_eq!(
            cache_key("38", &flags),
            "Sack::release_ver[38]::filelists|remote"
        );
    }

    #[test]
    fn test_flags_for_job() {
        let flags = SackFlags::for_job(Role::SearchName, Bitfield::none());
        assert!(flags.filelists && flags.remote && flags.unavailable);
        assert!(!flags.updateinfo);

        let installed_only =
            SackFlags::for_job(Role::GetPackages, Bitfield::from_values(&[Filter::Installed]));
        assert!(!installed_only.remote);

        let update_detail = SackFlags::for_job(Role::GetUpdateDetail, Bitfield::none());
        assert!(update_detail.updateinfo);
    }
}
