//! End-to-end scenarios driven through the in-memory backend.

use std::sync::Arc;

use pakt_backend::{Backend, Job, JobParams};
use pakt_backend_memory::{package, MemoryBackend, MemoryRepo, MemoryWorld};
use pakt_engine::Engine;
use pakt_events::{CollectorSink, JobEvent};
use pakt_types::{
    Bitfield, Evr, Exit, Filter, Info, PackageId, PkError, RepoSignature, Role, SigType,
    TransactionFlag,
};
use serial_test::serial;

fn test_config() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let mut config = pakt_config::Config::default();
    config.daemon.dest_dir = dir.path().to_path_buf();
    pakt_config::init(config);
    dir
}

fn world_with_installed(installed_version: &str, available_version: &str) -> Arc<MemoryWorld> {
    let world = MemoryWorld::new("38");
    world.add_installed(package("hal", installed_version, "x86_64", "fedora"), Some("fedora"));
    world.add_repo(
        MemoryRepo::new("fedora", "Fedora packages")
            .with_package(package("hal", available_version, "x86_64", "fedora")),
    );
    world
}

fn run(backend: &MemoryBackend, job: &Arc<Job>) -> Vec<JobEvent> {
    let collector = Arc::new(CollectorSink::default());
    job.subscribe(collector.clone());
    backend.start_job(job);
    backend.run_job(job);
    backend.stop_job(job);
    collector.events()
}

fn id(name: &str, version: &str, repo: &str) -> PackageId {
    PackageId::new(name, version, "x86_64", repo).unwrap()
}

#[test]
#[serial]
fn test_install_same_version_fails_without_reinstall_flag() {
    let _dir = test_config();
    let world = world_with_installed("1.0", "1.0");
    let backend = MemoryBackend::new(world);

    let job = Job::new(
        Role::InstallPackages,
        JobParams::PackageIds(vec![id("hal", "1.0", "fedora")]),
    );
    run(&backend, &job);
    assert_eq!(job.exit(), Some(Exit::Failed));
    let (code, message) = job.error().unwrap();
    assert_eq!(code, PkError::PackageAlreadyInstalled);
    assert!(message.contains("already installed"));
}

#[test]
#[serial]
fn test_install_same_version_with_reinstall_flag() {
    let _dir = test_config();
    let world = world_with_installed("1.0", "1.0");
    let backend = MemoryBackend::new(Arc::clone(&world));

    let job = Job::with(
        Role::InstallPackages,
        JobParams::PackageIds(vec![id("hal", "1.0", "fedora")]),
        |settings| {
            settings.transaction_flags.add(TransactionFlag::AllowReinstall);
        },
    );
    run(&backend, &job);
    assert_eq!(job.exit(), Some(Exit::Success));
    assert!(world.is_installed("hal", "1.0"));
}

#[test]
#[serial]
fn test_downgrade_needs_flag() {
    let _dir = test_config();
    let world = world_with_installed("1.1", "1.0");
    let backend = MemoryBackend::new(world);

    let job = Job::new(
        Role::InstallPackages,
        JobParams::PackageIds(vec![id("hal", "1.0", "fedora")]),
    );
    run(&backend, &job);
    let (code, message) = job.error().unwrap();
    assert_eq!(code, PkError::PackageAlreadyInstalled);
    assert!(message.contains("higher version \"1.1\""));
}

#[test]
#[serial]
fn test_downgrade_with_flag() {
    let _dir = test_config();
    let world = world_with_installed("1.1", "1.0");
    let backend = MemoryBackend::new(Arc::clone(&world));

    let job = Job::with(
        Role::InstallPackages,
        JobParams::PackageIds(vec![id("hal", "1.0", "fedora")]),
        |settings| {
            settings.transaction_flags.add(TransactionFlag::AllowDowngrade);
        },
    );
    let events = run(&backend, &job);
    assert_eq!(job.exit(), Some(Exit::Success));
    assert!(world.is_installed("hal", "1.0"));
    assert!(!world.is_installed("hal", "1.1"));
    // the commit reported per-item progress
    assert!(events
        .iter()
        .any(|e| matches!(e, JobEvent::ItemProgress { .. })));
}

#[test]
#[serial]
fn test_protected_removal_fails_in_simulate_and_commit() {
    let _dir = test_config();
    for simulate in [true, false] {
        let world = MemoryWorld::new("38");
        world.add_installed(package("glibc", "2.38", "x86_64", "fedora"), Some("fedora"));
        world.add_repo(MemoryRepo::new("fedora", "Fedora packages"));
        let backend = MemoryBackend::new(Arc::clone(&world));

        let job = Job::with(
            Role::RemovePackages,
            JobParams::RemovePackages {
                package_ids: vec![PackageId::new(
                    "glibc",
                    "2.38",
                    "x86_64",
                    "installed:fedora",
                )
                .unwrap()],
                allow_deps: false,
                autoremove: false,
            },
            |settings| {
                if simulate {
                    settings.transaction_flags.add(TransactionFlag::Simulate);
                }
            },
        );
        run(&backend, &job);
        assert_eq!(job.exit(), Some(Exit::Failed), "simulate={simulate}");
        assert_eq!(
            job.error().map(|(code, _)| code),
            Some(PkError::CannotRemoveSystemPackage)
        );
        // either way the package is still there
        assert!(world.is_installed("glibc", "2.38"));
    }
}

#[test]
#[serial]
fn test_simulate_never_mutates_the_pool() {
    let _dir = test_config();
    let world = world_with_installed("1.0", "1.1");
    let backend = MemoryBackend::new(Arc::clone(&world));
    let before = world.installed_names();

    let job = Job::with(
        Role::InstallPackages,
        JobParams::PackageIds(vec![id("hal", "1.1", "fedora")]),
        |settings| {
            settings.transaction_flags.add(TransactionFlag::Simulate);
        },
    );
    let events = run(&backend, &job);
    assert_eq!(job.exit(), Some(Exit::Success));
    assert_eq!(world.installed_names(), before);
    // the classification was emitted instead
    assert!(events.iter().any(|e| matches!(
        e,
        JobEvent::Package(p) if p.info == Info::Updating && p.package_id.name() == "hal"
    )));
}

#[test]
#[serial]
fn test_simulate_classifies_untrusted() {
    let _dir = test_config();
    let world = MemoryWorld::new("38");
    let mut repo = MemoryRepo::new("sketchy", "No gpg here");
    repo.info.gpgcheck = false;
    world.add_repo(repo.with_package(package("hal", "1.0", "x86_64", "sketchy")));
    let backend = MemoryBackend::new(world);

    let job = Job::with(
        Role::InstallPackages,
        JobParams::PackageIds(vec![id("hal", "1.0", "sketchy")]),
        |settings| {
            settings.transaction_flags.add(TransactionFlag::Simulate);
        },
    );
    let events = run(&backend, &job);
    assert_eq!(job.exit(), Some(Exit::Success));
    assert!(events.iter().any(|e| matches!(
        e,
        JobEvent::Package(p) if p.info == Info::Untrusted
    )));
}

#[test]
#[serial]
fn test_refresh_tolerates_one_bad_repo() {
    let _dir = test_config();
    let world = MemoryWorld::new("38");
    let mut good = MemoryRepo::new("good", "Reachable repo");
    good.stale = true;
    let mut bad = MemoryRepo::new("bad", "Unreachable repo");
    bad.stale = true;
    bad.fetch_failure = Some("mirror timed out".to_string());
    world.add_repo(good);
    world.add_repo(bad);
    let backend = MemoryBackend::new(world);

    let job = Job::new(
        Role::RefreshCache,
        JobParams::Refresh {
            force: false,
        },
    );
    let events = run(&backend, &job);
    assert_eq!(job.exit(), Some(Exit::Success));
    assert!(events.iter().any(|e| matches!(
        e,
        JobEvent::Message { details } if details.contains("bad")
    )));
}

#[test]
#[serial]
fn test_refresh_signature_flow() {
    let _dir = test_config();
    let signature = RepoSignature {
        package_id: PackageId::new("dummy", "0.0.1", "i386", "data").unwrap(),
        repo_id: "signed".to_string(),
        url: "https://mirror".to_string(),
        key_name: "Signing Key".to_string(),
        key_id: "BB09BE93".to_string(),
        fingerprint: "DEADBEEF".to_string(),
        timestamp: "2024-01-01".to_string(),
        sig_type: SigType::Gpg,
    };

    let world = MemoryWorld::new("38");
    let mut repo = MemoryRepo::new("signed", "Signed repo");
    repo.stale = true;
    repo.signature = Some(signature);
    world.add_repo(repo);
    let backend = MemoryBackend::new(Arc::clone(&world));

    // without an imported key the prompt is raised and the repo skipped
    let job = Job::new(
        Role::RefreshCache,
        JobParams::Refresh {
            force: false,
        },
    );
    let events = run(&backend, &job);
    assert_eq!(job.exit(), Some(Exit::Success));
    assert!(events
        .iter()
        .any(|e| matches!(e, JobEvent::RepoSignatureRequired(sig) if sig.key_id == "BB09BE93")));

    // import the key, refresh again: auto-approved, no prompt
    let import = Job::new(
        Role::InstallSignature,
        JobParams::InstallSignature {
            sig_type: SigType::Gpg,
            key_id: "BB09BE93".to_string(),
            package_id: PackageId::new("dummy", "0.0.1", "i386", "data").unwrap(),
        },
    );
    run(&backend, &import);
    assert_eq!(import.exit(), Some(Exit::Success));

    let retry = Job::new(
        Role::RefreshCache,
        JobParams::Refresh {
            force: true,
        },
    );
    let events = run(&backend, &retry);
    assert_eq!(retry.exit(), Some(Exit::Success));
    assert!(!events
        .iter()
        .any(|e| matches!(e, JobEvent::RepoSignatureRequired(_))));
}

#[test]
#[serial]
fn test_sack_rebuilt_after_invalidate() {
    let _dir = test_config();
    let world = world_with_installed("1.0", "1.1");
    let backend = MemoryBackend::new(world);
    let ctx = backend.context();

    let job = Job::new(
        Role::GetPackages,
        JobParams::Filters(Bitfield::<Filter>::none()),
    );
    let mut state = job.create_state();
    let first = ctx
        .sack_cache
        .get_or_build(&ctx.providers, &job, Bitfield::none(), true, &mut state)
        .unwrap();

    let job2 = Job::new(
        Role::GetPackages,
        JobParams::Filters(Bitfield::<Filter>::none()),
    );
    let mut state2 = job2.create_state();
    let cached = ctx
        .sack_cache
        .get_or_build(&ctx.providers, &job2, Bitfield::none(), true, &mut state2)
        .unwrap();
    assert!(Arc::ptr_eq(&first, &cached));

    ctx.sack_cache.invalidate("test");
    let job3 = Job::new(
        Role::GetPackages,
        JobParams::Filters(Bitfield::<Filter>::none()),
    );
    let mut state3 = job3.create_state();
    let rebuilt = ctx
        .sack_cache
        .get_or_build(&ctx.providers, &job3, Bitfield::none(), true, &mut state3)
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &rebuilt));
}

#[test]
#[serial]
fn test_engine_rejects_unsupported_role() {
    let _dir = test_config();
    let world = MemoryWorld::new("38");
    let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new(world));
    let engine = Engine::new(backend);

    let job = Job::new(Role::SearchGroup, JobParams::None);
    let collector = Arc::new(CollectorSink::default());
    job.subscribe(collector.clone());
    engine.run_sync(Arc::clone(&job));

    assert_eq!(job.exit(), Some(Exit::Failed));
    assert_eq!(job.error().map(|(code, _)| code), Some(PkError::NotSupported));
    assert!(collector.events().last().unwrap().is_finished());
}

#[test]
#[serial]
fn test_search_orders_installed_first() {
    let _dir = test_config();
    let world = world_with_installed("1.0", "1.1");
    let backend = MemoryBackend::new(world);

    let job = Job::new(
        Role::SearchName,
        JobParams::Search {
            filters: Bitfield::<Filter>::none(),
            values: vec!["hal".to_string()],
        },
    );
    let events = run(&backend, &job);
    assert_eq!(job.exit(), Some(Exit::Success));
    let packages: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Package(p) => Some(p.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(packages.len(), 2);
    assert_eq!(packages[0].info, Info::Installed);
    assert_eq!(packages[1].info, Info::Available);
}

#[test]
#[serial]
fn test_dep_resolution_failure_aggregates_problems() {
    let _dir = test_config();
    let world = MemoryWorld::new("38");
    let mut needy = package("needy", "1.0", "x86_64", "fedora");
    needy.requires = vec!["libmissing".to_string()];
    world.add_repo(MemoryRepo::new("fedora", "Fedora packages").with_package(needy));
    let backend = MemoryBackend::new(world);

    let job = Job::new(
        Role::InstallPackages,
        JobParams::PackageIds(vec![id("needy", "1.0", "fedora")]),
    );
    run(&backend, &job);
    assert_eq!(job.exit(), Some(Exit::Failed));
    let (code, message) = job.error().unwrap();
    assert_eq!(code, PkError::DepResolutionFailed);
    assert!(message.contains("nothing provides libmissing"));
}

#[test]
#[serial]
fn test_remove_progress_is_monotonic_per_package() {
    let _dir = test_config();
    let world = MemoryWorld::new("38");
    for name in ["one", "two", "three", "four"] {
        world.add_installed(package(name, "1.0", "x86_64", "fedora"), Some("fedora"));
    }
    world.add_repo(MemoryRepo::new("fedora", "Fedora packages"));
    let backend = MemoryBackend::new(Arc::clone(&world));

    let ids = ["one", "two", "three", "four"]
        .iter()
        .map(|name| PackageId::new(*name, "1.0", "x86_64", "installed:fedora").unwrap())
        .collect();
    let job = Job::new(
        Role::RemovePackages,
        JobParams::RemovePackages {
            package_ids: ids,
            allow_deps: false,
            autoremove: false,
        },
    );
    let events = run(&backend, &job);
    assert_eq!(job.exit(), Some(Exit::Success));
    assert!(world.installed_names().is_empty());

    // percentage climbs with each removed package and never resets
    let percentages: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Percentage(p) => Some(*p),
            _ => None,
        })
        .collect();
    let mut sorted = percentages.clone();
    sorted.sort_unstable();
    assert_eq!(percentages, sorted);
    assert_eq!(percentages.last(), Some(&100));
}

#[test]
#[serial]
fn test_update_installs_downloaded_payloads() {
    let _dir = test_config();
    let world = world_with_installed("1.0", "1.1");
    let backend = MemoryBackend::new(Arc::clone(&world));

    let job = Job::new(
        Role::UpdatePackages,
        JobParams::PackageIds(vec![id("hal", "1.1", "fedora")]),
    );
    run(&backend, &job);
    assert_eq!(job.exit(), Some(Exit::Success));
    // downloaded and then actually installed, not fetched twice
    assert_eq!(world.downloaded.lock().unwrap().len(), 1);
    assert!(world.is_installed("hal", "1.1"));
    assert!(!world.is_installed("hal", "1.0"));
}

#[test]
#[serial]
fn test_only_download_leaves_system_unchanged() {
    let _dir = test_config();
    let world = world_with_installed("1.0", "1.1");
    let backend = MemoryBackend::new(Arc::clone(&world));

    let job = Job::with(
        Role::UpdatePackages,
        JobParams::PackageIds(vec![id("hal", "1.1", "fedora")]),
        |settings| {
            settings.transaction_flags.add(TransactionFlag::OnlyDownload);
        },
    );
    run(&backend, &job);
    assert_eq!(job.exit(), Some(Exit::Success));
    assert_eq!(world.downloaded.lock().unwrap().len(), 1);
    assert!(world.is_installed("hal", "1.0"));
    assert!(!world.is_installed("hal", "1.1"));
}

#[test]
#[serial]
fn test_eula_gate_and_accept() {
    let _dir = test_config();
    let world = MemoryWorld::new("38");
    let mut licensed = package("licensed", "1.0", "x86_64", "fedora");
    licensed.eula = Some(pakt_engine::providers::EulaNotice {
        eula_id: "vendor-1.0".to_string(),
        vendor: "Vendor".to_string(),
        license_agreement: "terms apply".to_string(),
    });
    world.add_repo(MemoryRepo::new("fedora", "Fedora packages").with_package(licensed));
    let backend = MemoryBackend::new(Arc::clone(&world));

    let job = Job::new(
        Role::InstallPackages,
        JobParams::PackageIds(vec![id("licensed", "1.0", "fedora")]),
    );
    let events = run(&backend, &job);
    assert_eq!(job.exit(), Some(Exit::EulaRequired));
    assert!(events
        .iter()
        .any(|e| matches!(e, JobEvent::EulaRequired { eula_id, .. } if eula_id == "vendor-1.0")));

    let accept = Job::new(
        Role::AcceptEula,
        JobParams::AcceptEula {
            eula_id: "vendor-1.0".to_string(),
        },
    );
    run(&backend, &accept);
    assert_eq!(accept.exit(), Some(Exit::Success));

    let retry = Job::new(
        Role::InstallPackages,
        JobParams::PackageIds(vec![id("licensed", "1.0", "fedora")]),
    );
    run(&backend, &retry);
    assert_eq!(retry.exit(), Some(Exit::Success));
    assert!(world.is_installed("licensed", "1.0"));
}

#[test]
#[serial]
fn test_obsoletes_are_classified() {
    let _dir = test_config();
    let world = MemoryWorld::new("38");
    world.add_installed(package("oldtool", "1.0", "x86_64", "fedora"), Some("fedora"));
    let mut newtool = package("newtool", "2.0", "x86_64", "fedora");
    newtool.obsoletes = vec!["oldtool".to_string()];
    world.add_repo(MemoryRepo::new("fedora", "Fedora packages").with_package(newtool));
    let backend = MemoryBackend::new(Arc::clone(&world));

    let job = Job::with(
        Role::InstallPackages,
        JobParams::PackageIds(vec![id("newtool", "2.0", "fedora")]),
        |settings| {
            settings.transaction_flags.add(TransactionFlag::Simulate);
        },
    );
    let events = run(&backend, &job);
    assert_eq!(job.exit(), Some(Exit::Success));
    assert!(events.iter().any(|e| matches!(
        e,
        JobEvent::Package(p) if p.info == Info::Obsoleting && p.package_id.name() == "oldtool"
    )));
}

#[test]
#[serial]
fn test_get_updates_reports_upgrade_candidates() {
    let _dir = test_config();
    let world = world_with_installed("1.0", "1.1");
    let backend = MemoryBackend::new(world);

    let job = Job::new(
        Role::GetUpdates,
        JobParams::Filters(Bitfield::<Filter>::none()),
    );
    let events = run(&backend, &job);
    assert_eq!(job.exit(), Some(Exit::Success));
    assert!(events.iter().any(|e| matches!(
        e,
        JobEvent::Package(p) if p.package_id.name() == "hal"
            && Evr::parse(p.package_id.version()) == Evr::parse("1.1")
    )));
}

#[test]
#[serial]
fn test_repo_config_watch_invalidates_sack() {
    let dir = test_config();
    let world = world_with_installed("1.0", "1.1");
    let backend = MemoryBackend::new(world);
    let ctx = backend.context().clone();

    let repos_conf = dir.path().join("repos.conf");
    std::fs::write(&repos_conf, "[fedora]\nenabled=1\n").unwrap();
    let cache = std::sync::Arc::clone(&ctx.sack_cache);
    let _monitor = pakt_backend::ConfigMonitor::watch(&repos_conf, move || {
        cache.invalidate("repository configuration changed");
    })
    .unwrap();

    let job = Job::new(
        Role::GetPackages,
        JobParams::Filters(Bitfield::<Filter>::none()),
    );
    let mut state = job.create_state();
    let first = ctx
        .sack_cache
        .get_or_build(&ctx.providers, &job, Bitfield::none(), true, &mut state)
        .unwrap();

    std::fs::write(&repos_conf, "[fedora]\nenabled=0\n").unwrap();
    // wait for the watcher to deliver the change
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    let rebuilt = loop {
        let job = Job::new(
            Role::GetPackages,
            JobParams::Filters(Bitfield::<Filter>::none()),
        );
        let mut state = job.create_state();
        let sack = ctx
            .sack_cache
            .get_or_build(&ctx.providers, &job, Bitfield::none(), true, &mut state)
            .unwrap();
        if !Arc::ptr_eq(&first, &sack) || std::time::Instant::now() > deadline {
            break sack;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    };
    assert!(!Arc::ptr_eq(&first, &rebuilt));
}

#[test]
#[serial]
fn test_installed_db_change_invalidates_unless_inhibited() {
    let _dir = test_config();
    let world = world_with_installed("1.0", "1.1");
    let backend = MemoryBackend::new(world);
    let ctx = backend.context();

    let job = Job::new(
        Role::GetPackages,
        JobParams::Filters(Bitfield::<Filter>::none()),
    );
    let mut state = job.create_state();
    let first = ctx
        .sack_cache
        .get_or_build(&ctx.providers, &job, Bitfield::none(), true, &mut state)
        .unwrap();

    // while inhibited the monitor event is suppressed
    ctx.inhibitor.inhibit_start();
    assert!(!ctx.inhibitor.installed_db_changed());
    let job2 = Job::new(
        Role::GetPackages,
        JobParams::Filters(Bitfield::<Filter>::none()),
    );
    let mut state2 = job2.create_state();
    let still_cached = ctx
        .sack_cache
        .get_or_build(&ctx.providers, &job2, Bitfield::none(), true, &mut state2)
        .unwrap();
    assert!(Arc::ptr_eq(&first, &still_cached));
    ctx.inhibitor.inhibit_end();

    // a non-inhibited change invalidates
    std::thread::sleep(std::time::Duration::from_millis(3200));
    assert!(ctx.inhibitor.installed_db_changed());
    let job3 = Job::new(
        Role::GetPackages,
        JobParams::Filters(Bitfield::<Filter>::none()),
    );
    let mut state3 = job3.create_state();
    let rebuilt = ctx
        .sack_cache
        .get_or_build(&ctx.providers, &job3, Bitfield::none(), true, &mut state3)
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &rebuilt));
}
