use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use cli::{Args, Command};
use pakt_backend::{BackendInfo, BackendRegistry, Capabilities, Job, JobParams};
use pakt_backend_memory::{package, MemoryBackend, MemoryRepo, MemoryWorld};
use pakt_engine::Engine;
use pakt_events::{ChannelSink, JobEvent};
use pakt_spawn::{SpawnBackend, SpawnConfig};
use pakt_types::{Bitfield, Exit, Filter, PackageId, Role};
use tracing::debug;

mod cli;
mod logging;

/// A small deterministic universe so diagnostics work on any machine.
fn demo_world() -> Arc<MemoryWorld> {
    let world = MemoryWorld::new("38");
    world.add_installed(package("hal", "0.5.8", "x86_64", "demo"), Some("demo"));
    world.add_installed(package("glibc", "2.38", "x86_64", "demo"), Some("demo"));
    world.add_repo(
        MemoryRepo::new("demo", "Demo packages")
            .with_package(package("hal", "0.5.9", "x86_64", "demo"))
            .with_package(package("gnome-power-manager", "3.6.1", "x86_64", "demo"))
            .with_package(package("pacman-mirrors", "4.0", "x86_64", "demo")),
    );
    world
}

fn build_registry(args: &Args) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register("memory", || Ok(Arc::new(MemoryBackend::new(demo_world()))));
    if let Some(helper) = args.helper.clone() {
        registry.register("spawn", move || {
            let info = BackendInfo {
                name: "spawn".to_string(),
                author: "pakt developers".to_string(),
                description: "Helper-backed backend".to_string(),
            };
            let capabilities = Capabilities {
                roles: Bitfield::from_values(Role::ALL),
                supports_parallelization: false,
                ..Capabilities::default()
            };
            Ok(Arc::new(SpawnBackend::new(
                info,
                capabilities,
                SpawnConfig::new(helper.clone()),
            )))
        });
    }
    registry
}

fn parse_package_ids(values: &[String]) -> Result<Vec<PackageId>, String> {
    values
        .iter()
        .map(|v| PackageId::from_str(v).map_err(|e| e.to_string()))
        .collect()
}

fn build_job(command: &Command) -> Result<Arc<Job>, String> {
    let search = |role, values: &[String]| {
        Job::new(
            role,
            JobParams::Search {
                filters: Bitfield::<Filter>::none(),
                values: values.to_vec(),
            },
        )
    };
    Ok(match command {
        Command::Refresh => {
            Job::new(
                Role::RefreshCache,
                JobParams::Refresh {
                    force: false,
                },
            )
        }
        Command::RefreshForce => {
            Job::new(
                Role::RefreshCache,
                JobParams::Refresh {
                    force: true,
                },
            )
        }
        Command::SearchName {
            values,
        } => search(Role::SearchName, values),
        Command::SearchDetail {
            values,
        } => search(Role::SearchDetails, values),
        Command::SearchFile {
            values,
        } => search(Role::SearchFile, values),
        Command::Install {
            package_ids,
        } => Job::new(
            Role::InstallPackages,
            JobParams::PackageIds(parse_package_ids(package_ids)?),
        ),
        Command::Remove {
            package_ids,
        } => Job::new(
            Role::RemovePackages,
            JobParams::RemovePackages {
                package_ids: parse_package_ids(package_ids)?,
                allow_deps: false,
                autoremove: false,
            },
        ),
        Command::RepoSetData {
            repo,
            key,
            value,
        } => Job::new(
            Role::RepoSetData,
            JobParams::RepoSetData {
                repo_id: repo.clone(),
                key: key.clone(),
                value: value.clone(),
            },
        ),
    })
}

fn print_event(event: &JobEvent) {
    match event {
        JobEvent::Percentage(percentage) => println!("Done: {percentage}%"),
        JobEvent::Status(status) => println!("Status: {status}"),
        JobEvent::Package(package) => {
            println!("Package: {}\t{}", package.info, package.package_id)
        }
        JobEvent::ItemProgress {
            package_id,
            status,
            percentage,
        } => println!("ItemProgress: {package_id}\t{percentage}%\t{status}"),
        JobEvent::ErrorCode {
            code,
            details,
        } => println!("Error: {code}\t{details}"),
        JobEvent::Message {
            details,
        } => println!("Message: {details}"),
        JobEvent::RepoDetail(detail) => {
            println!(
                "Repo: {}\t{}\t{}",
                detail.repo_id,
                if detail.enabled { "enabled" } else { "disabled" },
                detail.description
            )
        }
        JobEvent::RepoSignatureRequired(signature) => {
            println!("SignatureRequired: {}\t{}", signature.repo_id, signature.key_id)
        }
        JobEvent::Finished(exit) => println!("Exit code: {exit}"),
        _ => {}
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::setup_logging(args.verbose);

    if let Some(conf) = &args.conf {
        if let Err(err) = pakt_config::init_from_file(conf) {
            eprintln!("Failed to load the config file: {err}");
            return ExitCode::from(2);
        }
    }

    let registry = build_registry(&args);
    let requested = if args.backend == "auto" {
        pakt_config::get_config().daemon.default_backend
    } else {
        args.backend.clone()
    };
    let backend = match registry.create(&requested) {
        Ok(backend) => backend,
        Err(err) => {
            eprintln!("Failed to load the backend: {err}");
            return ExitCode::from(2);
        }
    };
    debug!(backend = %backend.info().name, "running one job");

    let job = match build_job(&args.command) {
        Ok(job) => job,
        Err(message) => {
            eprintln!("Failed to parse arguments: {message}");
            return ExitCode::from(2);
        }
    };

    let (sink, receiver) = ChannelSink::new();
    job.subscribe(Arc::new(sink));

    let engine = Engine::new(backend);
    engine.run_sync(Arc::clone(&job));

    for event in receiver.try_iter() {
        print_event(&event);
    }

    match job.exit() {
        Some(Exit::Success) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}
