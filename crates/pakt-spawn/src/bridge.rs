//! Helper process supervision.
//!
//! The bridge launches the helper, routes its stdout records into job
//! emitters, filters stderr into the warning log, and supervises the
//! process: an idle kill timer after `finished`, an `InternalError`
//! synthesized for helpers that die without finishing, and
//! `ProcessKill` when the daemon has to kill a cancelled helper.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use pakt_backend::Job;
use pakt_types::PkError;
use tracing::{debug, warn};

use crate::environment::build_helper_env;
use crate::error::SpawnError;
use crate::protocol::{parse_line, HelperMessage};

/// Returns true when a stderr line should reach the warning log.
pub type StderrFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct SpawnConfig {
    pub helper: PathBuf,
    /// Idle seconds before a finished helper is shut down.
    pub shutdown_timeout: Duration,
    pub keep_environment: bool,
    pub stderr_filter: Option<StderrFilter>,
}

impl SpawnConfig {
    pub fn new(helper: impl Into<PathBuf>) -> Self {
        let config = pakt_config::get_config();
        Self {
            helper: helper.into(),
            shutdown_timeout: Duration::from_secs(config.daemon.backend_shutdown_timeout),
            keep_environment: config.daemon.keep_environment,
            stderr_filter: None,
        }
    }
}

struct BridgeInner {
    child: Mutex<Option<Child>>,
    finished: AtomicBool,
    killed: AtomicBool,
    kill_generation: AtomicU64,
}

/// One running helper bound to one job.
pub struct SpawnBridge {
    inner: Arc<BridgeInner>,
    config: SpawnConfig,
}

impl SpawnBridge {
    /// Launches the helper and drives the job to completion.
    ///
    /// Blocks until the helper exits; the job is always finished on
    /// return.
    pub fn run(
        config: SpawnConfig,
        job: &Arc<Job>,
        args: &[String],
        accepted_eulas: Option<String>,
        network_online: bool,
    ) -> Result<(), SpawnError> {
        let env = build_helper_env(job, accepted_eulas, network_online, config.keep_environment);

        debug!(helper = %config.helper.display(), ?args, "launching helper");
        let mut child = Command::new(&config.helper)
            .args(args)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let bridge = SpawnBridge {
            inner: Arc::new(BridgeInner {
                child: Mutex::new(Some(child)),
                finished: AtomicBool::new(false),
                killed: AtomicBool::new(false),
                kill_generation: AtomicU64::new(0),
            }),
            config,
        };

        let stderr_thread = stderr.map(|stderr| {
            let filter = bridge.config.stderr_filter.clone();
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    if filter.as_ref().map(|f| f(&line)).unwrap_or(true) {
                        warn!(target: "pakt::helper", "STDERR: {line}");
                    }
                }
            })
        });

        if let Some(stdout) = stdout {
            let reader = BufReader::new(stdout);
            for raw in reader.split(b'\n') {
                let Ok(raw) = raw else { break };
                match std::str::from_utf8(&raw) {
                    Ok(line) => bridge.handle_line(job, line.trim_end_matches('\r')),
                    Err(_) => {
                        warn!("rejecting helper record: {}", crate::ProtocolError::InvalidUtf8);
                    }
                }
            }
        }

        bridge.wait_and_reap(job);
        if let Some(handle) = stderr_thread {
            let _ = handle.join();
        }
        Ok(())
    }

    fn handle_line(&self, job: &Arc<Job>, line: &str) {
        if line.is_empty() {
            return;
        }
        match parse_line(line) {
            Ok(HelperMessage::Finished) => {
                job.finished();
                self.inner.finished.store(true, Ordering::SeqCst);
                self.start_kill_timer();
            }
            Ok(message) => dispatch(job, message),
            // a broken record is a warning, never termination
            Err(err) => warn!(%err, line, "ignoring helper record"),
        }
    }

    /// After `finished` the helper has this long to exit on its own.
    fn start_kill_timer(&self) {
        let token = self.inner.kill_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(&self.inner);
        let timeout = self.config.shutdown_timeout;
        thread::spawn(move || {
            thread::sleep(timeout);
            if inner.kill_generation.load(Ordering::SeqCst) != token {
                return;
            }
            let mut guard = inner.child.lock().unwrap();
            if let Some(child) = guard.as_mut() {
                if matches!(child.try_wait(), Ok(None)) {
                    debug!("closing idle helper after shutdown timeout");
                    let _ = child.kill();
                }
            }
        });
    }

    /// Cancels a pending idle-exit; called when the helper is reused.
    pub fn cancel_kill_timer(&self) {
        self.inner.kill_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Kills a helper that ignored cancellation.
    pub fn kill(&self, job: &Arc<Job>) {
        self.inner.killed.store(true, Ordering::SeqCst);
        job.error_code(
            PkError::ProcessKill,
            "Process had to be killed to be cancelled",
        );
        let mut guard = self.inner.child.lock().unwrap();
        if let Some(child) = guard.as_mut() {
            let _ = child.kill();
        }
    }

    fn wait_and_reap(&self, job: &Arc<Job>) {
        let child = self.inner.child.lock().unwrap().take();
        if let Some(mut child) = child {
            match child.wait() {
                Ok(status) => debug!(%status, "helper exited"),
                Err(err) => warn!(%err, "failed to reap helper"),
            }
        }
        if self.inner.finished.load(Ordering::SeqCst) {
            return;
        }
        // the helper died without saying finished
        debug!("helper exited without emitting finished, tidying up");
        if !job.has_error_set() {
            job.error_code(
                PkError::InternalError,
                "the backend exited without finishing the transaction",
            );
        }
        job.finished();
    }
}

fn dispatch(job: &Arc<Job>, message: HelperMessage) {
    match message {
        HelperMessage::Package {
            info,
            package_id,
            summary,
        } => job.package(info, package_id, summary),
        HelperMessage::Details(details) => job.details(details),
        HelperMessage::Files(files) => job.files(files.package_id, files.files),
        HelperMessage::RepoDetail(detail) => {
            job.repo_detail(detail.repo_id, detail.description, detail.enabled)
        }
        HelperMessage::UpdateDetail(detail) => job.update_detail(*detail),
        HelperMessage::Percentage(percentage) => job.set_percentage(percentage),
        HelperMessage::ItemProgress {
            package_id,
            status,
            percentage,
        } => job.item_progress(package_id, status, percentage),
        HelperMessage::ErrorCode {
            code,
            details,
        } => job.error_code(code, details),
        HelperMessage::RequireRestart {
            restart,
            package_id,
        } => job.require_restart(restart, package_id),
        HelperMessage::Status(status) => job.set_status(status),
        HelperMessage::Speed(speed) => job.set_speed(speed),
        HelperMessage::DownloadSizeRemaining(bytes) => job.set_download_size_remaining(bytes),
        HelperMessage::AllowCancel(allow) => job.set_allow_cancel(allow),
        HelperMessage::NoPercentageUpdates => {
            job.set_percentage(pakt_types::PERCENTAGE_INVALID)
        }
        HelperMessage::RepoSignatureRequired(signature) => {
            job.repo_signature_required(*signature)
        }
        HelperMessage::EulaRequired {
            eula_id,
            package_id,
            vendor,
            license_agreement,
        } => job.eula_required(eula_id, package_id, vendor, license_agreement),
        HelperMessage::MediaChangeRequired {
            media_type,
            media_id,
            media_text,
        } => job.media_change_required(media_type, media_id, media_text),
        HelperMessage::DistroUpgrade(upgrade) => job.distro_upgrade(upgrade),
        HelperMessage::Category(category) => job.category(category),
        HelperMessage::Finished => unreachable!("handled by the caller"),
    }
}
