//! Per-transaction context.
//!
//! A `Job` carries everything one client request needs: the role, its
//! parameters, the requesting environment, the cancellation token and
//! the subscriber list. Backends push typed events through the emitter
//! methods; the job enforces the single-error and finished-exactly-once
//! rules so subscribers never see trailing emissions.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use pakt_events::{EventSink, EventSinkHandle, JobEvent};
use pakt_state::{Cancellable, State};
use pakt_types::{
    Bitfield, Category, Details, DistroUpgrade, Exit, Files, Filter, Info, MediaType, Package,
    PackageId, PkError, RepoDetail, RepoSignature, Restart, Role, SigType, Status,
    TransactionFlag, UpdateDetail, UpgradeKind, CACHE_AGE_UNLIMITED, PERCENTAGE_INVALID,
};
use tracing::{debug, error, warn};

/// Proxy settings forwarded to downloaders and helpers.
#[derive(Debug, Clone, Default)]
pub struct Proxy {
    pub http: Option<String>,
    pub https: Option<String>,
    pub ftp: Option<String>,
    pub socks: Option<String>,
    pub no_proxy: Option<String>,
    pub pac: Option<String>,
}

/// Role-specific parameters.
#[derive(Debug, Clone)]
pub enum JobParams {
    None,
    PackageIds(Vec<PackageId>),
    Files(Vec<PathBuf>),
    Search {
        filters: Bitfield<Filter>,
        values: Vec<String>,
    },
    Filters(Bitfield<Filter>),
    Refresh {
        force: bool,
    },
    RemovePackages {
        package_ids: Vec<PackageId>,
        allow_deps: bool,
        autoremove: bool,
    },
    RepoEnable {
        repo_id: String,
        enabled: bool,
    },
    RepoRemove {
        repo_id: String,
        autoremove: bool,
    },
    RepoSetData {
        repo_id: String,
        key: String,
        value: String,
    },
    AcceptEula {
        eula_id: String,
    },
    InstallSignature {
        sig_type: SigType,
        key_id: String,
        package_id: PackageId,
    },
    UpgradeSystem {
        distro_id: String,
        kind: UpgradeKind,
    },
}

/// One client transaction.
pub struct Job {
    role: Role,
    transaction_flags: Bitfield<TransactionFlag>,
    params: JobParams,
    uid: u32,
    locale: Option<String>,
    proxy: Proxy,
    cache_age: u32,
    background: bool,
    interactive: bool,
    frontend_socket: Option<String>,
    cancellable: Cancellable,
    lock_dir: PathBuf,

    sinks: RwLock<Vec<EventSinkHandle>>,
    error: Mutex<Option<(PkError, String)>>,
    exit: Mutex<Option<Exit>>,
    started: AtomicBool,
    allow_cancel: AtomicBool,
    percentage: AtomicU32,
    status: Mutex<Status>,
}

impl Job {
    fn build(role: Role, params: JobParams) -> Self {
        let config = pakt_config::get_config();
        Self {
            role,
            transaction_flags: Bitfield::none(),
            params,
            uid: nix::unistd::getuid().as_raw(),
            locale: None,
            proxy: Proxy::default(),
            cache_age: CACHE_AGE_UNLIMITED,
            background: false,
            interactive: false,
            frontend_socket: None,
            cancellable: Cancellable::new(),
            lock_dir: pakt_utils::path::run_dir(&config.daemon.dest_dir),
            sinks: RwLock::new(Vec::new()),
            error: Mutex::new(None),
            exit: Mutex::new(None),
            started: AtomicBool::new(false),
            allow_cancel: AtomicBool::new(true),
            percentage: AtomicU32::new(PERCENTAGE_INVALID),
            status: Mutex::new(Status::Unknown),
        }
    }

    pub fn new(role: Role, params: JobParams) -> Arc<Self> {
        Arc::new(Self::build(role, params))
    }

    /// Constructs a job with request settings applied before anything
    /// can observe it.
    pub fn with(
        role: Role,
        params: JobParams,
        configure: impl FnOnce(&mut JobSettings),
    ) -> Arc<Self> {
        let mut settings = JobSettings::default();
        configure(&mut settings);
        let mut job = Self::build(role, params);
        job.transaction_flags = settings.transaction_flags;
        if let Some(uid) = settings.uid {
            job.uid = uid;
        }
        job.locale = settings.locale;
        job.proxy = settings.proxy;
        if let Some(cache_age) = settings.cache_age {
            job.cache_age = cache_age;
        }
        job.background = settings.background;
        job.interactive = settings.interactive;
        job.frontend_socket = settings.frontend_socket;
        Arc::new(job)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn transaction_flags(&self) -> Bitfield<TransactionFlag> {
        self.transaction_flags
    }

    pub fn has_transaction_flag(&self, flag: TransactionFlag) -> bool {
        self.transaction_flags.contains(flag)
    }

    pub fn params(&self) -> &JobParams {
        &self.params
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    pub fn proxy(&self) -> &Proxy {
        &self.proxy
    }

    /// Maximum tolerated metadata age in seconds;
    /// `CACHE_AGE_UNLIMITED` means any age is acceptable.
    pub fn cache_age(&self) -> u32 {
        self.cache_age
    }

    pub fn background(&self) -> bool {
        self.background
    }

    pub fn interactive(&self) -> bool {
        self.interactive
    }

    pub fn frontend_socket(&self) -> Option<&str> {
        self.frontend_socket.as_deref()
    }

    pub fn cancellable(&self) -> Cancellable {
        self.cancellable.clone()
    }

    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Requests cancellation. Fails when the current phase declared
    /// itself uncancellable.
    pub fn cancel(&self) -> Result<(), PkError> {
        if !self.allow_cancel.load(Ordering::SeqCst) {
            return Err(PkError::CannotCancel);
        }
        self.cancellable.cancel();
        Ok(())
    }

    /// Adds a subscriber. Subscribers added after `Finished` never see
    /// anything.
    pub fn subscribe(&self, sink: EventSinkHandle) {
        self.sinks.write().unwrap().push(sink);
    }

    /// Builds the root progress state for this job's worker. State
    /// percentages and notifications route back through the job's
    /// subscribers.
    pub fn create_state(self: &Arc<Self>) -> State {
        let sink: EventSinkHandle = Arc::new(JobStateSink {
            job: Arc::clone(self),
        });
        State::new_root(sink, self.cancellable.clone(), self.lock_dir.clone())
    }

    /// Runs `f` on a dedicated worker thread.
    pub fn thread_create<F>(self: &Arc<Self>, f: F) -> JoinHandle<()>
    where
        F: FnOnce(Arc<Job>) + Send + 'static,
    {
        let job = Arc::clone(self);
        thread::Builder::new()
            .name(format!("pakt-job-{}", self.role))
            .spawn(move || f(job))
            .expect("spawn job worker")
    }

    // ---- emitters ----

    fn emit(&self, event: JobEvent) {
        if self.exit.lock().unwrap().is_some() {
            // emitting after finished is a backend bug; drop the event
            // loudly rather than confusing subscribers
            error!(role = %self.role, ?event, "event emitted after finished");
            return;
        }
        let sinks = self.sinks.read().unwrap();
        for sink in sinks.iter() {
            sink.emit(event.clone());
        }
    }

    pub fn package(&self, info: Info, package_id: PackageId, summary: impl Into<String>) {
        self.emit(JobEvent::Package(Package::new(package_id, info, summary)));
    }

    pub fn details(&self, details: Details) {
        self.emit(JobEvent::Details(details));
    }

    pub fn files(&self, package_id: PackageId, files: Vec<String>) {
        self.emit(JobEvent::Files(Files {
            package_id,
            files,
        }));
    }

    pub fn update_detail(&self, detail: UpdateDetail) {
        self.emit(JobEvent::UpdateDetail(detail));
    }

    pub fn distro_upgrade(&self, upgrade: DistroUpgrade) {
        self.emit(JobEvent::DistroUpgrade(upgrade));
    }

    pub fn category(&self, category: Category) {
        self.emit(JobEvent::Category(category));
    }

    pub fn repo_detail(&self, repo_id: impl Into<String>, description: impl Into<String>, enabled: bool) {
        self.emit(JobEvent::RepoDetail(RepoDetail {
            repo_id: repo_id.into(),
            description: description.into(),
            enabled,
        }));
    }

    pub fn repo_signature_required(&self, signature: RepoSignature) {
        self.emit(JobEvent::RepoSignatureRequired(signature));
    }

    pub fn eula_required(
        &self,
        eula_id: impl Into<String>,
        package_id: PackageId,
        vendor: impl Into<String>,
        license_agreement: impl Into<String>,
    ) {
        self.emit(JobEvent::EulaRequired {
            eula_id: eula_id.into(),
            package_id,
            vendor: vendor.into(),
            license_agreement: license_agreement.into(),
        });
    }

    pub fn media_change_required(
        &self,
        media_type: MediaType,
        media_id: impl Into<String>,
        media_text: impl Into<String>,
    ) {
        self.emit(JobEvent::MediaChangeRequired {
            media_type,
            media_id: media_id.into(),
            media_text: media_text.into(),
        });
    }

    pub fn require_restart(&self, restart: Restart, package_id: PackageId) {
        self.emit(JobEvent::RequireRestart {
            restart,
            package_id,
        });
    }

    pub fn message(&self, details: impl Into<String>) {
        self.emit(JobEvent::Message {
            details: details.into(),
        });
    }

    /// Records the job's one typed error. The first call wins; later
    /// calls are logged and ignored.
    pub fn error_code(&self, code: PkError, details: impl Into<String>) {
        let details = details.into();
        {
            let mut error = self.error.lock().unwrap();
            if let Some((existing, _)) = error.as_ref() {
                warn!(
                    first = %existing,
                    ignored = %code,
                    "error already set on job, ignoring"
                );
                return;
            }
            *error = Some((code, details.clone()));
        }
        self.emit(JobEvent::ErrorCode {
            code,
            details,
        });
    }

    pub fn has_error_set(&self) -> bool {
        self.error.lock().unwrap().is_some()
    }

    pub fn error(&self) -> Option<(PkError, String)> {
        self.error.lock().unwrap().clone()
    }

    pub fn set_status(&self, status: Status) {
        {
            let mut guard = self.status.lock().unwrap();
            if *guard == status {
                return;
            }
            *guard = status;
        }
        self.emit(JobEvent::Status(status));
    }

    pub fn status(&self) -> Status {
        *self.status.lock().unwrap()
    }

    /// Sets the overall percentage; `PERCENTAGE_INVALID` (101) means no
    /// meaningful value is available. Values above the sentinel are a
    /// caller bug.
    pub fn set_percentage(&self, percentage: u32) {
        debug_assert!(percentage <= PERCENTAGE_INVALID);
        self.percentage.store(percentage, Ordering::SeqCst);
        self.emit(JobEvent::Percentage(percentage));
    }

    pub fn percentage(&self) -> u32 {
        self.percentage.load(Ordering::SeqCst)
    }

    pub fn item_progress(&self, package_id: PackageId, status: Status, percentage: u32) {
        self.emit(JobEvent::ItemProgress {
            package_id,
            status,
            percentage,
        });
    }

    pub fn set_speed(&self, bytes_per_second: u64) {
        self.emit(JobEvent::Speed(bytes_per_second));
    }

    pub fn set_download_size_remaining(&self, bytes: u64) {
        self.emit(JobEvent::DownloadSizeRemaining(bytes));
    }

    pub fn set_allow_cancel(&self, allow: bool) {
        let previous = self.allow_cancel.swap(allow, Ordering::SeqCst);
        if previous != allow {
            self.emit(JobEvent::AllowCancel(allow));
        }
    }

    pub fn allow_cancel(&self) -> bool {
        self.allow_cancel.load(Ordering::SeqCst)
    }

    /// Terminates the job. The exit code derives from the recorded
    /// error, if any; repeated calls are ignored.
    pub fn finished(&self) {
        let exit = match self.error() {
            Some((PkError::TransactionCancelled, _)) => Exit::Cancelled,
            Some((PkError::ProcessKill, _)) => Exit::Killed,
            Some((PkError::NoLicenseAgreement, _)) => Exit::EulaRequired,
            Some(_) => Exit::Failed,
            None if self.cancellable.is_cancelled() => Exit::Cancelled,
            None => Exit::Success,
        };
        self.finished_with(exit);
    }

    /// Terminates the job with an explicit exit code.
    pub fn finished_with(&self, exit: Exit) {
        {
            let mut guard = self.exit.lock().unwrap();
            if guard.is_some() {
                debug!(role = %self.role, "job already finished");
                return;
            }
            // deliver Finished through the normal fan-out before the
            // gate closes
            let sinks = self.sinks.read().unwrap();
            for sink in sinks.iter() {
                sink.emit(JobEvent::Finished(exit));
            }
            *guard = Some(exit);
        }
    }

    /// The exit code once the job finished.
    pub fn exit(&self) -> Option<Exit> {
        *self.exit.lock().unwrap()
    }
}

/// Mutable request settings consumed by [`Job::with`].
#[derive(Debug, Default)]
pub struct JobSettings {
    pub transaction_flags: Bitfield<TransactionFlag>,
    pub uid: Option<u32>,
    pub locale: Option<String>,
    pub proxy: Proxy,
    pub cache_age: Option<u32>,
    pub background: bool,
    pub interactive: bool,
    pub frontend_socket: Option<String>,
}

/// Routes state-tree notifications into the job's subscriber fan-out.
struct JobStateSink {
    job: Arc<Job>,
}

impl EventSink for JobStateSink {
    fn emit(&self, event: JobEvent) {
        match event {
            JobEvent::Percentage(p) => {
                self.job.percentage.store(p, Ordering::SeqCst);
                self.job.emit(JobEvent::Percentage(p));
            }
            JobEvent::Status(status) => self.job.set_status(status),
            JobEvent::AllowCancel(allow) => self.job.set_allow_cancel(allow),
            other => self.job.emit(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use pakt_events::CollectorSink;

    use super::*;

    fn job_with_collector(role: Role) -> (Arc<Job>, Arc<CollectorSink>) {
        let job = Job::new(role, JobParams::None);
        let collector = Arc::new(CollectorSink::default());
        job.subscribe(collector.clone());
        (job, collector)
    }

    fn pkg(name: &str) -> PackageId {
        PackageId::new(name, "1.0", "x86_64", "fedora").unwrap()
    }

    #[test]
    fn test_first_error_wins() {
        let (job, collector) = job_with_collector(Role::InstallPackages);
        job.error_code(PkError::PackageNotFound, "no such package");
        job.error_code(PkError::InternalError, "should be ignored");
        assert_eq!(
            job.error().map(|(code, _)| code),
            Some(PkError::PackageNotFound)
        );
        let errors: Vec<_> = collector
            .events()
            .into_iter()
            .filter(|e| matches!(e, JobEvent::ErrorCode { .. }))
            .collect();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_finished_exactly_once() {
        let (job, collector) = job_with_collector(Role::Resolve);
        job.finished();
        job.finished();
        job.finished_with(Exit::Failed);
        let finishes: Vec<_> = collector
            .events()
            .into_iter()
            .filter(|e| e.is_finished())
            .collect();
        assert_eq!(finishes.len(), 1);
        assert_eq!(job.exit(), Some(Exit::Success));
    }

    #[test]
    fn test_no_events_after_finished() {
        let (job, collector) = job_with_collector(Role::Resolve);
        job.package(Info::Available, pkg("hal"), "a package");
        job.finished();
        job.package(Info::Available, pkg("dbus"), "ignored");
        job.set_percentage(50);
        job.set_status(Status::Query);

        let events = collector.events();
        assert!(events.last().unwrap().is_finished());
        let packages = events
            .iter()
            .filter(|e| matches!(e, JobEvent::Package(_)))
            .count();
        assert_eq!(packages, 1);
    }

    #[test]
    fn test_exit_reflects_error() {
        let (job, _collector) = job_with_collector(Role::RefreshCache);
        job.error_code(PkError::NoNetwork, "offline");
        job.finished();
        assert_eq!(job.exit(), Some(Exit::Failed));

        let (job, _collector) = job_with_collector(Role::RefreshCache);
        job.error_code(PkError::TransactionCancelled, "cancelled by user");
        job.finished();
        assert_eq!(job.exit(), Some(Exit::Cancelled));
    }

    #[test]
    fn test_cancel_respects_allow_cancel() {
        let (job, _collector) = job_with_collector(Role::InstallPackages);
        job.set_allow_cancel(false);
        assert_eq!(job.cancel(), Err(PkError::CannotCancel));
        job.set_allow_cancel(true);
        assert!(job.cancel().is_ok());
        assert!(job.cancellable().is_cancelled());
    }

    #[test]
    fn test_state_routes_to_subscribers() {
        let (job, collector) = job_with_collector(Role::SearchName);
        let mut state = job.create_state();
        state.set_number_steps(2).unwrap();
        state.step_done().unwrap();
        state.step_done().unwrap();
        let percentages: Vec<_> = collector
            .events()
            .into_iter()
            .filter_map(|e| match e {
                JobEvent::Percentage(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(percentages, vec![50, 100]);
        assert_eq!(job.percentage(), 100);
    }

    #[test]
    fn test_thread_create_runs_on_worker() {
        let (job, _collector) = job_with_collector(Role::GetPackages);
        let handle = job.thread_create(|job| {
            job.set_status(Status::Query);
            job.finished();
        });
        handle.join().unwrap();
        assert_eq!(job.exit(), Some(Exit::Success));
    }

    #[test]
    fn test_with_settings() {
        let job = Job::with(Role::InstallPackages, JobParams::None, |settings| {
            settings.transaction_flags.add(TransactionFlag::Simulate);
            settings.cache_age = Some(3600);
            settings.locale = Some("en_GB.utf8".into());
            settings.interactive = true;
        });
        assert!(job.has_transaction_flag(TransactionFlag::Simulate));
        assert_eq!(job.cache_age(), 3600);
        assert_eq!(job.locale(), Some("en_GB.utf8"));
        assert!(job.interactive());
        assert!(!job.background());
    }
}
