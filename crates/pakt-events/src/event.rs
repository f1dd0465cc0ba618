use pakt_types::{
    Category, Details, DistroUpgrade, Exit, Files, MediaType, Package, PackageId, PkError,
    RepoDetail, RepoSignature, Restart, Status, UpdateDetail,
};

/// Everything a running job can tell its subscribers.
///
/// One variant per signal kind; every variant happens-before `Finished`
/// and nothing is delivered after it.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// A package matched a query or is being touched by a transaction.
    Package(Package),
    /// Extended metadata for one package.
    Details(Details),
    /// The file list of one package.
    Files(Files),
    /// Advisory data for one available update.
    UpdateDetail(UpdateDetail),
    /// An available distribution upgrade.
    DistroUpgrade(DistroUpgrade),
    /// A node of the category tree.
    Category(Category),
    /// One repository from get-repo-list.
    RepoDetail(RepoDetail),
    /// A signature-trust decision is needed before the repo can be used.
    RepoSignatureRequired(RepoSignature),
    /// A license must be accepted before install can proceed.
    EulaRequired {
        eula_id: String,
        package_id: PackageId,
        vendor: String,
        license_agreement: String,
    },
    /// Installation media must be swapped.
    MediaChangeRequired {
        media_type: MediaType,
        media_id: String,
        media_text: String,
    },
    /// Something on the system must restart to finish the update.
    RequireRestart {
        restart: Restart,
        package_id: PackageId,
    },
    /// Informational message, e.g. a per-repo refresh failure that did
    /// not abort the batch.
    Message { details: String },
    /// The job's one typed error.
    ErrorCode { code: PkError, details: String },
    /// Phase change.
    Status(Status),
    /// Overall percentage; 101 means "no meaningful percentage".
    Percentage(u32),
    /// Progress of one package inside a larger transaction.
    ItemProgress {
        package_id: PackageId,
        status: Status,
        percentage: u32,
    },
    /// Current transfer speed in bytes per second.
    Speed(u64),
    /// Bytes still to fetch in the current download phase.
    DownloadSizeRemaining(u64),
    /// Whether the job may currently be cancelled.
    AllowCancel(bool),
    /// Terminal event; exactly one per job.
    Finished(Exit),
}

impl JobEvent {
    /// True for the terminal event.
    pub fn is_finished(&self) -> bool {
        matches!(self, JobEvent::Finished(_))
    }
}
