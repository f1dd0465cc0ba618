use std::sync::Arc;

use crate::capabilities::{BackendInfo, Capabilities};
use crate::job::Job;

/// A native package-manager backend.
///
/// The engine holds one of these as a trait object and drives every
/// transaction through it: `start_job`, the role entry via `run_job`,
/// then `stop_job`. Implementations must end every `run_job` with
/// `job.finished()` (or an error plus `finished`) and must never emit
/// after it.
pub trait Backend: Send + Sync {
    fn info(&self) -> BackendInfo;

    /// Capability set, computed at load time and stable afterwards.
    fn capabilities(&self) -> Capabilities;

    /// Called on the engine thread before the role entry point runs.
    fn start_job(&self, _job: &Arc<Job>) {}

    /// Called after the job finished, error or not.
    fn stop_job(&self, _job: &Arc<Job>) {}

    /// The role entry point; runs on the job's worker thread. The
    /// engine only calls this for roles in [`Capabilities::roles`].
    fn run_job(&self, job: &Arc<Job>);

    /// Current network link state, forwarded to helpers.
    fn is_online(&self) -> bool {
        true
    }

    /// Releases resources at unload. Called once, after the last job.
    fn unload(&self) {}
}
