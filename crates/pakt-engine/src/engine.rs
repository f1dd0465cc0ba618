//! The job scheduler.
//!
//! One worker thread per job; backends that do not support parallel
//! transactions are serialized behind a gate. The engine guarantees the
//! lifecycle contract: capability check, `start_job`, role entry,
//! `stop_job`, and a `Finished` even when the backend forgets.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use pakt_backend::{Backend, Job};
use pakt_types::PkError;
use tracing::warn;

pub struct Engine {
    backend: Arc<dyn Backend>,
    gate: Option<Arc<Mutex<()>>>,
}

impl Engine {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let gate = if backend.capabilities().supports_parallelization {
            None
        } else {
            Some(Arc::new(Mutex::new(())))
        };
        Self {
            backend,
            gate,
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Submits a job; returns the worker handle.
    pub fn submit(&self, job: Arc<Job>) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let gate = self.gate.clone();
        job.thread_create(move |job| {
            let _serialized = gate.as_ref().map(|g| g.lock().unwrap());

            if !backend.capabilities().supports_role(job.role()) {
                job.error_code(
                    PkError::NotSupported,
                    format!("role {} is not supported by this backend", job.role()),
                );
                job.finished();
                return;
            }

            backend.start_job(&job);
            job.mark_started();
            backend.run_job(&job);

            // the daemon never leaves a job hanging
            if job.exit().is_none() {
                warn!(role = %job.role(), "backend did not finish the job, finishing it");
                if !job.has_error_set() {
                    job.error_code(
                        PkError::InternalError,
                        "backend ended the role entry point without finishing",
                    );
                }
                job.finished();
            }
            backend.stop_job(&job);
        })
    }

    /// Runs a job to completion on the caller's behalf.
    pub fn run_sync(&self, job: Arc<Job>) {
        if self.submit(Arc::clone(&job)).join().is_err() {
            warn!(role = %job.role(), "job worker panicked");
            if job.exit().is_none() {
                job.error_code(PkError::InternalError, "job worker panicked");
                job.finished();
            }
        }
    }
}
