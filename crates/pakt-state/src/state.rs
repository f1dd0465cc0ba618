use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use pakt_events::{EventSinkHandle, JobEvent};
use pakt_types::Status;
use pakt_utils::lock::FileLock;
use tracing::debug;

use crate::cancel::Cancellable;
use crate::error::{StateError, StateResult};

/// Process-wide resources serialized through the state tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    RpmDb,
    Repo,
    Metadata,
}

impl LockKind {
    fn name(self) -> &'static str {
        match self {
            LockKind::RpmDb => "rpmdb",
            LockKind::Repo => "repo",
            LockKind::Metadata => "metadata",
        }
    }
}

/// How hard to take a lock. Both modes are backed by a process-wide
/// file lock; `Thread` exists so call sites document intra-process
/// serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Process,
    Thread,
}

/// Values shared by an entire state tree.
struct Shared {
    sink: EventSinkHandle,
    cancellable: Cancellable,
    /// Last emitted percentage; u32::MAX until the first emission.
    last_percentage: AtomicU32,
    action: Mutex<(Status, Option<String>)>,
    speed: Mutex<u64>,
    allow_cancel: Mutex<bool>,
    locks: Mutex<Vec<FileLock>>,
    lock_dir: PathBuf,
}

impl Shared {
    fn emit_percentage(&self, percentage: u32) {
        let last = self.last_percentage.load(Ordering::SeqCst);
        // subscribers do not like percentages going backwards
        if last != u32::MAX && percentage <= last {
            return;
        }
        self.last_percentage.store(percentage, Ordering::SeqCst);
        self.sink.emit(JobEvent::Percentage(percentage));
    }
}

enum Steps {
    Unset,
    /// Explicit weights summing to 100.
    Weighted(Vec<u32>),
    /// `n` equal steps.
    Counted(usize),
}

impl Steps {
    fn len(&self) -> usize {
        match self {
            Steps::Unset => 0,
            Steps::Weighted(weights) => weights.len(),
            Steps::Counted(n) => *n,
        }
    }

    /// Completed fraction after `current` steps, in 0..=1.
    fn fraction(&self, current: usize) -> f64 {
        match self {
            Steps::Unset => 0.0,
            Steps::Weighted(weights) => {
                weights[..current].iter().sum::<u32>() as f64 / 100.0
            }
            Steps::Counted(n) => current as f64 / *n as f64,
        }
    }
}

/// One node of the progress tree.
///
/// A node owns a span of the overall percentage; children subdivide the
/// span of the step that was current when they were created. Nodes are
/// single-producer: only the thread running the role mutates them.
pub struct State {
    shared: Arc<Shared>,
    /// Absolute percent where this node's span starts.
    base: f64,
    /// Absolute percent covered by this node.
    width: f64,
    steps: Steps,
    current: usize,
}

impl State {
    /// Creates the root of a new progress tree spanning 0..=100.
    pub fn new_root(sink: EventSinkHandle, cancellable: Cancellable, lock_dir: PathBuf) -> Self {
        Self {
            shared: Arc::new(Shared {
                sink,
                cancellable,
                last_percentage: AtomicU32::new(u32::MAX),
                action: Mutex::new((Status::Unknown, None)),
                speed: Mutex::new(0),
                allow_cancel: Mutex::new(true),
                locks: Mutex::new(Vec::new()),
                lock_dir,
            }),
            base: 0.0,
            width: 100.0,
            steps: Steps::Unset,
            current: 0,
        }
    }

    pub fn cancellable(&self) -> Cancellable {
        self.shared.cancellable.clone()
    }

    /// Declares explicit step weights. The weights must sum to exactly
    /// 100 and can only be set once per node.
    pub fn set_steps(&mut self, weights: &[u32]) -> StateResult<()> {
        if !matches!(self.steps, Steps::Unset) {
            return Err(StateError::Invalid("steps already set".into()));
        }
        if weights.is_empty() {
            return Err(StateError::Invalid("no steps given".into()));
        }
        let total: u32 = weights.iter().sum();
        if total != 100 {
            return Err(StateError::Invalid(format!(
                "step weights sum to {total}, not 100"
            )));
        }
        self.steps = Steps::Weighted(weights.to_vec());
        Ok(())
    }

    /// Declares `n` equally-weighted steps.
    pub fn set_number_steps(&mut self, n: usize) -> StateResult<()> {
        if !matches!(self.steps, Steps::Unset) {
            return Err(StateError::Invalid("steps already set".into()));
        }
        if n == 0 {
            return Err(StateError::Invalid("zero steps".into()));
        }
        self.steps = Steps::Counted(n);
        Ok(())
    }

    /// Marks the current step as complete and reports the new
    /// percentage. Fails with `Cancelled` after `cancel()` and with
    /// `Invalid` when stepping past the declared count.
    pub fn step_done(&mut self) -> StateResult<()> {
        if self.shared.cancellable.is_cancelled() {
            return Err(StateError::Cancelled);
        }
        let total = self.steps.len();
        if total == 0 {
            return Err(StateError::Invalid("step_done without steps".into()));
        }
        if self.current >= total {
            return Err(StateError::Invalid(format!(
                "step_done called {} times for {} steps",
                self.current + 1,
                total
            )));
        }
        self.current += 1;
        let absolute = self.base + self.width * self.steps.fraction(self.current);
        self.shared.emit_percentage(absolute.round() as u32);
        Ok(())
    }

    /// Returns a child node bound to the current step. The child's own
    /// percentage is scaled into this step's share before propagation.
    pub fn child(&mut self) -> StateResult<State> {
        let total = self.steps.len();
        if total == 0 {
            return Err(StateError::Invalid("child requested without steps".into()));
        }
        if self.current >= total {
            return Err(StateError::Invalid("child requested past the last step".into()));
        }
        let start = self.steps.fraction(self.current);
        let end = self.steps.fraction(self.current + 1);
        Ok(State {
            shared: Arc::clone(&self.shared),
            base: self.base + self.width * start,
            width: self.width * (end - start),
            steps: Steps::Unset,
            current: 0,
        })
    }

    /// Short-circuits the remainder of this branch to its end without
    /// emitting false intermediate values.
    pub fn finished(&mut self) -> StateResult<()> {
        if self.shared.cancellable.is_cancelled() {
            return Err(StateError::Cancelled);
        }
        self.current = self.steps.len().max(1);
        if let Steps::Unset = self.steps {
            self.steps = Steps::Counted(1);
        }
        let absolute = self.base + self.width;
        self.shared.emit_percentage(absolute.round() as u32);
        Ok(())
    }

    /// Current phase of the whole tree, notified only on change.
    pub fn set_action(&self, action: Status, hint: Option<&str>) {
        let mut guard = self.shared.action.lock().unwrap();
        if guard.0 == action && guard.1.as_deref() == hint {
            return;
        }
        *guard = (action, hint.map(str::to_string));
        drop(guard);
        self.shared.sink.emit(JobEvent::Status(action));
    }

    pub fn action(&self) -> (Status, Option<String>) {
        self.shared.action.lock().unwrap().clone()
    }

    /// Transfer speed in bytes per second, notified only on change.
    pub fn set_speed(&self, bytes_per_second: u64) {
        let mut guard = self.shared.speed.lock().unwrap();
        if *guard == bytes_per_second {
            return;
        }
        *guard = bytes_per_second;
        drop(guard);
        self.shared.sink.emit(JobEvent::Speed(bytes_per_second));
    }

    /// Whether cancel is currently honored, notified only on change.
    pub fn set_allow_cancel(&self, allow: bool) {
        let mut guard = self.shared.allow_cancel.lock().unwrap();
        if *guard == allow {
            return;
        }
        *guard = allow;
        drop(guard);
        self.shared.sink.emit(JobEvent::AllowCancel(allow));
    }

    pub fn allow_cancel(&self) -> bool {
        *self.shared.allow_cancel.lock().unwrap()
    }

    /// Acquires a named resource lock held by the whole tree until
    /// [`State::release_locks`] or drop.
    pub fn take_lock(&self, kind: LockKind, _mode: LockMode) -> StateResult<()> {
        let lock = FileLock::acquire(&self.shared.lock_dir, kind.name())?;
        debug!(lock = kind.name(), "acquired named lock");
        self.shared.locks.lock().unwrap().push(lock);
        Ok(())
    }

    /// Releases every lock taken through this state tree.
    pub fn release_locks(&self) {
        self.shared.locks.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pakt_events::{CollectorSink, JobEvent};

    use super::*;

    fn root_with_collector() -> (State, Arc<CollectorSink>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let collector = Arc::new(CollectorSink::default());
        let state = State::new_root(
            collector.clone(),
            Cancellable::new(),
            dir.path().to_path_buf(),
        );
        (state, collector, dir)
    }

    fn percentages(collector: &CollectorSink) -> Vec<u32> {
        collector
            .events()
            .into_iter()
            .filter_map(|e| match e {
                JobEvent::Percentage(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_counted_steps_reach_exactly_100() {
        let (mut state, collector, _dir) = root_with_collector();
        state.set_number_steps(4).unwrap();
        for _ in 0..4 {
            state.step_done().unwrap();
        }
        assert_eq!(percentages(&collector), vec![25, 50, 75, 100]);
    }

    #[test]
    fn test_weights_must_sum_to_100() {
        let (mut state, _collector, _dir) = root_with_collector();
        assert!(state.set_steps(&[50, 49]).is_err());
        assert!(state.set_steps(&[2, 98]).is_ok());
        assert!(state.set_steps(&[2, 98]).is_err());
    }

    #[test]
    fn test_child_scales_into_parent_step() {
        let (mut state, collector, _dir) = root_with_collector();
        state.set_steps(&[2, 98]).unwrap();
        state.step_done().unwrap();
        assert_eq!(percentages(&collector), vec![2]);

        let mut child = state.child().unwrap();
        child.set_number_steps(4).unwrap();
        child.step_done().unwrap();
        child.step_done().unwrap();
        // 2 + 98 * 2/4
        assert_eq!(percentages(&collector), vec![2, 27, 51]);
    }

    #[test]
    fn test_percentage_is_monotonic() {
        let (mut state, collector, _dir) = root_with_collector();
        state.set_steps(&[10, 90]).unwrap();
        let mut child = state.child().unwrap();
        child.set_number_steps(2).unwrap();
        child.step_done().unwrap();
        child.step_done().unwrap();
        state.step_done().unwrap();
        state.step_done().unwrap();
        let emitted = percentages(&collector);
        let mut sorted = emitted.clone();
        sorted.sort_unstable();
        assert_eq!(emitted, sorted);
        assert_eq!(*emitted.last().unwrap(), 100);
    }

    #[test]
    fn test_step_overrun_fails() {
        let (mut state, _collector, _dir) = root_with_collector();
        state.set_number_steps(1).unwrap();
        state.step_done().unwrap();
        assert!(matches!(state.step_done(), Err(StateError::Invalid(_))));
    }

    #[test]
    fn test_cancel_fails_next_step() {
        let (mut state, _collector, _dir) = root_with_collector();
        state.set_number_steps(2).unwrap();
        state.step_done().unwrap();
        state.cancellable().cancel();
        assert!(matches!(state.step_done(), Err(StateError::Cancelled)));
    }

    #[test]
    fn test_finished_short_circuits() {
        let (mut state, collector, _dir) = root_with_collector();
        state.set_number_steps(10).unwrap();
        state.step_done().unwrap();
        state.finished().unwrap();
        assert_eq!(percentages(&collector), vec![10, 100]);
    }

    #[test]
    fn test_notifications_only_on_change() {
        let (state, collector, _dir) = root_with_collector();
        state.set_speed(1000);
        state.set_speed(1000);
        state.set_speed(2000);
        state.set_allow_cancel(true); // initial value, no emission
        state.set_allow_cancel(false);
        state.set_action(Status::Download, None);
        state.set_action(Status::Download, None);

        let events = collector.events();
        let speeds = events
            .iter()
            .filter(|e| matches!(e, JobEvent::Speed(_)))
            .count();
        let cancels = events
            .iter()
            .filter(|e| matches!(e, JobEvent::AllowCancel(_)))
            .count();
        let statuses = events
            .iter()
            .filter(|e| matches!(e, JobEvent::Status(_)))
            .count();
        assert_eq!(speeds, 2);
        assert_eq!(cancels, 1);
        assert_eq!(statuses, 1);
    }

    #[test]
    fn test_take_and_release_locks() {
        let (state, _collector, dir) = root_with_collector();
        state.take_lock(LockKind::RpmDb, LockMode::Process).unwrap();
        assert!(
            FileLock::try_acquire(dir.path(), "rpmdb").unwrap().is_none(),
            "lock should be held"
        );
        state.release_locks();
        assert!(FileLock::try_acquire(dir.path(), "rpmdb").unwrap().is_some());
    }
}
