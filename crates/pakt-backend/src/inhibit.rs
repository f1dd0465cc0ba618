//! Transaction inhibition and debounced change notification.
//!
//! Any internal database mutation is bracketed by
//! `inhibit_start`/`inhibit_end`. Installed-DB change notifications that
//! arrive while inhibited are suppressed, and the inhibit only lifts
//! after an idle delay so the file monitor's trailing events from our
//! own commit do not invalidate caches we just rebuilt.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::debug;

type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Debounce applied after the last `inhibit_end`.
pub const INHIBIT_END_DELAY: Duration = Duration::from_secs(3);

struct InhibitInner {
    depth: Mutex<u32>,
    /// Bumped whenever a pending end-timer should be discarded.
    timer_generation: AtomicU64,
    callback: Mutex<Option<ChangeCallback>>,
    delay: Duration,
}

/// Guards installed-DB invalidation against the daemon's own writes.
pub struct TransactionInhibitor {
    inner: Arc<InhibitInner>,
}

impl Default for TransactionInhibitor {
    fn default() -> Self {
        Self::with_delay(INHIBIT_END_DELAY)
    }
}

impl TransactionInhibitor {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: Arc::new(InhibitInner {
                depth: Mutex::new(0),
                timer_generation: AtomicU64::new(0),
                callback: Mutex::new(None),
                delay,
            }),
        }
    }

    /// Callback run when a non-inhibited installed-DB change arrives.
    pub fn set_changed_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.inner.callback.lock().unwrap() = Some(Arc::new(callback));
    }

    pub fn inhibit_start(&self) {
        let mut depth = self.inner.depth.lock().unwrap();
        *depth += 1;
        // a fresh transaction cancels any pending end-timer
        self.inner.timer_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Schedules the inhibit to lift after the idle delay.
    pub fn inhibit_end(&self) {
        let token = self.inner.timer_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("pakt-inhibit-end".into())
            .spawn(move || {
                thread::sleep(inner.delay);
                if inner.timer_generation.load(Ordering::SeqCst) != token {
                    return;
                }
                let mut depth = inner.depth.lock().unwrap();
                if *depth > 0 {
                    *depth -= 1;
                }
            });
        if let Err(err) = spawned {
            tracing::warn!(%err, "failed to spawn inhibit end timer");
        }
    }

    pub fn is_inhibited(&self) -> bool {
        *self.inner.depth.lock().unwrap() > 0
    }

    /// Reports a change to the installed database, typically from a
    /// file monitor. Returns whether the change was delivered.
    pub fn installed_db_changed(&self) -> bool {
        if self.is_inhibited() {
            debug!("ignoring installed db change while inhibited");
            return false;
        }
        let callback = self.inner.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback();
        }
        true
    }
}

/// Batches updates-changed signals behind an optional delay so a burst
/// of transactions produces one notification.
pub struct UpdatesChangedNotifier {
    callback: ChangeCallback,
    delay: Option<Duration>,
    generation: Arc<AtomicU64>,
}

impl UpdatesChangedNotifier {
    pub fn new(delay: Option<Duration>, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
            delay,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn notify(&self) {
        let Some(delay) = self.delay else {
            (self.callback)();
            return;
        };
        let token = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::clone(&self.generation);
        let callback = Arc::clone(&self.callback);
        let spawned = thread::Builder::new()
            .name("pakt-updates-changed".into())
            .spawn(move || {
                thread::sleep(delay);
                if generation.load(Ordering::SeqCst) == token {
                    callback();
                }
            });
        if let Err(err) = spawned {
            tracing::warn!(%err, "failed to spawn updates-changed timer");
        }
    }
}
