//! Backend abstraction for the pakt daemon.
//!
//! A backend is the component that actually talks to a native package
//! manager. The engine sees it as a capability-bearing trait object:
//! advertised roles are checked before dispatch, `start_job`/`stop_job`
//! bracket every transaction, and shared services (EULA and signature
//! registries, the transaction inhibitor, the config monitor) live here
//! behind their own synchronization.

mod capabilities;
mod error;
mod eula;
mod inhibit;
mod job;
mod monitor;
mod registry;
mod traits;

pub use capabilities::{BackendInfo, Capabilities};
pub use error::{BackendError, BackendResult};
pub use eula::{EulaRegistry, SignatureRegistry};
pub use inhibit::{TransactionInhibitor, UpdatesChangedNotifier};
pub use job::{Job, JobParams, Proxy};
pub use monitor::ConfigMonitor;
pub use registry::BackendRegistry;
pub use traits::Backend;
