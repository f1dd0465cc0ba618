//! Bridge to helper-backed backends.
//!
//! A helper is an external process that speaks a tab-delimited line
//! protocol on stdout. The bridge launches it with a sanitized
//! environment, translates its records into job events, filters its
//! stderr, and supervises its lifetime with an idle kill timer.

mod backend;
mod bridge;
mod environment;
mod error;
mod protocol;

pub use backend::SpawnBackend;
pub use bridge::{SpawnBridge, SpawnConfig, StderrFilter};
pub use environment::build_helper_env;
pub use error::{ProtocolError, SpawnError};
pub use protocol::{parse_line, HelperMessage};
