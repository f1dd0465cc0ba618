//! Hierarchical weighted progress tracking.
//!
//! Every job owns one root [`State`]. A role entry point declares its
//! steps with explicit weights or an equal-step count, then either
//! advances with [`State::step_done`] or hands a [`State::child`] to a
//! sub-operation whose own percentage is scaled into the parent's
//! current step. Percentages reported to subscribers never go backwards.

mod cancel;
mod error;
mod state;

pub use cancel::Cancellable;
pub use error::{StateError, StateResult};
pub use state::{LockKind, LockMode, State};
