//! The transaction engine.
//!
//! Everything between the job API and the native package libraries:
//! the sack cache, the query/filter engine, the repository refresh
//! scheduler, the transaction planner, plugin hooks and the scheduler
//! that drives a backend's role entry points. The native libraries are
//! reached through the provider seams in [`providers`].

pub mod context;
pub mod engine;
pub mod error;
pub mod ops;
pub mod plugins;
pub mod providers;
pub mod query;
pub mod refresh;
pub mod sack;
pub mod transaction;

pub use context::EngineContext;
pub use engine::Engine;
pub use error::{JobFailure, OpResult};
