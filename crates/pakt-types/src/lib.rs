//! Core vocabulary of the pakt daemon: closed enumerations with text
//! round-trips, bitfields over them, package identifiers, result records
//! and EVR version comparison.

mod bitfield;
mod enums;
mod error;
mod evr;
mod package_id;
mod records;

pub use bitfield::{BitEnum, Bitfield};
pub use enums::*;
pub use error::TypesError;
pub use evr::{compare_evr, Evr};
pub use package_id::PackageId;
pub use records::*;

pub type TypesResult<T> = std::result::Result<T, TypesError>;

/// Sentinel percentage meaning "no meaningful percentage is available".
pub const PERCENTAGE_INVALID: u32 = 101;

/// Cache age value meaning metadata of any age is acceptable.
pub const CACHE_AGE_UNLIMITED: u32 = u32::MAX;
