//! Boundary error types.
//!
//! Hot paths (`allocate`, `push_back`, `submit`, ...) never return this type;
//! they return `Option` per the crate's failure semantics. This type exists
//! for constructors and other boundary operations where a caller benefits
//! from matching on *why* something failed.

use thiserror::Error;

/// A boundary failure.
///
/// See the module docs for why most of the crate's hot paths don't use this.
#[derive(Debug, Error)]
pub enum Error {
    /// The backing platform allocator refused a request.
    #[error("out of memory")]
    OutOfMemory,

    /// A fixed-capacity structure (a thread pool's `for_each` partition
    /// list, ...) has no room left.
    #[error("capacity exceeded")]
    CapacityExceeded,

    /// A requested alignment was not a power of two, or was smaller than
    /// required.
    #[error("invalid alignment: {0}")]
    InvalidAlignment(usize),
}

/// Shorthand for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
