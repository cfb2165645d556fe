//! Internal utilities that back the core components.
//!
//! Everything here is `pub(crate)`: small containers the allocators and
//! the thread pool need internally, not part of this crate's public
//! surface.

pub mod cache_padded;
pub(crate) mod fixed_vec;
pub(crate) mod parallelism;

pub use cache_padded::CachePadded;
