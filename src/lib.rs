#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! Custom allocators, intrusive reference counting, and a work-stealing
//! thread pool for latency-sensitive native applications.
//!
//! The pieces are meant to be used together but don't depend on one
//! another: a caller typically allocates task objects from a
//! [`alloc::block::BlockAllocator`], wraps the payload in an
//! [`rc::Owned`]/[`rc::Unique`] handle, and submits the work to a
//! [`pool::ThreadPool`]. [`deque::ChaseLevDeque`] is available standalone
//! for callers building their own work-stealing scheduler instead of using
//! the pool's internal mutex-protected queue.

pub mod alloc;
pub mod deque;
pub mod error;
pub mod pool;
pub mod rc;
pub mod task;
pub(crate) mod util;

pub use error::{Error, Result};
pub use task::Task;
