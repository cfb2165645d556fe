//! Cache-line padding to prevent false sharing.

/// The assumed cache-line size used to pad hot atomics apart.
///
/// 64 bytes covers the common case (x86_64, aarch64). A narrower real
/// cache line only costs a little extra padding; a wider one would cost
/// false sharing, which is the failure mode this type exists to avoid.
pub const CACHE_LINE_SIZE: usize = 64;

/// Wraps `T` and aligns it to [`CACHE_LINE_SIZE`], preventing false sharing
/// with neighboring fields.
///
/// Used by the Chase–Lev deque's `top`/`bottom` indices and the thread
/// pool's pending counter, which are independently hot and would otherwise
/// thrash the same cache line under contention.
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct CachePadded<T>(pub T);

impl<T> CachePadded<T> {
    /// Wraps `value`.
    #[inline]
    pub const fn new(value: T) -> Self {
        Self(value)
    }
}

impl<T> std::ops::Deref for CachePadded<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> std::ops::DerefMut for CachePadded<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn aligns_to_cache_line() {
        assert_eq!(align_of::<CachePadded<u8>>(), CACHE_LINE_SIZE);
        assert!(size_of::<CachePadded<u8>>() >= CACHE_LINE_SIZE);
    }

    #[test]
    fn deref_reaches_inner() {
        let padded = CachePadded::new(42u32);
        assert_eq!(*padded, 42);
    }
}
