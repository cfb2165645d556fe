//! Shared, reference-counted ownership (`Owned<T>`).

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;

use super::{Counted, Unique};

/// A shared handle to a [`Counted`] value.
///
/// Either empty, or a non-owning raw reference to a `T` whose counter has
/// been incremented for this handle's share — "non-owning" in the sense
/// that the pointee's storage is owned by the reference count itself, not
/// by any one handle.
pub struct Owned<T: Counted> {
    ptr: Option<NonNull<T>>,
}

impl<T: Counted> Owned<T> {
    /// An empty handle.
    #[inline]
    pub const fn empty() -> Self {
        Self { ptr: None }
    }

    /// Constructs a new `T` on the heap and returns an owning handle to it
    /// with a count of one.
    ///
    /// This, along with [`Unique::new`], is the only way to produce a live
    /// [`Counted`] value — see the trait's documentation.
    pub fn create(value: T) -> Self {
        let boxed = Box::new(value);
        boxed.counter().increment();
        let ptr = NonNull::from(Box::leak(boxed));
        Self { ptr: Some(ptr) }
    }

    /// Wraps an existing pointer, incrementing its counter for this
    /// handle's share.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live `T` previously produced by
    /// [`Self::create`] or [`Unique::new`] (directly or via another
    /// `Owned`/`Unique` handle to it).
    #[inline]
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        ptr.as_ref().counter().increment();
        Self { ptr: Some(ptr) }
    }

    /// Whether this handle is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ptr.is_none()
    }

    /// The current reference count, or `0` if empty.
    #[inline]
    pub fn count(&self) -> usize {
        self.ptr.map(|p| unsafe { p.as_ref() }.counter().get()).unwrap_or(0)
    }

    /// The raw pointer this handle holds, if non-empty.
    #[inline]
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.ptr
    }
}

impl<T: Counted> Default for Owned<T> {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Counted> std::ops::Deref for Owned<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: a non-empty handle always holds a live `T` for as long as
        // the handle exists, by the invariant that `rc(T) >= 1` while any
        // `Owned` handle refers to it.
        unsafe { self.ptr.expect("dereferenced an empty Owned handle").as_ref() }
    }
}

impl<T: Counted> Clone for Owned<T> {
    fn clone(&self) -> Self {
        if let Some(ptr) = self.ptr {
            // SAFETY: `ptr` is live for as long as `self` is.
            unsafe { ptr.as_ref() }.counter().increment();
        }
        Self { ptr: self.ptr }
    }
}

impl<T: Counted> Drop for Owned<T> {
    fn drop(&mut self) {
        let Some(ptr) = self.ptr.take() else { return };
        // SAFETY: `ptr` is live for as long as this handle holds it.
        let released = unsafe { ptr.as_ref() }.counter().decrement();
        if released {
            // SAFETY: the count just reached zero, and this was the last
            // handle, so no other reference to `ptr` remains.
            unsafe { T::self_destruct(ptr) };
        }
    }
}

impl<T: Counted> From<Unique<T>> for Owned<T> {
    #[inline]
    fn from(unique: Unique<T>) -> Self {
        unique.into_owned()
    }
}

impl<T: Counted> PartialEq for Owned<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T: Counted> Eq for Owned<T> {}

impl<T: Counted> PartialOrd for Owned<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Counted> Ord for Owned<T> {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.ptr.map(|p| p.as_ptr() as usize).cmp(&other.ptr.map(|p| p.as_ptr() as usize))
    }
}

impl<T: Counted> Hash for Owned<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr.map(|p| p.as_ptr() as usize).hash(state);
    }
}

// SAFETY: `Owned<T>` only exposes shared access to `T` and synchronizes the
// count with atomics; sharing a handle across threads is sound whenever `T`
// itself is `Sync`, and sending ownership across threads is sound whenever
// `T` is `Send + Sync` (another thread may be the one to run the destructor).
unsafe impl<T: Counted + Sync> Sync for Owned<T> {}
unsafe impl<T: Counted + Send + Sync> Send for Owned<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};

    struct Probe {
        counter: super::super::Counter,
        destroyed: &'static AtomicUsize,
    }

    impl Counted for Probe {
        fn counter(&self) -> &super::super::Counter {
            &self.counter
        }
    }

    impl Drop for Probe {
        fn drop(&mut self) {
            self.destroyed.fetch_add(1, Relaxed);
        }
    }

    #[test]
    fn create_starts_at_one_and_destroys_at_zero() {
        static DESTROYED: AtomicUsize = AtomicUsize::new(0);
        DESTROYED.store(0, Relaxed);

        let handle = Owned::create(Probe { counter: super::super::Counter::new(), destroyed: &DESTROYED });
        assert_eq!(handle.count(), 1);

        let clone = handle.clone();
        assert_eq!(handle.count(), 2);
        assert_eq!(clone.count(), 2);

        drop(handle);
        assert_eq!(DESTROYED.load(Relaxed), 0);
        drop(clone);
        assert_eq!(DESTROYED.load(Relaxed), 1);
    }

    #[test]
    fn empty_handle_has_zero_count() {
        let handle: Owned<Probe> = Owned::empty();
        assert!(handle.is_empty());
        assert_eq!(handle.count(), 0);
    }

    #[test]
    fn ordering_follows_pointer_identity() {
        static DESTROYED: AtomicUsize = AtomicUsize::new(0);

        let a = Owned::create(Probe { counter: super::super::Counter::new(), destroyed: &DESTROYED });
        let b = Owned::create(Probe { counter: super::super::Counter::new(), destroyed: &DESTROYED });
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
    }
}
