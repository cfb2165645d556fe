//! Exclusive ownership (`Unique<T>`).

use std::ptr::NonNull;

use super::{Counted, Owned};

/// An exclusive handle to a [`Counted`] value with no counter involvement.
///
/// Non-copyable, movable.
pub struct Unique<T: Counted> {
    ptr: Option<NonNull<T>>,
}

impl<T: Counted> Unique<T> {
    /// An empty handle.
    #[inline]
    pub const fn empty() -> Self {
        Self { ptr: None }
    }

    /// Constructs a new `T` on the heap, exclusively owned by this handle.
    ///
    /// The counter is left at zero: `Unique` never shares ownership, so
    /// nothing increments it until (if ever) [`Self::into_owned`] converts
    /// this handle into an [`Owned<T>`].
    pub fn new(value: T) -> Self {
        debug_assert_eq!(value.counter().get(), 0, "freshly constructed value must start uncounted");
        let ptr = NonNull::from(Box::leak(Box::new(value)));
        Self { ptr: Some(ptr) }
    }

    /// Whether this handle is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ptr.is_none()
    }

    /// Gives up the raw pointer without destroying the pointee.
    ///
    /// The caller becomes responsible for the value's lifetime.
    #[inline]
    pub fn release(mut self) -> Option<NonNull<T>> {
        self.ptr.take()
    }

    /// Installs a new pointer, destroying whatever this handle previously
    /// held.
    ///
    /// # Safety
    ///
    /// `ptr` (if any) must point to a live, uncounted `T` exclusively owned
    /// by the caller from this point on.
    pub unsafe fn reset(&mut self, ptr: Option<NonNull<T>>) {
        if let Some(old) = self.ptr.take() {
            debug_assert_eq!(old.as_ref().counter().get(), 0, "destroying a still-counted value");
            drop(Box::from_raw(old.as_ptr()));
        }
        self.ptr = ptr;
    }

    /// Converts this handle into a shared [`Owned<T>`] by releasing
    /// exclusive ownership and bringing the counter from zero to one.
    pub fn into_owned(mut self) -> Owned<T> {
        let ptr = self.ptr.take().expect("converted an empty Unique handle into Owned");
        // SAFETY: `ptr` is exclusively owned by `self`, which we're
        // consuming, and its counter is zero (never incremented by a bare
        // `Unique`), so this is the first share.
        unsafe { Owned::from_raw(ptr) }
    }
}

impl<T: Counted> Default for Unique<T> {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Counted> std::ops::Deref for Unique<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: a non-empty handle exclusively owns a live `T`.
        unsafe { self.ptr.expect("dereferenced an empty Unique handle").as_ref() }
    }
}

impl<T: Counted> std::ops::DerefMut for Unique<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: exclusive ownership means a unique `&mut` is always sound.
        unsafe { self.ptr.expect("dereferenced an empty Unique handle").as_mut() }
    }
}

impl<T: Counted> Drop for Unique<T> {
    fn drop(&mut self) {
        let Some(ptr) = self.ptr.take() else { return };
        // SAFETY: `ptr` is exclusively owned by this handle, and a `Unique`
        // never shares or increments the counter, so it is still zero.
        unsafe {
            debug_assert_eq!(ptr.as_ref().counter().get(), 0, "destroying a still-counted value");
            drop(Box::from_raw(ptr.as_ptr()));
        }
    }
}

// SAFETY: exclusive ownership means sending `Unique<T>` across threads is
// sound whenever `T` is `Send`; it is never `Sync` since `&Unique<T>`
// exposes no sharing beyond a normal `&T`, which already requires `T: Sync`
// through ordinary borrow rules.
unsafe impl<T: Counted + Send> Send for Unique<T> {}
