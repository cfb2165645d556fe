//! Bounded single-producer, multi-consumer work-stealing deque.
//!
//! The Chase-Lev algorithm: the owner thread pushes/pops the back, any
//! thread may steal from the front, and a CAS on `top` resolves contention
//! over the last element.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering::*};

use crate::util::CachePadded;

/// A bounded SPMC deque of `T`, with a compile-time power-of-two capacity
/// `C`.
///
/// Only the thread that constructed it (the "owner") may call
/// [`Self::push_back`]/[`Self::pop_back`]; any thread may call
/// [`Self::pop_front`] to steal.
pub struct ChaseLevDeque<T, const C: usize> {
    top: CachePadded<AtomicU64>,
    bottom: CachePadded<AtomicU64>,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// SAFETY: ownership of elements transfers between threads exactly once
// (push on the owner, a single successful pop_back/pop_front elsewhere),
// synchronized by the atomics below; this requires `T: Send` but not `Sync`
// since no two threads ever observe the same slot live simultaneously.
unsafe impl<T: Send, const C: usize> Send for ChaseLevDeque<T, C> {}
unsafe impl<T: Send, const C: usize> Sync for ChaseLevDeque<T, C> {}

impl<T, const C: usize> ChaseLevDeque<T, C> {
    const MASK: u64 = {
        assert!(C.is_power_of_two(), "ChaseLevDeque capacity must be a power of two");
        (C - 1) as u64
    };

    /// An empty deque.
    pub fn new() -> Self {
        let slots = (0..C).map(|_| UnsafeCell::new(MaybeUninit::uninit())).collect();
        Self {
            top: CachePadded::new(AtomicU64::new(0)),
            bottom: CachePadded::new(AtomicU64::new(0)),
            slots,
        }
    }

    /// The number of live elements. Racy against concurrent stealers;
    /// intended for diagnostics.
    pub fn len(&self) -> usize {
        let b = self.bottom.load(Relaxed);
        let t = self.top.load(Relaxed);
        b.saturating_sub(t) as usize
    }

    /// Whether the deque currently holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn slot(&self, index: u64) -> *mut MaybeUninit<T> {
        self.slots[(index & Self::MASK) as usize].get()
    }

    /// Pushes `value` onto the back. Owner-only.
    ///
    /// # Safety
    ///
    /// Must only be called by the owner thread, and never when the deque
    /// already holds `C` elements — overflow is a programming error the
    /// caller must avoid.
    pub unsafe fn push_back(&self, value: T) {
        let b = self.bottom.load(Relaxed);
        let t = self.top.load(Acquire);
        debug_assert!(b.wrapping_sub(t) < C as u64, "ChaseLevDeque push_back overflow");

        self.slot(b).write(MaybeUninit::new(value));
        self.bottom.store(b.wrapping_add(1), Release);
    }

    /// Pops from the back. Owner-only.
    ///
    /// # Safety
    ///
    /// Must only be called by the owner thread.
    pub unsafe fn pop_back(&self) -> Option<T> {
        let b = self.bottom.load(Relaxed).wrapping_sub(1);
        self.bottom.store(b, Relaxed);

        let t = self.top.load(Relaxed);

        if (b as i64).wrapping_sub(t as i64) < 0 {
            self.bottom.store(t, Relaxed);
            return None;
        }

        let value = self.slot(b).read().assume_init();

        if (b as i64).wrapping_sub(t as i64) > 0 {
            return Some(value);
        }

        // Last element: race any concurrent stealer for it via CAS on top.
        let won = self
            .top
            .compare_exchange(t, t.wrapping_add(1), Release, Acquire)
            .is_ok();
        self.bottom.store(t.wrapping_add(1), Relaxed);

        if won {
            Some(value)
        } else {
            std::mem::forget(value);
            None
        }
    }

    /// Steals from the front. Safe to call from any thread, including the
    /// owner.
    pub fn pop_front(&self) -> Option<T> {
        let t = self.top.load(Acquire);
        let b = self.bottom.load(Acquire);

        if (b as i64).wrapping_sub(t as i64) <= 0 {
            return None;
        }

        // SAFETY: `t < b`, so slot `t` holds a live, not-yet-read element;
        // the CAS below ensures at most one thread takes ownership of it.
        let value = unsafe { self.slot(t).read().assume_init() };

        match self.top.compare_exchange(t, t.wrapping_add(1), Release, Relaxed) {
            Ok(_) => Some(value),
            Err(_) => {
                std::mem::forget(value);
                None
            }
        }
    }
}

impl<T, const C: usize> Default for ChaseLevDeque<T, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const C: usize> Drop for ChaseLevDeque<T, C> {
    fn drop(&mut self) {
        // SAFETY: no concurrent access is possible while we hold `&mut
        // self`; every slot in `[top, bottom)` still holds a live element.
        unsafe {
            while self.pop_back().is_some() {}
        }
    }
}
