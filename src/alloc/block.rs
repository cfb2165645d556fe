//! Fixed-capacity slab allocator.
//!
//! A contiguous buffer of `N` fixed-size chunks, threaded into a LIFO free
//! list through the first `pointer_size` bytes of each free chunk.

use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering::*};

use crate::error::{Error, Result};

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::NotSync {}
    impl Sealed for super::Atomic {}
}

/// Selects the thread-safety strategy of a [`BlockAllocator`]'s free-list
/// head.
///
/// This is a type-level choice rather than a runtime flag: sharing a
/// [`BlockAllocator<NotSync>`] across threads is a compile error, not a bug
/// that has to be detected at runtime.
pub trait Synchronization: sealed::Sealed {
    #[doc(hidden)]
    type Head: Default;
    #[doc(hidden)]
    fn head_ptr(head: &Self::Head) -> *mut u8;
    #[doc(hidden)]
    fn push(head: &Self::Head, chunk: NonNull<u8>);
    #[doc(hidden)]
    fn pop(head: &Self::Head) -> Option<NonNull<u8>>;
    #[doc(hidden)]
    fn reset(head: &Self::Head, first: *mut u8);
}

/// Reads the pointer stored in the first word of `chunk` (the free-list
/// link).
///
/// # Safety
///
/// `chunk` must be a free chunk at least `pointer_size` bytes wide.
#[inline]
unsafe fn read_next(chunk: *mut u8) -> *mut u8 {
    chunk.cast::<*mut u8>().read()
}

/// Writes `next` into the first word of `chunk` (the free-list link).
///
/// # Safety
///
/// `chunk` must be at least `pointer_size` bytes wide.
#[inline]
unsafe fn write_next(chunk: *mut u8, next: *mut u8) {
    chunk.cast::<*mut u8>().write(next);
}

/// Single-threaded free-list head: no synchronization, cheapest allocate/
/// deallocate. A [`BlockAllocator<NotSync>`] is `!Sync`, so the compiler
/// rejects sharing it across threads.
#[derive(Debug, Default)]
pub struct NotSync(());

impl Synchronization for NotSync {
    type Head = Cell<*mut u8>;

    #[inline]
    fn head_ptr(head: &Self::Head) -> *mut u8 {
        head.get()
    }

    #[inline]
    fn push(head: &Self::Head, chunk: NonNull<u8>) {
        let old = head.get();
        // SAFETY: `chunk` was allocated at `chunk_size >= pointer_size`.
        unsafe { write_next(chunk.as_ptr(), old) };
        head.set(chunk.as_ptr());
    }

    #[inline]
    fn pop(head: &Self::Head) -> Option<NonNull<u8>> {
        let current = head.get();
        let chunk = NonNull::new(current)?;
        // SAFETY: `current` is a live free chunk, written by a prior `push`.
        let next = unsafe { read_next(chunk.as_ptr()) };
        head.set(next);
        Some(chunk)
    }

    #[inline]
    fn reset(head: &Self::Head, first: *mut u8) {
        head.set(first);
    }
}

/// Thread-safe free-list head: a CAS loop over an [`AtomicPtr`].
///
/// This does not tag pointers against ABA: freed chunks are reused in LIFO
/// order within a single allocator, and concurrent allocate/deallocate only
/// need to preserve the chunk-ownership invariants, not ABA-safety beyond
/// that.
#[derive(Debug, Default)]
pub struct Atomic(());

impl Synchronization for Atomic {
    type Head = AtomicPtr<u8>;

    #[inline]
    fn head_ptr(head: &Self::Head) -> *mut u8 {
        head.load(Acquire)
    }

    #[inline]
    fn push(head: &Self::Head, chunk: NonNull<u8>) {
        let mut old = head.load(Acquire);
        loop {
            // SAFETY: `chunk` was allocated at `chunk_size >= pointer_size`
            // and is not yet visible to other threads.
            unsafe { write_next(chunk.as_ptr(), old) };
            match head.compare_exchange_weak(old, chunk.as_ptr(), Release, Acquire) {
                Ok(_) => return,
                Err(actual) => old = actual,
            }
        }
    }

    #[inline]
    fn pop(head: &Self::Head) -> Option<NonNull<u8>> {
        let mut current = head.load(Acquire);
        loop {
            let chunk = NonNull::new(current)?;
            // SAFETY: `current` was observed non-null and is only mutated
            // by other `pop`/`push` calls through this same head, which
            // preserve the free-list link until a winning CAS removes it.
            let next = unsafe { read_next(chunk.as_ptr()) };
            match head.compare_exchange_weak(current, next, AcqRel, Acquire) {
                Ok(_) => return Some(chunk),
                Err(actual) => current = actual,
            }
        }
    }

    #[inline]
    fn reset(head: &Self::Head, first: *mut u8) {
        head.store(first, Release);
    }
}

/// A fixed-capacity slab allocator over `N = buffer_size / chunk_size`
/// chunks of `chunk_size = max(instance_size, pointer_size)` bytes.
///
/// `M` selects the free-list's thread-safety strategy; see
/// [`Synchronization`]. Defaults to [`Atomic`].
pub struct BlockAllocator<M: Synchronization = Atomic> {
    buffer: NonNull<u8>,
    buffer_size: usize,
    chunk_size: usize,
    alignment: usize,
    owns_buffer: bool,
    head: M::Head,
    _marker: PhantomData<M>,
}

// SAFETY: the buffer and free-list head are only ever mutated through
// `&self` methods that either require exclusive access (`&mut self`) or
// route through `M::Synchronization`'s prescribed strategy.
unsafe impl<M: Synchronization> Send for BlockAllocator<M> {}
// SAFETY: `Atomic`'s head is an `AtomicPtr`, safe to share; `NotSync`'s
// `Cell`-backed head is never exposed as `Sync` because `Cell` itself isn't.
unsafe impl Sync for BlockAllocator<Atomic> {}

impl<M: Synchronization> BlockAllocator<M> {
    fn chunk_size_for(instance_size: usize) -> usize {
        instance_size.max(std::mem::size_of::<*const u8>())
    }

    fn link_free_list(buffer: NonNull<u8>, chunk_size: usize, count: usize) -> M::Head {
        let head = M::Head::default();
        if count == 0 {
            return head;
        }
        // SAFETY: `count * chunk_size <= buffer_size` by construction, and
        // each chunk is at least `pointer_size` bytes.
        unsafe {
            for i in (0..count).rev() {
                let chunk = buffer.as_ptr().add(i * chunk_size);
                M::push(&head, NonNull::new_unchecked(chunk));
            }
        }
        head
    }

    /// Builds a slab allocator owning a freshly allocated, aligned buffer.
    ///
    /// `chunk_size` is raised to at least `instance_size` and the pointer
    /// size. `alignment` must be a power of two at least `chunk_size`.
    pub fn new_owned(buffer_size: usize, instance_size: usize, alignment: usize) -> Result<Self> {
        let chunk_size = Self::chunk_size_for(instance_size);
        if !alignment.is_power_of_two() || alignment < chunk_size {
            return Err(Error::InvalidAlignment(alignment));
        }
        let buffer = crate::alloc::allocate_aligned(buffer_size, alignment)
            .ok_or(Error::OutOfMemory)?;

        let count = buffer_size / chunk_size;
        let head = Self::link_free_list(buffer, chunk_size, count);

        Ok(Self {
            buffer,
            buffer_size,
            chunk_size,
            alignment,
            owns_buffer: true,
            head,
            _marker: PhantomData,
        })
    }

    /// Builds a slab allocator over a caller-owned buffer.
    ///
    /// The caller guarantees `buffer` is valid for `buffer_size` bytes and
    /// aligned suitably for `instance_size`-sized objects; this allocator
    /// never frees `buffer`.
    pub fn new_borrowed(buffer: NonNull<u8>, buffer_size: usize, instance_size: usize) -> Self {
        let chunk_size = Self::chunk_size_for(instance_size);
        let count = buffer_size / chunk_size;
        let head = Self::link_free_list(buffer, chunk_size, count);

        Self {
            buffer,
            buffer_size,
            chunk_size,
            alignment: 1,
            owns_buffer: false,
            head,
            _marker: PhantomData,
        }
    }

    /// The number of chunks this allocator manages.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer_size / self.chunk_size
    }

    /// The size in bytes of each chunk.
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Whether the free list is empty (every chunk is allocated).
    #[inline]
    pub fn is_full(&self) -> bool {
        M::head_ptr(&self.head).is_null()
    }

    /// Pops a chunk off the free list. `None` if full.
    #[inline]
    pub fn allocate(&self) -> Option<NonNull<u8>> {
        M::pop(&self.head)
    }

    /// Returns a chunk to the free list.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator's [`Self::allocate`]
    /// and not already deallocated (see [`Self::belongs`]).
    #[inline]
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        debug_assert!(self.belongs(ptr.as_ptr()), "pointer does not belong to this allocator");
        M::push(&self.head, ptr);
    }

    /// Whether `ptr` falls within this allocator's buffer at a chunk
    /// boundary, in O(1).
    #[inline]
    pub fn belongs(&self, ptr: *const u8) -> bool {
        let start = self.buffer.as_ptr() as usize;
        let end = start + self.buffer_size;
        let addr = ptr as usize;
        addr >= start && addr < end && (addr - start) % self.chunk_size == 0
    }

    /// Rebuilds the free list to contain every chunk.
    ///
    /// Valid only when no outstanding allocations exist; `&mut self`
    /// enforces exclusive access, but the caller must still ensure no
    /// pointer previously handed out by [`Self::allocate`] is used again.
    pub fn reset(&mut self) {
        let count = self.capacity();
        if count == 0 {
            M::reset(&self.head, std::ptr::null_mut());
            return;
        }
        // SAFETY: every chunk is within the owned buffer and at least
        // `pointer_size` bytes, and `&mut self` proves no concurrent
        // allocate/deallocate is in flight.
        unsafe {
            for i in 0..count - 1 {
                let chunk = self.buffer.as_ptr().add(i * self.chunk_size);
                let next = self.buffer.as_ptr().add((i + 1) * self.chunk_size);
                write_next(chunk, next);
            }
            write_next(self.buffer.as_ptr().add((count - 1) * self.chunk_size), std::ptr::null_mut());
        }
        M::reset(&self.head, self.buffer.as_ptr());
    }

    /// Allocates a chunk and constructs a `T` in it.
    ///
    /// Returns `None` if the allocator is full. The caller must ensure
    /// `size_of::<T>() <= self.chunk_size()`.
    pub fn create<T>(&self, value: T) -> Option<NonNull<T>> {
        debug_assert!(std::mem::size_of::<T>() <= self.chunk_size);
        let chunk = self.allocate()?.cast::<T>();
        // SAFETY: `chunk` is a fresh, appropriately sized allocation.
        unsafe { crate::alloc::construct(chunk.as_ptr(), value) };
        Some(chunk)
    }

    /// Destructs the `T` at `ptr` and returns its chunk to the free list.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`Self::create`] on this allocator
    /// and not already destroyed.
    pub unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        crate::alloc::destruct(ptr.as_ptr());
        self.deallocate(ptr.cast());
    }
}

impl<M: Synchronization> Drop for BlockAllocator<M> {
    fn drop(&mut self) {
        if cfg!(debug_assertions) {
            let mut free_count = 0usize;
            let mut current = M::head_ptr(&self.head);
            while let Some(chunk) = NonNull::new(current) {
                free_count += 1;
                // SAFETY: every node on the free list was written by
                // `link_free_list`/`reset`/`deallocate`.
                current = unsafe { read_next(chunk.as_ptr()) };
            }
            debug_assert_eq!(
                free_count,
                self.capacity(),
                "block allocator dropped with outstanding chunks still allocated"
            );
        }

        if self.owns_buffer {
            // SAFETY: `self.buffer` was allocated by `new_owned` with these
            // exact `buffer_size`/`alignment`.
            unsafe {
                crate::alloc::deallocate_aligned(self.buffer, self.buffer_size, self.alignment)
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_s1_round_trip() {
        let alloc: BlockAllocator<Atomic> = BlockAllocator::new_owned(16 * 10, 16, 16).unwrap();
        assert_eq!(alloc.capacity(), 10);

        let mut ptrs = Vec::new();
        for _ in 0..10 {
            ptrs.push(alloc.allocate().unwrap());
        }
        assert!(alloc.is_full());
        assert!(alloc.allocate().is_none());

        for w in ptrs.windows(2) {
            let diff = w[1].as_ptr() as usize - w[0].as_ptr() as usize;
            assert_eq!(diff, 16);
        }

        for ptr in ptrs {
            unsafe { alloc.deallocate(ptr) };
        }
        assert!(!alloc.is_full());

        let mut ptrs2 = Vec::new();
        for _ in 0..10 {
            ptrs2.push(alloc.allocate().unwrap());
        }
        assert_eq!(ptrs2.len(), 10);
        assert!(alloc.is_full());
        for ptr in ptrs2 {
            unsafe { alloc.deallocate(ptr) };
        }
    }

    #[test]
    fn belongs_checks_range_and_stride() {
        let alloc: BlockAllocator<NotSync> = BlockAllocator::new_owned(64, 16, 16).unwrap();
        let ptr = alloc.allocate().unwrap();
        assert!(alloc.belongs(ptr.as_ptr()));
        assert!(!alloc.belongs(unsafe { ptr.as_ptr().add(1) }));
        assert!(!alloc.belongs(std::ptr::null()));
        unsafe { alloc.deallocate(ptr) };
    }

    #[test]
    fn reset_restores_full_capacity() {
        let mut alloc: BlockAllocator<NotSync> = BlockAllocator::new_owned(64, 16, 16).unwrap();
        let a = alloc.allocate().unwrap();
        let b = alloc.allocate().unwrap();
        unsafe {
            alloc.deallocate(a);
            alloc.deallocate(b);
        }
        alloc.reset();
        let mut count = 0;
        while alloc.allocate().is_some() {
            count += 1;
        }
        assert_eq!(count, alloc.capacity());
    }

    #[test]
    fn borrowed_buffer_is_not_freed_on_drop() {
        let layout = std::alloc::Layout::from_size_align(64, 16).unwrap();
        let raw = unsafe { std::alloc::alloc(layout) };
        let buffer = NonNull::new(raw).unwrap();

        {
            let alloc: BlockAllocator<NotSync> = BlockAllocator::new_borrowed(buffer, 64, 16);
            let _ = alloc.allocate();
        }

        // If the allocator had freed `buffer`, writing to it would be UB;
        // under Miri/ASan this would be caught. Here we just demonstrate
        // the caller retains ownership.
        unsafe {
            buffer.as_ptr().write_bytes(0, 64);
            std::alloc::dealloc(raw, layout);
        }
    }

    #[test]
    fn create_destroy_run_constructors() {
        use std::rc::Rc;

        let alloc: BlockAllocator<NotSync> =
            BlockAllocator::new_owned(std::mem::size_of::<Rc<()>>() * 4, std::mem::size_of::<Rc<()>>(), 8).unwrap();

        let counter = Rc::new(());
        let ptr = alloc.create(counter.clone()).unwrap();
        assert_eq!(Rc::strong_count(&counter), 2);

        unsafe { alloc.destroy(ptr) };
        assert_eq!(Rc::strong_count(&counter), 1);
    }
}
