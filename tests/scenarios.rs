//! End-to-end scenarios exercising each component's invariants together,
//! one test per scenario described in the design document.

use substrate::alloc::block::{Atomic, BlockAllocator, NotSync};
use substrate::alloc::stack::StackAllocator;
use substrate::deque::ChaseLevDeque;
use substrate::pool::ThreadPool;
use substrate::rc::{Counted, Counter, Owned};

#[test]
fn scenario_block_allocator_round_trip() {
    let alloc: BlockAllocator<NotSync> = BlockAllocator::new_owned(16 * 10, 16, 16).unwrap();

    let mut ptrs = Vec::new();
    for _ in 0..10 {
        ptrs.push(alloc.allocate().unwrap());
    }
    for window in ptrs.windows(2) {
        let diff = window[1].as_ptr() as usize - window[0].as_ptr() as usize;
        assert_eq!(diff, 16);
    }

    for ptr in ptrs.drain(..) {
        unsafe { alloc.deallocate(ptr) };
    }

    assert!(!alloc.is_full());
    for _ in 0..10 {
        ptrs.push(alloc.allocate().unwrap());
    }
    assert!(alloc.is_full());
    assert_eq!(alloc.capacity(), 10);

    for ptr in ptrs {
        unsafe { alloc.deallocate(ptr) };
    }
}

#[test]
fn scenario_stack_allocator_lifo() {
    let mut stack: StackAllocator = StackAllocator::new(256).unwrap();

    let a = stack.allocate(32, 8).unwrap();
    let b = stack.allocate(48, 32).unwrap();
    let c = stack.allocate(16, 1).unwrap();

    assert_ne!(a, b);
    assert_ne!(b, c);
    assert_eq!(b.as_ptr() as usize % 32, 0);

    let alignment_offset_of_b = (b.as_ptr() as usize) - (a.as_ptr() as usize + 32);
    assert_eq!(stack.remaining(), 256 - (32 + 48 + 16) - alignment_offset_of_b);

    stack.deallocate(c);
    stack.deallocate(b);
    stack.deallocate(a);
    assert_eq!(stack.remaining(), 256);
    assert!(stack.is_empty());
}

struct Instance {
    counter: Counter,
    live: &'static std::sync::atomic::AtomicUsize,
}

impl Counted for Instance {
    fn counter(&self) -> &Counter {
        &self.counter
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.live.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
    }
}

#[test]
fn scenario_intrusive_counter_alternating_handles() {
    static LIVE: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);
    LIVE.store(0, std::sync::atomic::Ordering::SeqCst);

    let mut handles: Vec<Owned<Instance>> = Vec::with_capacity(1000);
    for i in 0..1000 {
        if i % 2 == 0 {
            LIVE.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            handles.push(Owned::create(Instance { counter: Counter::new(), live: &LIVE }));
        } else {
            let clone = handles.last().unwrap().clone();
            handles.push(clone);
        }
    }

    assert_eq!(LIVE.load(std::sync::atomic::Ordering::SeqCst), 500);
    drop(handles);
    assert_eq!(LIVE.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[test]
fn scenario_task_return_value_under_repeated_submission() {
    let pool = ThreadPool::new(4);

    for _ in 0..1000 {
        let seven_plus_one = pool.submit(|_| 7 + 1);
        let nine_plus_eleven = pool.submit(|_| 9 + 11);

        assert_eq!(*seven_plus_one.wait_for_result(), Some(8));
        assert_eq!(*nine_plus_eleven.wait_for_result(), Some(20));
    }
}

#[test]
fn scenario_deque_uniqueness_under_contention() {
    use std::sync::Arc;
    use std::thread;

    let deque: Arc<ChaseLevDeque<u32, 1>> = Arc::new(ChaseLevDeque::new());
    unsafe { deque.push_back(42) };

    let thieves: Vec<_> = (0..4)
        .map(|_| {
            let deque = Arc::clone(&deque);
            thread::spawn(move || deque.pop_front())
        })
        .collect();

    let results: Vec<Option<u32>> = thieves.into_iter().map(|t| t.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_some()).count();
    assert_eq!(winners, 1);
    assert!(results.iter().all(|r| r.is_none() || *r == Some(42)));
}

#[test]
fn scenario_parallel_sum() {
    const N: u64 = 1_000_000;
    const WORKERS: usize = 8;

    let pool = ThreadPool::new(WORKERS);
    let chunk = (N as usize).div_ceil(WORKERS);

    let tasks: Vec<_> = (0..WORKERS)
        .map(|w| {
            let start = (w * chunk) as u64;
            let end = ((w + 1) * chunk).min(N as usize) as u64;
            pool.submit(move |_| (start..end).sum::<u64>())
        })
        .collect();

    let total: u64 = tasks.iter().map(|t| t.wait_for_result().unwrap()).sum();
    assert_eq!(total, N * (N - 1) / 2);
}

#[test]
fn block_allocator_thread_safe_variant_survives_concurrent_use() {
    use std::sync::Arc;
    use std::thread;

    let alloc: Arc<BlockAllocator<Atomic>> =
        Arc::new(BlockAllocator::new_owned(8 * 64, 8, 8).unwrap());

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let alloc = Arc::clone(&alloc);
            thread::spawn(move || {
                for _ in 0..100 {
                    if let Some(ptr) = alloc.allocate() {
                        unsafe { alloc.deallocate(ptr) };
                    }
                }
            })
        })
        .collect();

    for t in threads {
        t.join().unwrap();
    }
    assert!(!alloc.is_full());
}
