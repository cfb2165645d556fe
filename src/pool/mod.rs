//! Fixed worker-count thread pool with a shared FIFO queue.
//!
//! A mutex-guarded queue, a task-ready flag workers block on, a pending
//! counter, and a shutdown protocol that drains residual work onto the
//! calling thread.
//!
//! This is the pool's *only* backing queue — [`crate::deque::ChaseLevDeque`]
//! is a standalone primitive a caller could build a work-stealing scheduler
//! from, but this pool does not use one internally.

mod affinity;

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::*};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::error::{Error, Result};
use crate::rc::Owned;
use crate::task::Task;
use crate::util::fixed_vec::FixedVec;

type Job = Box<dyn FnOnce(usize) + Send + 'static>;

/// Upper bound on the partitions a single [`ThreadPool::for_each`] call may
/// create. The partition list is a fixed-size array rather than a heap
/// allocation, same as the stack allocator's entry list; a request for more
/// partitions than this fails with [`Error::CapacityExceeded`] rather than
/// growing.
pub const MAX_FOR_EACH_PARTITIONS: usize = 64;

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    task_ready: Mutex<bool>,
    ready_condvar: Condvar,
    shutdown: AtomicBool,
    pending: AtomicUsize,
    terminated: AtomicUsize,
}

/// A fixed-size pool of worker threads draining a shared FIFO queue.
///
/// Workers are assigned contiguous 1-based indices; index `0` is reserved
/// for the calling thread, which this constructor also pins/names for
/// diagnostic symmetry with the workers.
pub struct ThreadPool {
    shared: std::sync::Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
    worker_count: usize,
}

impl ThreadPool {
    /// Spawns `worker_count` OS threads and pins/names the calling thread
    /// as worker `0`.
    pub fn new(worker_count: usize) -> Self {
        affinity::pin_and_name(0, "substrate-main");

        let shared = std::sync::Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            task_ready: Mutex::new(false),
            ready_condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
            terminated: AtomicUsize::new(0),
        });

        let threads = (1..=worker_count)
            .map(|index| {
                let shared = std::sync::Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("substrate-worker-{index}"))
                    .spawn(move || Self::worker_loop(shared, index))
                    .expect("failed to spawn thread pool worker")
            })
            .collect();

        Self { shared, threads, worker_count }
    }

    fn worker_loop(shared: std::sync::Arc<Shared>, index: usize) {
        affinity::pin_and_name(index, &format!("substrate-worker-{index}"));

        loop {
            {
                let mut ready = shared.task_ready.lock().unwrap();
                while !*ready {
                    ready = shared.ready_condvar.wait(ready).unwrap();
                }
            }

            if shared.shutdown.load(Relaxed) {
                break;
            }

            let job = {
                let mut queue = shared.queue.lock().unwrap();
                match queue.pop_front() {
                    Some(job) => Some(job),
                    None => {
                        *shared.task_ready.lock().unwrap() = false;
                        None
                    }
                }
            };

            if let Some(job) = job {
                job(index);
                shared.pending.fetch_sub(1, Release);
            }
        }

        shared.terminated.fetch_add(1, Relaxed);
    }

    /// The number of worker threads (excluding the reserved index-0
    /// calling thread).
    #[inline]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Submits `callable` to the pool and returns an owning handle to its
    /// [`Task`].
    ///
    /// The returned handle and the queued job share ownership of the same
    /// task; invoking it decrements the pool's pending count and notifies
    /// any thread waiting on the task's completion.
    pub fn submit<R, F>(&self, callable: F) -> Owned<Task<R>>
    where
        R: Send + 'static,
        F: FnMut(usize) -> R + Send + 'static,
    {
        let task = Owned::create(Task::new(callable));
        let queued = task.clone();

        self.shared.pending.fetch_add(1, Relaxed);
        {
            let mut queue = self.shared.queue.lock().unwrap();
            queue.push_back(Box::new(move |index| queued.invoke(index)));
        }
        *self.shared.task_ready.lock().unwrap() = true;
        self.shared.ready_condvar.notify_one();

        task
    }

    /// Blocks the calling thread until every submitted task has completed.
    ///
    /// Required before destroying resources a submitted task's closure
    /// captured by reference.
    pub fn await_pending(&self) {
        while self.shared.pending.load(Acquire) != 0 {
            std::thread::yield_now();
        }
    }

    /// Partitions `range` into `partitions` contiguous, non-overlapping
    /// chunks and runs `callable` on each chunk's bounds, blocking until
    /// every chunk has completed.
    ///
    /// This is the blocking partitioner: the calling thread executes the
    /// first partition itself rather than submitting it and idling, the
    /// same way it reserves worker index `0` for the caller. A caller who
    /// wants every partition (including the first) delegated to the pool,
    /// awaiting each independently, can build that directly from
    /// [`Self::submit`].
    ///
    /// Fails with [`Error::CapacityExceeded`] if `partitions - 1` would
    /// exceed [`MAX_FOR_EACH_PARTITIONS`] (the caller-thread partition
    /// doesn't need a slot in the fixed-size task list).
    pub fn for_each<F>(&self, range: Range<usize>, partitions: usize, callable: F) -> Result<()>
    where
        F: Fn(Range<usize>) + Send + Sync + 'static,
    {
        let partitions = partitions.max(1);
        if partitions - 1 > MAX_FOR_EACH_PARTITIONS {
            return Err(Error::CapacityExceeded);
        }

        let size = range.end.saturating_sub(range.start);
        if size == 0 || partitions == 1 {
            callable(range);
            return Ok(());
        }

        let callable = Arc::new(callable);
        let mut tasks: FixedVec<Owned<Task<()>>, MAX_FOR_EACH_PARTITIONS> = FixedVec::new();

        let first_end = size / partitions;
        let mut start = first_end;
        for i in 1..partitions {
            let end = (i + 1) * size / partitions;
            debug_assert!(end <= size, "for_each partition exceeds range size");

            let chunk = (range.start + start)..(range.start + end);
            let callable = Arc::clone(&callable);
            let task = self.submit(move |_| callable(chunk.clone()));
            let pushed = tasks.push(task);
            debug_assert!(pushed, "partition count was checked against MAX_FOR_EACH_PARTITIONS above");

            start = end;
        }

        callable(range.start..range.start + first_end);

        for task in tasks.as_slice() {
            task.wait_until_finished();
        }
        Ok(())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Relaxed);

        // Workers exit as soon as they observe `shutdown`, without draining
        // whatever is still queued — that's this destructor's job, below.
        // Waiting on `pending == 0` here as well as `terminated` would
        // deadlock: a worker can exit leaving jobs (and thus pending) behind
        // that no thread will ever run to decrement it.
        while self.shared.terminated.load(Relaxed) != self.worker_count {
            *self.shared.task_ready.lock().unwrap() = true;
            self.shared.ready_condvar.notify_all();
        }

        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }

        let mut queue = self.shared.queue.lock().unwrap();
        if !queue.is_empty() {
            log::warn!(
                "destroying thread pool with {} pending task(s); running them serially on the calling thread",
                queue.len()
            );
        }
        while let Some(job) = queue.pop_front() {
            job(0);
        }
    }
}
