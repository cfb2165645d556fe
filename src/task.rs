//! A callable with single-shot completion notification.
//!
//! One generic `Task<R>` covers both the value-returning and no-return
//! case (`R = ()` covers the latter, no separate specialization needed).
//!
//! Completion is a `Mutex<bool>` + `Condvar` pair rather than a bare atomic
//! flag: stable Rust has no futex-style wait accessible from safe code, and
//! `Thread::park`/`unpark` each target a single thread rather than an
//! unbounded number of waiters. The mutex's release/acquire on lock/unlock
//! gives the same happens-before guarantee a flag's release/acquire would,
//! and `Condvar` broadcasts to every waiter rather than just one.

use std::sync::{Condvar, Mutex, MutexGuard};

/// A closure bound to a worker index, with a result slot and a completion
/// flag waiters can block on.
///
/// `R` defaults to `()` for tasks with no return value.
pub struct Task<R = ()> {
    callable: Mutex<Box<dyn FnMut(usize) -> R + Send>>,
    result: Mutex<Option<R>>,
    finished: Mutex<bool>,
    condvar: Condvar,
    /// Lets a task be shared via `Owned<Task<R>>`.
    counter: crate::rc::Counter,
}

impl<R: Send> Task<R> {
    /// Wraps `callable`, which will be invoked with the worker index that
    /// runs it. Bind any additional arguments into the closure itself at
    /// construction time.
    pub fn new<F>(callable: F) -> Self
    where
        F: FnMut(usize) -> R + Send + 'static,
    {
        Self {
            callable: Mutex::new(Box::new(callable)),
            result: Mutex::new(None),
            finished: Mutex::new(false),
            condvar: Condvar::new(),
            counter: crate::rc::Counter::new(),
        }
    }

    /// Runs the callable with `worker_index`, stores its result, and
    /// notifies any waiters.
    ///
    /// Invoking a task that is already finished without an intervening
    /// [`Self::reset`] is a programming error.
    pub fn invoke(&self, worker_index: usize) {
        debug_assert!(!self.is_finished(), "invoking a finished task without reset");

        let value = (self.callable.lock().unwrap())(worker_index);
        *self.result.lock().unwrap() = Some(value);
        self.notify_completed();
    }

    fn notify_completed(&self) {
        let mut finished = self.finished.lock().unwrap();
        *finished = true;
        // Dropping the guard after this happens-before any `wait` that
        // reacquires the mutex, giving the release/acquire pairing the
        // result slot needs.
        self.condvar.notify_all();
    }

    /// Loads the completion flag.
    #[inline]
    pub fn is_finished(&self) -> bool {
        *self.finished.lock().unwrap()
    }

    /// Blocks until [`Self::invoke`] has completed.
    pub fn wait_until_finished(&self) {
        let mut finished = self.finished.lock().unwrap();
        while !*finished {
            finished = self.condvar.wait(finished).unwrap();
        }
    }

    /// Blocks until finished, then returns a guard over the result.
    ///
    /// The result stays valid until the task is reset: holding the guard
    /// blocks a concurrent [`Self::reset`] (which also locks the result)
    /// for as long as it's alive.
    pub fn wait_for_result(&self) -> MutexGuard<'_, Option<R>> {
        self.wait_until_finished();
        self.result.lock().unwrap()
    }

    /// Clears the completion flag and the result slot, allowing the task to
    /// be invoked again.
    ///
    /// Only valid once the task is finished; debug-asserted, since racing a
    /// reset with an in-flight waiter is undefined.
    pub fn reset(&self) {
        let mut finished = self.finished.lock().unwrap();
        debug_assert!(*finished, "reset on a task that has not finished");
        *self.result.lock().unwrap() = None;
        *finished = false;
    }
}

impl<R: Send> crate::rc::Counted for Task<R> {
    #[inline]
    fn counter(&self) -> &crate::rc::Counter {
        &self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn invoke_then_wait_observes_result() {
        let task = Arc::new(Task::new(|worker_index: usize| worker_index * 2));
        let handle = {
            let task = Arc::clone(&task);
            thread::spawn(move || task.invoke(21))
        };
        handle.join().unwrap();

        task.wait_until_finished();
        assert_eq!(*task.wait_for_result(), Some(42));
    }

    #[test]
    fn reset_allows_a_second_invocation() {
        let task = Task::new(|worker_index: usize| worker_index + 1);
        task.invoke(1);
        assert_eq!(*task.wait_for_result(), Some(2));

        task.reset();
        assert!(!task.is_finished());

        task.invoke(9);
        assert_eq!(*task.wait_for_result(), Some(10));
    }

    #[test]
    fn concurrent_waiters_all_observe_completion() {
        let task = Arc::new(Task::new(|_: usize| ()));
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let task = Arc::clone(&task);
                thread::spawn(move || task.wait_until_finished())
            })
            .collect();

        thread::sleep(std::time::Duration::from_millis(10));
        task.invoke(0);

        for waiter in waiters {
            waiter.join().unwrap();
        }
    }
}
