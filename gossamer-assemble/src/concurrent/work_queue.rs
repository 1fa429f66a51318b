//! A fixed-size pool of OS threads draining a [`BoundedQueue`] of
//! heap-allocated tasks.
//!
//! Mirrors `MultithreadedBatchTask`/`ThreadGroup`'s role in the source:
//! a batch of independent closures is submitted, workers run them to
//! completion, and the first error any worker returns is re-raised to
//! the caller once every worker has joined. Cancellation is cooperative:
//! [`WorkQueue::abort_requested`] exposes a flag tasks can poll at a
//! coarse granularity; nothing preempts a running task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use gossamer_common::{Error, Result};

use super::bounded_queue::BoundedQueue;

type Task = Box<dyn FnOnce() -> Result<()> + Send>;

/// A fixed-size worker pool. Construct with [`WorkQueue::new`], submit
/// tasks with [`WorkQueue::submit`], and call [`WorkQueue::join`] once
/// to drain the queue and collect the first error, if any.
pub struct WorkQueue {
    queue: Arc<BoundedQueue<Task>>,
    abort: Arc<AtomicBool>,
    workers: Vec<thread::JoinHandle<Result<()>>>,
}

impl WorkQueue {
    /// Spin up `threads` workers (minimum 1), each pulling tasks from a
    /// queue bounded at `capacity` items.
    pub fn new(threads: usize, capacity: usize) -> Self {
        let threads = threads.max(1);
        let queue: Arc<BoundedQueue<Task>> = Arc::new(BoundedQueue::new(capacity.max(1)));
        let abort = Arc::new(AtomicBool::new(false));

        let workers = (0..threads)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || -> Result<()> {
                    let mut first_err = None;
                    while let Some(task) = queue.get() {
                        if let Err(e) = task() {
                            if first_err.is_none() {
                                first_err = Some(e);
                            }
                        }
                    }
                    match first_err {
                        Some(e) => Err(e),
                        None => Ok(()),
                    }
                })
            })
            .collect();

        WorkQueue {
            queue,
            abort,
            workers,
        }
    }

    /// Submit a task. Blocks while the queue is at capacity.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.queue.put(Box::new(task));
    }

    /// A flag tasks may poll to return early in an aborted state.
    pub fn abort_requested(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Request cooperative cancellation of all outstanding tasks.
    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Signal there is no more work, wait for every worker to finish,
    /// and re-raise the first error any of them returned.
    pub fn join(mut self) -> Result<()> {
        self.queue.finish();
        let mut first_err = None;
        for handle in self.workers.drain(..) {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                Err(_) => {
                    if first_err.is_none() {
                        first_err = Some(Error::InvariantViolation(
                            "worker thread panicked".to_string(),
                        ));
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
