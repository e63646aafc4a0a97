//! The serialized task queue all externally observable work runs on.
//!
//! Every component queues its deferred work (parser completion, event
//! dispatch, state re-evaluation) onto one shared queue, and the embedder
//! drains it between animation ticks. Running tasks strictly in queue order
//! is what gives appends, removals and events their documented ordering.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

type Task = Box<dyn FnOnce() + Send>;

/// Cloneable handle to a shared FIFO of deferred tasks.
#[derive(Clone, Default)]
pub struct TaskQueue {
    inner: Arc<Mutex<VecDeque<Task>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a task to the end of the queue.
    pub fn queue(&self, task: impl FnOnce() + Send + 'static) {
        self.inner.lock().push_back(Box::new(task));
    }

    /// Runs queued tasks until the queue is empty, including tasks queued
    /// by the tasks themselves. Returns the number of tasks run.
    ///
    /// The queue lock is released around each task so tasks can queue
    /// follow-up work without deadlocking.
    pub fn run(&self) -> usize {
        let mut count = 0;
        loop {
            let task = self.inner.lock().pop_front();
            match task {
                Some(task) => {
                    task();
                    count += 1;
                }
                None => return count,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_tasks_run_in_order() {
        let queue = TaskQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = Arc::clone(&log);
            queue.queue(move || log.lock().push(i));
        }
        assert_eq!(queue.run(), 3);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_tasks_can_queue_tasks() {
        let queue = TaskQueue::new();
        let count = Arc::new(AtomicUsize::new(0));

        let inner_count = Arc::clone(&count);
        let inner_queue = queue.clone();
        queue.queue(move || {
            inner_count.fetch_add(1, Ordering::SeqCst);
            let c = Arc::clone(&inner_count);
            inner_queue.queue(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert_eq!(queue.run(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
