//! Task executors
//!
//! [`ThreadPoolExecutor`] runs tasks on dedicated worker threads fed by a
//! bounded crossbeam channel. [`ManualExecutor`] only queues tasks and runs
//! them when asked, which makes the whole pipeline deterministic for tests
//! and offline rendering.
//!
//! Both refuse work when full instead of blocking; the orchestrator retries
//! on a later audio block.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver, Sender};
use crossbeam::queue::ArrayQueue;

use super::Runnable;

/// Accepts units of work and runs them to completion asynchronously
pub trait Executor: Send + Sync {
    /// Queue `task`; returns false when at capacity. Must not block.
    fn submit(&self, task: Arc<dyn Runnable>) -> bool;

    /// Run one queued task on the calling thread, if this executor keeps
    /// work on the caller's side. Returns whether a task was run.
    fn run_queued(&self) -> bool {
        false
    }
}

/// Fixed pool of worker threads
pub struct ThreadPoolExecutor {
    tx: Option<Sender<Arc<dyn Runnable>>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPoolExecutor {
    /// Spawn `threads` workers sharing a queue of `capacity` tasks
    pub fn new(threads: usize, capacity: usize) -> Self {
        let (tx, rx) = bounded::<Arc<dyn Runnable>>(capacity.max(1));

        let workers = (0..threads.max(1))
            .filter_map(|i| {
                let rx = rx.clone();
                thread::Builder::new()
                    .name(format!("ir-worker-{}", i))
                    .spawn(move || worker_loop(i, rx))
                    .map_err(|e| log::error!("[EXEC] Failed to spawn worker {}: {}", i, e))
                    .ok()
            })
            .collect::<Vec<_>>();

        log::info!(
            "[EXEC] Thread pool started: {} workers, queue capacity {}",
            workers.len(),
            capacity
        );

        Self {
            tx: Some(tx),
            workers,
        }
    }

    /// Number of worker threads actually running
    pub fn threads(&self) -> usize {
        self.workers.len()
    }
}

fn worker_loop(index: usize, rx: Receiver<Arc<dyn Runnable>>) {
    log::debug!("[EXEC] Worker {} started", index);
    // Ends when the pool drops its sender
    while let Ok(task) = rx.recv() {
        task.execute();
    }
    log::debug!("[EXEC] Worker {} stopped", index);
}

impl Executor for ThreadPoolExecutor {
    fn submit(&self, task: Arc<dyn Runnable>) -> bool {
        match &self.tx {
            Some(tx) => tx.try_send(task).is_ok(),
            None => false,
        }
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        // Close the channel; workers finish what is queued, then exit
        self.tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        log::info!("[EXEC] Thread pool stopped");
    }
}

/// Executor that runs queued tasks only on request
pub struct ManualExecutor {
    queue: ArrayQueue<Arc<dyn Runnable>>,
}

impl ManualExecutor {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Number of queued tasks
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Run every queued task on the calling thread, returning how many ran
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        while let Some(task) = self.queue.pop() {
            task.execute();
            count += 1;
        }
        count
    }
}

impl Executor for ManualExecutor {
    fn submit(&self, task: Arc<dyn Runnable>) -> bool {
        self.queue.push(task).is_ok()
    }

    fn run_queued(&self) -> bool {
        match self.queue.pop() {
            Some(task) => {
                task.execute();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tick(Arc<AtomicUsize>);

    impl Runnable for Tick {
        fn execute(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_manual_executor_capacity() {
        let count = Arc::new(AtomicUsize::new(0));
        let executor = ManualExecutor::new(2);

        assert!(executor.submit(Arc::new(Tick(count.clone()))));
        assert!(executor.submit(Arc::new(Tick(count.clone()))));
        assert!(!executor.submit(Arc::new(Tick(count.clone()))));
        assert_eq!(executor.pending(), 2);

        assert!(executor.run_queued());
        assert_eq!(executor.run_pending(), 1);
        assert!(!executor.run_queued());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_thread_pool_drains_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let executor = ThreadPoolExecutor::new(2, 16);
            assert_eq!(executor.threads(), 2);
            for _ in 0..10 {
                assert!(executor.submit(Arc::new(Tick(count.clone()))));
            }
        }
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }
}
