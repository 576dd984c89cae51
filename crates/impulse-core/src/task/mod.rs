//! Background task pipeline
//!
//! Expensive work (decoding, rendering, kernel construction, freeing) runs on
//! worker threads as units of [`Work`]. Each unit lives inside a [`Task`], a
//! three-state machine owned by the real-time orchestrator:
//!
//! ```text
//!   idle ──submit──▶ running ──worker finishes──▶ completed ──reset──▶ idle
//! ```
//!
//! The state doubles as the ownership token for the work data: while a task
//! is running only the worker may touch it, otherwise only the owner may.
//! [`Task::work`] and [`Task::work_mut`] return `None` while running, so the
//! owner cannot read results early or modify inputs under the worker's feet.
//!
//! No transition blocks or allocates, so the whole cycle can be driven from
//! the audio callback.

mod collect;
mod executor;
mod loader;
mod reconfigure;

pub use collect::CollectWork;
pub use executor::{Executor, ManualExecutor, ThreadPoolExecutor};
pub use loader::{LoadWork, LoadedImpulse};
pub use reconfigure::{phase_offsets, FileRender, ReconfigureWork, SlotRoute};

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::error::{LoadStatus, TaskResult};

/// Body of a background task
pub trait Work: Send + 'static {
    /// Short name for log messages
    fn name(&self) -> &'static str;

    /// Run to completion on a worker thread
    fn run(&mut self) -> TaskResult;
}

/// Type-erased entry point used by executors
pub trait Runnable: Send + Sync {
    fn execute(&self);
}

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Idle = 0,
    Running = 1,
    Completed = 2,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TaskState::Running,
            2 => TaskState::Completed,
            _ => TaskState::Idle,
        }
    }
}

struct Job<W> {
    state: AtomicU8,
    status: AtomicU8,
    work: UnsafeCell<W>,
}

// SAFETY: `work` is only accessed by the worker while the state is Running and
// only by the owning `Task` otherwise. The Release store of Completed (worker)
// and of Running (owner) publish the respective writes, and both sides Acquire
// the state before touching `work`.
unsafe impl<W: Send> Sync for Job<W> {}

impl<W: Work> Runnable for Job<W> {
    fn execute(&self) {
        if self.state.load(Ordering::Acquire) != TaskState::Running as u8 {
            log::error!("[EXEC] Refusing to run a task that was not submitted");
            return;
        }

        // SAFETY: Running state grants the worker exclusive access to `work`
        let work = unsafe { &mut *self.work.get() };
        let status = match work.run() {
            Ok(()) => LoadStatus::Ok,
            Err(e) => {
                log::warn!("[EXEC] {} task failed: {}", work.name(), e);
                e.status()
            }
        };

        self.status.store(status.code(), Ordering::Relaxed);
        self.state.store(TaskState::Completed as u8, Ordering::Release);
    }
}

/// Owner side of a background task
///
/// Deliberately not `Clone`: exactly one owner drives the state machine.
pub struct Task<W: Work> {
    job: Arc<Job<W>>,
}

impl<W: Work> Task<W> {
    pub fn new(work: W) -> Self {
        Self {
            job: Arc::new(Job {
                state: AtomicU8::new(TaskState::Idle as u8),
                status: AtomicU8::new(LoadStatus::Ok.code()),
                work: UnsafeCell::new(work),
            }),
        }
    }

    #[inline]
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.job.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn idle(&self) -> bool {
        self.state() == TaskState::Idle
    }

    #[inline]
    pub fn running(&self) -> bool {
        self.state() == TaskState::Running
    }

    #[inline]
    pub fn completed(&self) -> bool {
        self.state() == TaskState::Completed
    }

    /// Result of the last run; meaningful once completed
    #[inline]
    pub fn status(&self) -> LoadStatus {
        LoadStatus::from_code(self.job.status.load(Ordering::Relaxed))
    }

    /// Hand the task to `executor` (idle → running)
    ///
    /// Returns false without changing state if the task is not idle or the
    /// executor refuses it; the caller simply retries on a later block.
    pub fn submit(&mut self, executor: &dyn Executor) -> bool {
        if !self.idle() {
            return false;
        }

        self.job
            .state
            .store(TaskState::Running as u8, Ordering::Release);
        let job: Arc<dyn Runnable> = self.job.clone();
        if executor.submit(job) {
            true
        } else {
            self.job.state.store(TaskState::Idle as u8, Ordering::Release);
            false
        }
    }

    /// Acknowledge a completed result (completed → idle)
    pub fn reset(&mut self) -> bool {
        self.job
            .state
            .compare_exchange(
                TaskState::Completed as u8,
                TaskState::Idle as u8,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Work data, unless a worker currently owns it
    pub fn work(&self) -> Option<&W> {
        if self.running() {
            return None;
        }
        // SAFETY: not running, and `submit` needs `&mut self`, so no worker can
        // gain access while this shared borrow is alive
        Some(unsafe { &*self.job.work.get() })
    }

    /// Mutable work data, unless a worker currently owns it
    pub fn work_mut(&mut self) -> Option<&mut W> {
        if self.running() {
            return None;
        }
        // SAFETY: as for `work`, with exclusivity guaranteed by `&mut self`
        Some(unsafe { &mut *self.job.work.get() })
    }

    /// Wait until the worker finishes (not real-time safe)
    ///
    /// Used at teardown, where outstanding work must finish before the data
    /// it references can be released. Executors that queue work on the
    /// caller's side are drained while waiting, so this cannot stall on a
    /// job nobody will ever run.
    pub fn join(&self, executor: &dyn Executor) {
        while self.running() {
            if !executor.run_queued() {
                std::thread::yield_now();
            }
        }
    }
}
