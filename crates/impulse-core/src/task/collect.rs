//! Garbage collector task
//!
//! Every `Owned`/`Shared` handle the real-time thread lets go of is pushed
//! onto the basedrop collector's lock-free queue instead of being freed in
//! place. This task drains that queue on a worker thread, running the
//! destructors (and the large deallocations behind them) where latency does
//! not matter.

use basedrop::{Collector, Handle};

use super::Work;
use crate::error::TaskResult;

/// Work data of the collector task
///
/// Owns the instance's `Collector`; all handles used to allocate deferred
/// objects for this engine come from [`CollectWork::handle`].
pub struct CollectWork {
    collector: Option<Collector>,
    passes: u64,
}

impl Default for CollectWork {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectWork {
    pub fn new() -> Self {
        Self::from_collector(Collector::new())
    }

    /// Take ownership of an existing collector
    pub fn from_collector(collector: Collector) -> Self {
        Self {
            collector: Some(collector),
            passes: 0,
        }
    }

    /// Handle for allocating objects whose drop is deferred to this collector
    pub fn handle(&self) -> Option<Handle> {
        self.collector.as_ref().map(Collector::handle)
    }

    /// Number of collect passes run so far
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Final synchronous collection (teardown)
    ///
    /// Frees everything retired so far. If no handles remain the collector
    /// itself is released; otherwise it stays so later retirements still
    /// have somewhere to go.
    pub fn shutdown(&mut self) {
        let Some(mut collector) = self.collector.take() else {
            return;
        };
        collector.collect();
        match collector.try_cleanup() {
            Ok(()) => log::debug!("[GC] Collector released"),
            Err(collector) => {
                log::debug!("[GC] Handles still alive, keeping collector");
                self.collector = Some(collector);
            }
        }
    }
}

impl Work for CollectWork {
    fn name(&self) -> &'static str {
        "collect"
    }

    fn run(&mut self) -> TaskResult {
        if let Some(collector) = self.collector.as_mut() {
            collector.collect();
            self.passes += 1;
            log::trace!("[GC] Collect pass {}", self.passes);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Owned;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drop_is_deferred_until_collect() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut work = CollectWork::new();
        let handle = work.handle().unwrap();

        let owned = Owned::new(&handle, Tracked(dropped.clone()));
        drop(owned);
        assert_eq!(dropped.load(Ordering::SeqCst), 0);

        work.run().unwrap();
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
        assert_eq!(work.passes(), 1);
    }

    #[test]
    fn test_shutdown_collects_everything() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut work = CollectWork::new();
        {
            let handle = work.handle().unwrap();
            drop(Owned::new(&handle, Tracked(dropped.clone())));
            drop(Owned::new(&handle, Tracked(dropped.clone())));
        }

        work.shutdown();
        assert_eq!(dropped.load(Ordering::SeqCst), 2);
        assert!(work.handle().is_none());
    }
}
