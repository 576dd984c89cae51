//! Reconfigure task: render processed buffers and rebuild convolution kernels
//!
//! One run covers the whole instance:
//!
//! 1. Every file flagged for rendering gets a new processed buffer (trim,
//!    reverse, fades) and fresh thumbnails.
//! 2. Every slot gets a new kernel built from the processed buffer it routes
//!    to: the one rendered in step 1 if its file was re-rendered, otherwise
//!    the one currently published. Slots are independent, so kernels are
//!    built in parallel.
//!
//! Results stay in the work data until the orchestrator publishes them. A
//! failure aborts the run with `NoMemory`; whatever was finished before the
//! failure is still published.

use basedrop::{Handle, Owned, Shared};
use rayon::prelude::*;

use super::{LoadedImpulse, Work};
use crate::dsp::{Convolver, ConvolverError};
use crate::error::{TaskError, TaskResult};
use crate::sample::{render, RenderParams, Sample, Thumbnails};
use crate::types::{NUM_FILES, NUM_SLOTS};

/// Per-file render request
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FileRender {
    pub render: bool,
    pub params: RenderParams,
}

/// Requested source of one slot's kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotRoute {
    /// Source file: 0 = none, 1..=NUM_FILES selects a file
    pub file: usize,
    /// Source channel of that file
    pub track: usize,
    /// FFT rank of the kernel
    pub rank: usize,
}

/// Per-slot phase offsets in `[0, 1)` derived from an instance seed
///
/// The rotated seed picks a starting angle; slots are then spaced by equal
/// steps of `1 / (NUM_SLOTS + 1)` so no two slots do their heavy FFT work on
/// the same audio block.
pub fn phase_offsets(seed: u32) -> [f32; NUM_SLOTS] {
    let phase = seed.rotate_left(16) & 0x7fff_ffff;
    let step = 0x8000_0000u32 / (NUM_SLOTS as u32 + 1);
    std::array::from_fn(|i| {
        let p = phase.wrapping_add(i as u32 * step) & 0x7fff_ffff;
        p as f32 / 0x8000_0000u32 as f32
    })
}

/// Work data of the reconfigure task
pub struct ReconfigureWork {
    files: [FileRender; NUM_FILES],
    slots: [SlotRoute; NUM_SLOTS],
    phases: [f32; NUM_SLOTS],
    sample_rate: u32,
    /// Decoded originals; only ever touched while the task is not running
    originals: [Option<LoadedImpulse>; NUM_FILES],
    /// Snapshot of the published processed buffers
    current: [Option<Shared<Sample>>; NUM_FILES],
    rendered: [Option<Shared<Sample>>; NUM_FILES],
    thumbnails: [Thumbnails; NUM_FILES],
    pending: [Option<Owned<Convolver>>; NUM_SLOTS],
    handle: Handle,
    /// Slot whose kernel build is made to fail
    #[cfg(test)]
    pub(crate) fail_slot: Option<usize>,
}

impl ReconfigureWork {
    pub fn new(sample_rate: u32, phases: [f32; NUM_SLOTS], handle: Handle) -> Self {
        Self {
            files: [FileRender::default(); NUM_FILES],
            slots: [SlotRoute::default(); NUM_SLOTS],
            phases,
            sample_rate,
            originals: std::array::from_fn(|_| None),
            current: std::array::from_fn(|_| None),
            rendered: std::array::from_fn(|_| None),
            thumbnails: std::array::from_fn(|_| Thumbnails::new()),
            pending: std::array::from_fn(|_| None),
            handle,
            #[cfg(test)]
            fail_slot: None,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Inputs (written by the orchestrator before submitting)
    // ─────────────────────────────────────────────────────────────

    /// Install a new original for `file`, returning the displaced one
    pub fn set_original(
        &mut self,
        file: usize,
        original: Option<LoadedImpulse>,
    ) -> Option<LoadedImpulse> {
        std::mem::replace(&mut self.originals[file], original)
    }

    /// Frame count of the original of `file` (0 if none)
    pub fn original_len(&self, file: usize) -> usize {
        self.originals[file]
            .as_ref()
            .map_or(0, |o| o.sample.len())
    }

    pub fn set_file(&mut self, file: usize, request: FileRender) {
        self.files[file] = request;
    }

    pub fn set_route(&mut self, slot: usize, route: SlotRoute) {
        self.slots[slot] = route;
    }

    /// Snapshot the published processed buffer of `file`
    ///
    /// Returns the previous snapshot so the caller decides where it is
    /// released.
    pub fn set_current(
        &mut self,
        file: usize,
        sample: Option<Shared<Sample>>,
    ) -> Option<Shared<Sample>> {
        std::mem::replace(&mut self.current[file], sample)
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    // ─────────────────────────────────────────────────────────────
    // Outputs (taken by the orchestrator after completion)
    // ─────────────────────────────────────────────────────────────

    /// Whether the last run was asked to render `file`
    pub fn rendered_file(&self, file: usize) -> bool {
        self.files[file].render
    }

    /// New processed buffer of `file`, if it was rendered
    pub fn take_rendered(&mut self, file: usize) -> Option<Shared<Sample>> {
        self.rendered[file].take()
    }

    /// Thumbnails rendered for `file`
    ///
    /// The orchestrator swaps these with its display copy so no envelope data
    /// is copied or allocated on the real-time thread.
    pub fn thumbnails_mut(&mut self, file: usize) -> &mut Thumbnails {
        &mut self.thumbnails[file]
    }

    /// New kernel for `slot`; `None` means the slot goes silent
    pub fn take_pending(&mut self, slot: usize) -> Option<Owned<Convolver>> {
        self.pending[slot].take()
    }

    /// Drop every held resource (teardown)
    pub fn clear(&mut self) {
        self.originals = std::array::from_fn(|_| None);
        self.current = std::array::from_fn(|_| None);
        self.rendered = std::array::from_fn(|_| None);
        self.pending = std::array::from_fn(|_| None);
    }

    // ─────────────────────────────────────────────────────────────
    // Task body
    // ─────────────────────────────────────────────────────────────

    fn render_files(&mut self) -> TaskResult {
        for f in 0..NUM_FILES {
            let request = self.files[f];
            if !request.render {
                continue;
            }

            let processed = match &self.originals[f] {
                Some(original) => render(
                    &original.sample,
                    &request.params,
                    original.norm,
                    &mut self.thumbnails[f],
                )?,
                None => {
                    self.thumbnails[f] = Thumbnails::new();
                    Sample::empty(self.sample_rate)
                }
            };

            log::debug!(
                "[RECONFIG] File {}: rendered {} channels, {} frames",
                f,
                processed.channels(),
                processed.len()
            );
            self.rendered[f] = Some(Shared::new(&self.handle, processed));
        }
        Ok(())
    }

    /// Processed buffer of `file` (0-based) that slot routes resolve against
    fn source(&self, index: usize) -> Option<&Sample> {
        let shared = if self.files[index].render {
            self.rendered[index].as_ref()
        } else {
            self.current[index].as_ref()
        };
        shared.map(|s| &**s)
    }

    fn build_kernels(&mut self) -> TaskResult {
        let sources: [Option<&Sample>; NUM_FILES] = std::array::from_fn(|f| self.source(f));
        let slots = self.slots;
        let phases = self.phases;
        #[cfg(test)]
        let fail_slot = self.fail_slot;

        let results: Vec<Result<Option<Convolver>, ConvolverError>> = (0..NUM_SLOTS)
            .into_par_iter()
            .map(|i| {
                let route = slots[i];
                let Some(channel) = route
                    .file
                    .checked_sub(1)
                    .and_then(|f| sources.get(f).copied().flatten())
                    .and_then(|s| s.get_channel(route.track))
                    .filter(|c| !c.is_empty())
                else {
                    return Ok(None);
                };
                #[cfg(test)]
                if fail_slot == Some(i) {
                    return Err(ConvolverError::NoMemory);
                }
                Convolver::new(channel, route.rank, phases[i]).map(Some)
            })
            .collect();

        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(kernel) => {
                    if let Some(ref cv) = kernel {
                        log::debug!(
                            "[RECONFIG] Slot {}: kernel {} frames, block {}",
                            i,
                            cv.len(),
                            cv.block_size()
                        );
                    }
                    self.pending[i] = kernel.map(|cv| Owned::new(&self.handle, cv));
                }
                Err(e) => {
                    log::warn!("[RECONFIG] Slot {}: kernel build failed: {}", i, e);
                    return Err(TaskError::NoMemory("convolution kernel"));
                }
            }
        }
        Ok(())
    }
}

impl Work for ReconfigureWork {
    fn name(&self) -> &'static str {
        "reconfigure"
    }

    fn run(&mut self) -> TaskResult {
        // Results nobody published are stale; release them here, off the audio thread
        self.rendered = std::array::from_fn(|_| None);
        self.pending = std::array::from_fn(|_| None);

        self.render_files()?;
        self.build_kernels()?;

        log::info!(
            "[RECONFIG] Done: {} slots bound",
            self.pending.iter().filter(|p| p.is_some()).count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FFT_RANK_MIN, MESH_SIZE};
    use basedrop::Collector;

    fn loaded(handle: &Handle, channels: usize, len: usize) -> LoadedImpulse {
        let data: Vec<Vec<f32>> = (0..channels)
            .map(|c| (0..len).map(|i| if i == c { 0.5 } else { 0.0 }).collect())
            .collect();
        let sample = Sample::from_channels(data, 1000);
        let norm = sample.norm_factor();
        LoadedImpulse {
            sample: Owned::new(handle, sample),
            norm,
        }
    }

    fn route(file: usize, track: usize) -> SlotRoute {
        SlotRoute {
            file,
            track,
            rank: FFT_RANK_MIN,
        }
    }

    #[test]
    fn test_phase_offsets_are_evenly_spaced() {
        let phases = phase_offsets(0x1234_5678);
        let step = 1.0 / (NUM_SLOTS as f32 + 1.0);
        for p in phases {
            assert!((0.0..1.0).contains(&p));
        }
        for i in 1..NUM_SLOTS {
            let diff = (phases[i] - phases[i - 1]).rem_euclid(1.0);
            assert!((diff - step).abs() < 1e-4, "diff {}", diff);
        }
        assert_eq!(phase_offsets(7), phase_offsets(7));
    }

    #[test]
    fn test_render_and_route() {
        let collector = Collector::new();
        let handle = collector.handle();
        let mut work = ReconfigureWork::new(1000, [0.0; NUM_SLOTS], handle.clone());

        work.set_original(0, Some(loaded(&handle, 2, 100)));
        work.set_file(0, FileRender { render: true, params: RenderParams::default() });
        work.set_route(0, route(1, 0));
        work.set_route(1, route(1, 1));
        work.set_route(2, route(1, 5)); // missing track
        work.set_route(3, route(0, 0)); // no file

        work.run().unwrap();

        let rendered = work.take_rendered(0).unwrap();
        assert_eq!(rendered.len(), 100);
        assert_eq!(work.thumbnails_mut(0).channels(), 2);
        assert_eq!(work.thumbnails_mut(0).track(0).len(), MESH_SIZE);
        // Thumbnails scaled by norm (peak 0.5 → 1.0)
        assert!((work.thumbnails_mut(0).track(0)[0] - 1.0).abs() < 1e-6);

        assert!(work.take_pending(0).is_some());
        assert!(work.take_pending(1).is_some());
        assert!(work.take_pending(2).is_none());
        assert!(work.take_pending(3).is_none());
    }

    #[test]
    fn test_unrendered_file_uses_current() {
        let collector = Collector::new();
        let handle = collector.handle();
        let mut work = ReconfigureWork::new(1000, [0.0; NUM_SLOTS], handle.clone());

        let current = Shared::new(&handle, Sample::from_channels(vec![vec![1.0; 64]], 1000));
        work.set_current(2, Some(current));
        work.set_route(0, route(3, 0));

        work.run().unwrap();
        assert!(work.take_rendered(2).is_none());
        assert!(work.take_pending(0).is_some());
    }

    #[test]
    fn test_fully_trimmed_file_unbinds_slot() {
        let collector = Collector::new();
        let handle = collector.handle();
        let mut work = ReconfigureWork::new(1000, [0.0; NUM_SLOTS], handle.clone());

        work.set_original(0, Some(loaded(&handle, 1, 100)));
        work.set_file(
            0,
            FileRender {
                render: true,
                params: RenderParams {
                    head_cut_ms: 50.0,
                    tail_cut_ms: 50.0,
                    ..Default::default()
                },
            },
        );
        work.set_route(0, route(1, 0));

        work.run().unwrap();
        assert_eq!(work.take_rendered(0).map(|s| s.len()), Some(0));
        assert!(work.take_pending(0).is_none());
    }

    #[test]
    fn test_invalid_rank_fails_but_keeps_earlier_slots() {
        let collector = Collector::new();
        let handle = collector.handle();
        let mut work = ReconfigureWork::new(1000, [0.0; NUM_SLOTS], handle.clone());

        work.set_original(0, Some(loaded(&handle, 1, 100)));
        work.set_file(0, FileRender { render: true, params: RenderParams::default() });
        work.set_route(0, route(1, 0));
        work.set_route(1, SlotRoute { file: 1, track: 0, rank: 3 });
        work.set_route(2, route(1, 0));

        let err = work.run().unwrap_err();
        assert!(matches!(err, TaskError::NoMemory(_)));
        assert!(work.take_pending(0).is_some());
        assert!(work.take_pending(1).is_none());
        assert!(work.take_pending(2).is_none());
        // Rendering finished before the failure and is still published
        assert!(work.take_rendered(0).is_some());
    }

    #[test]
    fn test_missing_original_renders_empty() {
        let collector = Collector::new();
        let handle = collector.handle();
        let mut work = ReconfigureWork::new(1000, [0.0; NUM_SLOTS], handle);
        work.set_file(1, FileRender { render: true, params: RenderParams::default() });
        work.set_route(0, route(2, 0));

        work.run().unwrap();
        let rendered = work.take_rendered(1).unwrap();
        assert!(rendered.is_empty());
        assert_eq!(rendered.channels(), 0);
        assert!(work.take_pending(0).is_none());
    }
}
