//! Real-time orchestrator
//!
//! [`ReverbEngine::process`] runs once per audio block and never blocks,
//! allocates or frees. Each block it:
//!
//! 1. applies queued commands and derives per-slot/per-channel settings
//! 2. drives the loader tasks (only while reconfiguration is idle)
//! 3. drives the reconfigure task (only while every loader is idle) and
//!    publishes its results by swapping handles
//! 4. schedules a collect pass when handles were released
//! 5. starts preview playback for fired listen triggers
//! 6. runs the convolution and mixing path
//! 7. mirrors status, length, activity and thumbnails for the display
//!
//! Rebuilds are tracked with two generation counters: every change that
//! needs new kernels advances `request`; submitting a reconfiguration copies
//! it to `response`. Inequality means work is outstanding.

use std::sync::Arc;

use basedrop::Collector;
use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use super::file::ImpulseFile;
use super::params::{command_channel, CommandSender, ParamCommand, Parameters};
use super::ports::{MeshPort, PathRequest, ReverbAtomics};
use super::slot::{ConvolutionSlot, OutputChannel};
use crate::config::EngineConfig;
use crate::error::LoadStatus;
use crate::task::{
    phase_offsets, CollectWork, Executor, FileRender, LoadWork, ReconfigureWork, Task,
};
use crate::types::{BLOCK_SIZE, NUM_FILES, NUM_OUTPUTS, NUM_SLOTS};

/// Multi-impulse convolution reverb engine
pub struct ReverbEngine {
    sample_rate: u32,
    inputs: usize,
    executor: Arc<dyn Executor>,
    commands: rtrb::Consumer<ParamCommand>,
    params: Parameters,

    files: [ImpulseFile; NUM_FILES],
    slots: [ConvolutionSlot; NUM_SLOTS],
    channels: [OutputChannel; NUM_OUTPUTS],

    loaders: [Task<LoadWork>; NUM_FILES],
    reconfigure: Task<ReconfigureWork>,
    collect: Task<CollectWork>,

    request: u64,
    response: u64,
    /// Handles released on this thread since the last collect pass
    displaced: usize,

    atomics: Arc<ReverbAtomics>,
}

impl ReverbEngine {
    /// Create an engine and the control-side end of its command queue
    ///
    /// Not real-time safe; call from the control thread.
    pub fn new(config: &EngineConfig, executor: Arc<dyn Executor>) -> (Self, CommandSender) {
        let config = config.sanitized();
        let sample_rate = config.sample_rate;

        let mut rng = match config.phase_seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        let phases = phase_offsets(rng.next_u32());

        let collector = Collector::new();
        let handle = collector.handle();

        let (tx, rx) = command_channel(config.command_queue_capacity);
        let sender = CommandSender::new(tx, handle.clone());

        log::info!(
            "[ENGINE] Created: {} Hz, {} input(s), phases {:?}",
            sample_rate,
            config.inputs,
            phases
        );

        let engine = Self {
            sample_rate,
            inputs: config.inputs,
            executor,
            commands: rx,
            params: Parameters::new(config.inputs),
            files: std::array::from_fn(|_| ImpulseFile::new()),
            slots: std::array::from_fn(|_| ConvolutionSlot::new(sample_rate)),
            channels: std::array::from_fn(|_| OutputChannel::new(sample_rate)),
            loaders: std::array::from_fn(|f| {
                Task::new(LoadWork::new(f, sample_rate, handle.clone()))
            }),
            reconfigure: Task::new(ReconfigureWork::new(sample_rate, phases, handle)),
            collect: Task::new(CollectWork::from_collector(collector)),
            request: 0,
            response: u64::MAX,
            displaced: 0,
            atomics: Arc::new(ReverbAtomics::new()),
        };

        (engine, sender)
    }

    // ─────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    /// Current parameters (as applied on the audio thread)
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Direct parameter access for hosts that drive the engine themselves
    pub fn params_mut(&mut self) -> &mut Parameters {
        &mut self.params
    }

    /// Shared lock-free state for display threads
    pub fn atomics(&self) -> Arc<ReverbAtomics> {
        Arc::clone(&self.atomics)
    }

    pub fn file_status(&self, file: usize) -> LoadStatus {
        self.files[file].status
    }

    /// Length of the original of `file` in milliseconds
    pub fn file_length_ms(&self, file: usize) -> f32 {
        self.files[file].length_ms(self.sample_rate)
    }

    pub fn slot_active(&self, slot: usize) -> bool {
        self.slots[slot].is_active()
    }

    pub fn mesh(&self, file: usize) -> &MeshPort {
        &self.files[file].mesh
    }

    pub fn mesh_mut(&mut self, file: usize) -> &mut MeshPort {
        &mut self.files[file].mesh
    }

    /// A display attached: resend every file's thumbnails
    pub fn ui_activated(&mut self) {
        for file in self.files.iter_mut() {
            file.sync = true;
        }
    }

    /// No load or rebuild is queued, running or waiting to be published
    pub fn is_settled(&self) -> bool {
        self.request == self.response
            && self.reconfigure.idle()
            && self
                .files
                .iter()
                .zip(self.loaders.iter())
                .all(|(file, loader)| {
                    loader.idle() && !file.path.is_pending() && !file.path.accepted()
                })
    }

    // ─────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────

    /// Switch the processing rate (not real-time safe)
    ///
    /// Delay lines, bypass ramps and equalizers are re-initialised, and every
    /// file with a path is loaded again so its original matches the new rate.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate == 0 || sample_rate == self.sample_rate {
            return;
        }
        log::info!(
            "[ENGINE] Sample rate {} -> {} Hz",
            self.sample_rate,
            sample_rate
        );
        self.sample_rate = sample_rate;

        for slot in self.slots.iter_mut() {
            slot.set_sample_rate(sample_rate);
        }
        for channel in self.channels.iter_mut() {
            channel.set_sample_rate(sample_rate);
        }
        for (file, loader) in self.files.iter_mut().zip(self.loaders.iter()) {
            let has_path = file.path.accepted() || loader.work().is_some_and(LoadWork::has_path);
            if has_path {
                file.path.request_reload();
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Block processing
    // ─────────────────────────────────────────────────────────────

    /// Process one block
    ///
    /// `inputs` holds one slice per input channel (extra channels beyond the
    /// configured count are ignored). Frames beyond the shortest slice are
    /// left untouched.
    pub fn process(&mut self, inputs: &[&[f32]], left: &mut [f32], right: &mut [f32]) {
        let inputs = &inputs[..inputs.len().min(self.inputs)];

        self.process_commands();
        self.update_settings();
        self.process_loading();
        self.process_configuration();
        self.process_gc();
        self.process_listen();

        let frames = inputs
            .iter()
            .map(|i| i.len())
            .chain([left.len(), right.len()])
            .min()
            .unwrap_or(0);
        if inputs.is_empty() {
            left.fill(0.0);
            right.fill(0.0);
        } else {
            self.process_audio(inputs, &mut left[..frames], &mut right[..frames]);
        }

        self.publish();
    }

    fn process_commands(&mut self) {
        while let Ok(cmd) = self.commands.pop() {
            let Some((file, path)) = self.params.apply(cmd) else {
                continue;
            };
            match self.files.get_mut(file) {
                Some(f) => {
                    if f.path.submit(path) {
                        self.displaced += 1;
                    }
                }
                None => {
                    if path.is_some() {
                        self.displaced += 1;
                    }
                }
            }
        }
    }

    fn update_settings(&mut self) {
        for (file, params) in self.files.iter_mut().zip(self.params.files.iter()) {
            if file.update(params) {
                self.request = self.request.wrapping_add(1);
            }
        }
        for (f, file) in self.files.iter_mut().enumerate() {
            file.listen.submit(self.params.listen[f]);
        }

        for (slot, params) in self.slots.iter_mut().zip(self.params.slots.iter()) {
            if slot.update(params, &self.params, self.inputs, self.sample_rate) {
                self.request = self.request.wrapping_add(1);
            }
        }
        for (j, channel) in self.channels.iter_mut().enumerate() {
            channel.update(j, &self.params, self.inputs);
        }
    }

    fn process_loading(&mut self) {
        if !self.reconfigure.idle() {
            return;
        }

        for f in 0..NUM_FILES {
            let file = &mut self.files[f];
            let loader = &mut self.loaders[f];

            if file.path.is_pending() && loader.idle() {
                let Some(work) = loader.work_mut() else {
                    continue;
                };
                if let Some(PathRequest::Load(path)) = file.path.take() {
                    if work.set_path(path).is_some() {
                        self.displaced += 1;
                    }
                }
                work.set_sample_rate(self.sample_rate);

                if loader.submit(self.executor.as_ref()) {
                    file.status = LoadStatus::Loading;
                    file.path.accept();
                } else {
                    // Path already moved into the work; retry it next block
                    file.path.request_reload();
                }
            } else if file.path.accepted() && loader.completed() {
                let status = loader.status();
                let loaded = loader.work_mut().and_then(LoadWork::take_loaded);

                if let Some(work) = self.reconfigure.work_mut() {
                    let replaced = match (status, loaded) {
                        (LoadStatus::Ok, Some(loaded)) => {
                            file.original_len = loaded.sample.len();
                            Some(work.set_original(f, Some(loaded)))
                        }
                        (LoadStatus::Unspecified, _) => {
                            file.original_len = 0;
                            Some(work.set_original(f, None))
                        }
                        // Failed load: the previous original stays
                        _ => None,
                    };
                    if replaced.flatten().is_some() {
                        self.displaced += 1;
                    }
                }

                file.status = status;
                file.render = true;
                self.request = self.request.wrapping_add(1);
                file.path.commit();
                loader.reset();
            }
        }
    }

    fn process_configuration(&mut self) {
        if !self.loaders.iter().all(Task::idle) {
            return;
        }

        if self.reconfigure.idle() {
            if self.request == self.response {
                return;
            }
            let Some(work) = self.reconfigure.work_mut() else {
                return;
            };

            for (f, file) in self.files.iter().enumerate() {
                work.set_file(
                    f,
                    FileRender {
                        render: file.render,
                        params: *file.params(),
                    },
                );
                if work.set_current(f, file.processed.clone()).is_some() {
                    self.displaced += 1;
                }
            }
            for (s, slot) in self.slots.iter().enumerate() {
                work.set_route(s, slot.route());
            }
            work.set_sample_rate(self.sample_rate);

            if self.reconfigure.submit(self.executor.as_ref()) {
                self.response = self.request;
                for file in self.files.iter_mut() {
                    file.render = false;
                }
            }
        } else if self.reconfigure.completed() {
            let Some(work) = self.reconfigure.work_mut() else {
                return;
            };

            for (f, file) in self.files.iter_mut().enumerate() {
                if work.rendered_file(f) {
                    if let Some(rendered) = work.take_rendered(f) {
                        std::mem::swap(&mut file.thumbnails, work.thumbnails_mut(f));
                        for channel in self.channels.iter_mut() {
                            channel.player.bind(f, Some(rendered.clone()));
                        }
                        if file.processed.replace(rendered).is_some() {
                            self.displaced += 1;
                        }
                        file.sync = true;
                    }
                }
                if work.set_current(f, None).is_some() {
                    self.displaced += 1;
                }
            }

            // Slots without a new kernel go silent, even after a failed run
            for (s, slot) in self.slots.iter_mut().enumerate() {
                if slot.swap(work.take_pending(s)) {
                    self.displaced += 1;
                }
            }

            self.reconfigure.reset();
        }
    }

    fn process_gc(&mut self) {
        if self.collect.completed() {
            self.collect.reset();
        }
        if !self.collect.idle() {
            return;
        }

        for channel in self.channels.iter_mut() {
            self.displaced += channel.player.take_released();
        }
        if self.displaced > 0 && self.collect.submit(self.executor.as_ref()) {
            self.displaced = 0;
        }
    }

    fn process_listen(&mut self) {
        for (f, file) in self.files.iter_mut().enumerate() {
            if !file.listen.is_pending() {
                continue;
            }
            let channels = file.processed_channels();
            if channels > 0 {
                for (j, channel) in self.channels.iter_mut().enumerate() {
                    channel.player.play(f, j % channels, 1.0, 0);
                }
            }
            file.listen.commit();
        }
    }

    fn process_audio(&mut self, inputs: &[&[f32]], left: &mut [f32], right: &mut [f32]) {
        let frames = left.len();
        let n = inputs.len();
        let mut offset = 0;

        while offset < frames {
            let count = (frames - offset).min(BLOCK_SIZE);

            {
                let [wet_l, wet_r] = &mut self.channels;
                let wet_l = &mut wet_l.buffer[..count];
                let wet_r = &mut wet_r.buffer[..count];
                wet_l.fill(0.0);
                wet_r.fill(0.0);
                for slot in self.slots.iter_mut() {
                    slot.process(inputs, offset, wet_l, wet_r);
                }
            }

            let outs: [&mut [f32]; NUM_OUTPUTS] = [
                &mut left[offset..offset + count],
                &mut right[offset..offset + count],
            ];
            for (j, (channel, out)) in self.channels.iter_mut().zip(outs).enumerate() {
                let dry = &inputs[j % n][offset..offset + count];
                channel.process(inputs, offset, dry, out);
            }

            offset += count;
        }
    }

    fn publish(&mut self) {
        for (f, file) in self.files.iter_mut().enumerate() {
            self.atomics
                .store_file(f, file.status, file.length_ms(self.sample_rate));
            file.sync_mesh();
        }
        for (s, slot) in self.slots.iter().enumerate() {
            self.atomics.store_slot(s, slot.is_active());
        }
    }
}

impl Drop for ReverbEngine {
    fn drop(&mut self) {
        let executor = Arc::clone(&self.executor);

        // Outstanding work must finish before its data can be released
        for loader in self.loaders.iter() {
            loader.join(executor.as_ref());
        }
        self.reconfigure.join(executor.as_ref());
        self.collect.join(executor.as_ref());

        while self.commands.pop().is_ok() {}

        for file in self.files.iter_mut() {
            file.clear();
        }
        for slot in self.slots.iter_mut() {
            slot.clear();
        }
        for channel in self.channels.iter_mut() {
            channel.clear();
        }
        for loader in self.loaders.iter_mut() {
            if let Some(work) = loader.work_mut() {
                work.clear();
            }
        }
        if let Some(work) = self.reconfigure.work_mut() {
            work.clear();
        }
        if let Some(work) = self.collect.work_mut() {
            work.shutdown();
        }

        log::info!("[ENGINE] Shut down");
    }
}
