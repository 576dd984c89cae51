//! User parameters and the control → audio command queue
//!
//! [`Parameters`] is the audio thread's copy of every user control. Control
//! threads never touch it directly; they push [`ParamCommand`]s through a
//! lock-free SPSC ring buffer (via [`CommandSender`]) and the engine applies
//! them at the start of each block.
//!
//! File paths travel as `basedrop::Owned<PathBuf>` so the allocation happens
//! on the sending thread and the release is deferred to the collector.

use std::path::PathBuf;

use basedrop::{Handle, Owned};
use serde::{Deserialize, Serialize};

use crate::dsp::EqSettings;
use crate::sample::RenderParams;
use crate::types::{FFT_RANK_DEFAULT, NUM_FILES, NUM_SLOTS};

/// Routing and mixing controls of one convolution slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotParams {
    /// Source file: 0 = none, 1..=NUM_FILES
    pub file: usize,
    /// Source channel of that file
    pub track: usize,
    /// Linear makeup gain
    pub makeup: f32,
    pub mute: bool,
    /// Per-slot pre-delay (ms), added to the global one
    pub predelay_ms: f32,
    /// Input balance for stereo input (-100 = left, +100 = right)
    pub pan_in: f32,
    /// Output balance (-100 = left, +100 = right)
    pub pan_out: f32,
}

impl Default for SlotParams {
    fn default() -> Self {
        Self {
            file: 0,
            track: 0,
            makeup: 1.0,
            mute: false,
            predelay_ms: 0.0,
            pan_in: 0.0,
            pan_out: 0.0,
        }
    }
}

impl SlotParams {
    /// Factory routing: two files split across left and right
    pub fn preset(slot: usize) -> Self {
        let pan = if slot % 2 == 0 { -100.0 } else { 100.0 };
        let pan_in = if slot < NUM_SLOTS / 2 { -100.0 } else { 100.0 };
        Self {
            file: slot / 2 + 1,
            track: slot % 2,
            pan_in,
            pan_out: pan,
            ..Default::default()
        }
    }
}

/// Complete control state applied on the audio thread
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub bypass: bool,
    /// FFT size selector (0..FFT_RANK_STEPS)
    pub fft_size: usize,
    /// Global pre-delay (ms)
    pub predelay_ms: f32,
    /// Dry balance per input (-100..=100)
    pub input_pan: [f32; 2],
    pub dry_gain: f32,
    pub wet_gain: f32,
    pub output_gain: f32,
    pub files: [RenderParams; NUM_FILES],
    /// Listen trigger level per file
    pub listen: [bool; NUM_FILES],
    pub slots: [SlotParams; NUM_SLOTS],
    /// Wet post-processing (equalizer) switch
    pub wet_eq: bool,
    pub eq: EqSettings,
}

impl Parameters {
    /// Defaults for an engine with `inputs` input channels
    pub fn new(inputs: usize) -> Self {
        let input_pan = if inputs >= 2 { [-100.0, 100.0] } else { [0.0, 0.0] };
        Self {
            bypass: false,
            fft_size: FFT_RANK_DEFAULT,
            predelay_ms: 0.0,
            input_pan,
            dry_gain: 1.0,
            wet_gain: 1.0,
            output_gain: 1.0,
            files: [RenderParams::default(); NUM_FILES],
            listen: [false; NUM_FILES],
            slots: std::array::from_fn(SlotParams::preset),
            wet_eq: false,
            eq: EqSettings::default(),
        }
    }

    /// Apply a command; index out of range is ignored
    ///
    /// `SetFilePath` is not a parameter and is handed back to the caller.
    pub fn apply(&mut self, cmd: ParamCommand) -> Option<(usize, Option<Owned<PathBuf>>)> {
        match cmd {
            ParamCommand::SetBypass(on) => self.bypass = on,
            ParamCommand::SetFftSize(size) => self.fft_size = size,
            ParamCommand::SetPredelay(ms) => self.predelay_ms = ms,
            ParamCommand::SetInputPan { input, pan } => {
                if let Some(p) = self.input_pan.get_mut(input) {
                    *p = pan;
                }
            }
            ParamCommand::SetDryGain(gain) => self.dry_gain = gain,
            ParamCommand::SetWetGain(gain) => self.wet_gain = gain,
            ParamCommand::SetOutputGain(gain) => self.output_gain = gain,

            ParamCommand::SetFilePath { file, path } => return Some((file, path)),
            ParamCommand::SetHeadCut { file, ms } => self.with_file(file, |f| f.head_cut_ms = ms),
            ParamCommand::SetTailCut { file, ms } => self.with_file(file, |f| f.tail_cut_ms = ms),
            ParamCommand::SetFadeIn { file, ms } => self.with_file(file, |f| f.fade_in_ms = ms),
            ParamCommand::SetFadeOut { file, ms } => self.with_file(file, |f| f.fade_out_ms = ms),
            ParamCommand::SetReverse { file, reverse } => {
                self.with_file(file, |f| f.reverse = reverse)
            }
            ParamCommand::SetListen { file, on } => {
                if let Some(l) = self.listen.get_mut(file) {
                    *l = on;
                }
            }

            ParamCommand::SetSlotFile { slot, file } => self.with_slot(slot, |s| s.file = file),
            ParamCommand::SetSlotTrack { slot, track } => self.with_slot(slot, |s| s.track = track),
            ParamCommand::SetSlotMakeup { slot, gain } => self.with_slot(slot, |s| s.makeup = gain),
            ParamCommand::SetSlotMute { slot, mute } => self.with_slot(slot, |s| s.mute = mute),
            ParamCommand::SetSlotPredelay { slot, ms } => {
                self.with_slot(slot, |s| s.predelay_ms = ms)
            }
            ParamCommand::SetSlotPanIn { slot, pan } => self.with_slot(slot, |s| s.pan_in = pan),
            ParamCommand::SetSlotPanOut { slot, pan } => self.with_slot(slot, |s| s.pan_out = pan),

            ParamCommand::SetWetEq(on) => self.wet_eq = on,
            ParamCommand::SetEqBand { band, gain } => {
                if let Some(g) = self.eq.band_gains.get_mut(band) {
                    *g = gain;
                }
            }
            ParamCommand::SetLowCut { slope, freq } => {
                self.eq.low_cut_slope = slope;
                self.eq.low_cut_freq = freq;
            }
            ParamCommand::SetHighCut { slope, freq } => {
                self.eq.high_cut_slope = slope;
                self.eq.high_cut_freq = freq;
            }
        }
        None
    }

    fn with_file(&mut self, file: usize, f: impl FnOnce(&mut RenderParams)) {
        if let Some(params) = self.files.get_mut(file) {
            f(params);
        }
    }

    fn with_slot(&mut self, slot: usize, f: impl FnOnce(&mut SlotParams)) {
        if let Some(params) = self.slots.get_mut(slot) {
            f(params);
        }
    }
}

/// Commands sent from control threads to the audio thread
///
/// Kept small: large settings are split into per-field commands so the ring
/// buffer stays cache friendly.
pub enum ParamCommand {
    // ─────────────────────────────────────────────────────────────
    // Global
    // ─────────────────────────────────────────────────────────────
    SetBypass(bool),
    SetFftSize(usize),
    SetPredelay(f32),
    SetInputPan { input: usize, pan: f32 },
    SetDryGain(f32),
    SetWetGain(f32),
    SetOutputGain(f32),

    // ─────────────────────────────────────────────────────────────
    // Impulse files
    // ─────────────────────────────────────────────────────────────
    /// Request a (re)load; `None` unloads the file
    SetFilePath {
        file: usize,
        path: Option<Owned<PathBuf>>,
    },
    SetHeadCut { file: usize, ms: f32 },
    SetTailCut { file: usize, ms: f32 },
    SetFadeIn { file: usize, ms: f32 },
    SetFadeOut { file: usize, ms: f32 },
    SetReverse { file: usize, reverse: bool },
    /// Listen trigger level; a rising edge starts preview playback
    SetListen { file: usize, on: bool },

    // ─────────────────────────────────────────────────────────────
    // Convolution slots
    // ─────────────────────────────────────────────────────────────
    SetSlotFile { slot: usize, file: usize },
    SetSlotTrack { slot: usize, track: usize },
    SetSlotMakeup { slot: usize, gain: f32 },
    SetSlotMute { slot: usize, mute: bool },
    SetSlotPredelay { slot: usize, ms: f32 },
    SetSlotPanIn { slot: usize, pan: f32 },
    SetSlotPanOut { slot: usize, pan: f32 },

    // ─────────────────────────────────────────────────────────────
    // Wet equalizer
    // ─────────────────────────────────────────────────────────────
    SetWetEq(bool),
    SetEqBand { band: usize, gain: f32 },
    SetLowCut { slope: usize, freq: f32 },
    SetHighCut { slope: usize, freq: f32 },
}

/// Create the command queue
pub fn command_channel(
    capacity: usize,
) -> (rtrb::Producer<ParamCommand>, rtrb::Consumer<ParamCommand>) {
    rtrb::RingBuffer::new(capacity.max(1))
}

/// Control-side end of the command queue
///
/// Holds a collector handle so path requests are allocated here, never on the
/// audio thread.
pub struct CommandSender {
    tx: rtrb::Producer<ParamCommand>,
    handle: Handle,
}

impl CommandSender {
    pub fn new(tx: rtrb::Producer<ParamCommand>, handle: Handle) -> Self {
        Self { tx, handle }
    }

    /// Queue a command; gives it back if the queue is full
    pub fn send(&mut self, cmd: ParamCommand) -> Result<(), ParamCommand> {
        self.tx.push(cmd).map_err(|e| match e {
            rtrb::PushError::Full(cmd) => cmd,
        })
    }

    /// Request loading `path` into `file` (`None` unloads it)
    pub fn set_file_path(&mut self, file: usize, path: Option<PathBuf>) -> bool {
        let path = path.map(|p| Owned::new(&self.handle, p));
        self.send(ParamCommand::SetFilePath { file, path }).is_ok()
    }

    /// Free slots in the queue
    pub fn available(&self) -> usize {
        self.tx.slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Collector;

    #[test]
    fn test_slot_presets() {
        let slots: [SlotParams; NUM_SLOTS] = std::array::from_fn(SlotParams::preset);
        let routes: Vec<_> = slots.iter().map(|s| (s.file, s.track, s.pan_out)).collect();
        assert_eq!(
            routes,
            vec![(1, 0, -100.0), (1, 1, 100.0), (2, 0, -100.0), (2, 1, 100.0)]
        );
        let pans: Vec<_> = slots.iter().map(|s| s.pan_in).collect();
        assert_eq!(pans, vec![-100.0, -100.0, 100.0, 100.0]);
    }

    #[test]
    fn test_input_pan_defaults() {
        assert_eq!(Parameters::new(1).input_pan, [0.0, 0.0]);
        assert_eq!(Parameters::new(2).input_pan, [-100.0, 100.0]);
    }

    #[test]
    fn test_apply_ignores_out_of_range() {
        let mut params = Parameters::new(2);
        let before = params.clone();
        params.apply(ParamCommand::SetHeadCut { file: NUM_FILES, ms: 10.0 });
        params.apply(ParamCommand::SetSlotMute { slot: NUM_SLOTS, mute: true });
        params.apply(ParamCommand::SetEqBand { band: 99, gain: 2.0 });
        assert_eq!(params, before);

        params.apply(ParamCommand::SetTailCut { file: 2, ms: 5.0 });
        params.apply(ParamCommand::SetSlotMute { slot: 1, mute: true });
        assert_eq!(params.files[2].tail_cut_ms, 5.0);
        assert!(params.slots[1].mute);
    }

    #[test]
    fn test_sender_builds_path_off_thread() {
        let collector = Collector::new();
        let (tx, mut rx) = command_channel(2);
        let mut sender = CommandSender::new(tx, collector.handle());

        assert!(sender.set_file_path(1, Some(PathBuf::from("/tmp/ir.wav"))));
        assert!(sender.send(ParamCommand::SetBypass(true)).is_ok());
        assert!(sender.send(ParamCommand::SetBypass(false)).is_err());
        assert_eq!(sender.available(), 0);

        let mut params = Parameters::new(2);
        let cmd = rx.pop().unwrap();
        let (file, path) = params.apply(cmd).unwrap();
        assert_eq!(file, 1);
        assert_eq!(path.as_deref(), Some(&PathBuf::from("/tmp/ir.wav")));
    }

    #[test]
    fn test_command_size() {
        let size = std::mem::size_of::<ParamCommand>();
        assert!(size <= 24, "ParamCommand is {} bytes, expected <= 24", size);
    }
}
