//! Offline render jobs for the `ir-render` tool
//!
//! A job names the dry input, the output file, up to four impulse files with
//! their trim/fade settings, and the mixing controls. Anything omitted takes
//! the engine's defaults.
//!
//! ```yaml
//! input: dry.wav
//! output: wet.wav
//! files:
//!   - path: hall.wav
//!     head_cut_ms: 5.0
//!     fade_out_ms: 200.0
//! wet_gain: 0.5
//! tail_ms: 3000.0
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::EngineConfig;
use crate::dsp::EqSettings;
use crate::engine::{Parameters, SlotParams};
use crate::sample::RenderParams;
use crate::types::{FFT_RANK_DEFAULT, NUM_FILES, NUM_SLOTS};

/// One impulse file of a render job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpulseFileConfig {
    pub path: PathBuf,
    #[serde(flatten)]
    pub params: RenderParams,
}

/// Complete offline render description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderJob {
    /// Engine settings; `None` uses the engine settings file. The sample
    /// rate and input count always follow the input file.
    pub engine: Option<EngineConfig>,
    pub input: PathBuf,
    pub output: PathBuf,
    /// Impulse files in order (file 1 first); at most four are used
    pub files: Vec<ImpulseFileConfig>,
    /// Slot routing; missing entries keep the factory routing
    pub slots: Vec<SlotParams>,
    pub fft_size: usize,
    pub predelay_ms: f32,
    pub dry_gain: f32,
    pub wet_gain: f32,
    pub output_gain: f32,
    pub wet_eq: bool,
    pub eq: EqSettings,
    /// Silence appended after the input so the reverb tail is rendered
    pub tail_ms: f32,
}

impl Default for RenderJob {
    fn default() -> Self {
        Self {
            engine: None,
            input: PathBuf::new(),
            output: PathBuf::new(),
            files: Vec::new(),
            slots: Vec::new(),
            fft_size: FFT_RANK_DEFAULT,
            predelay_ms: 0.0,
            dry_gain: 1.0,
            wet_gain: 1.0,
            output_gain: 1.0,
            wet_eq: false,
            eq: EqSettings::default(),
            tail_ms: 2000.0,
        }
    }
}

impl RenderJob {
    /// Write the job's controls into `params`
    pub fn apply(&self, params: &mut Parameters) {
        if self.files.len() > NUM_FILES {
            log::warn!(
                "[CONFIG] Render job lists {} files, only the first {} are used",
                self.files.len(),
                NUM_FILES
            );
        }
        if self.slots.len() > NUM_SLOTS {
            log::warn!(
                "[CONFIG] Render job lists {} slots, only the first {} are used",
                self.slots.len(),
                NUM_SLOTS
            );
        }

        for (dst, file) in params.files.iter_mut().zip(self.files.iter()) {
            *dst = file.params;
        }
        for (dst, slot) in params.slots.iter_mut().zip(self.slots.iter()) {
            *dst = *slot;
        }
        params.fft_size = self.fft_size;
        params.predelay_ms = self.predelay_ms;
        params.dry_gain = self.dry_gain;
        params.wet_gain = self.wet_gain;
        params.output_gain = self.output_gain;
        params.wet_eq = self.wet_eq;
        params.eq = self.eq;
    }

    /// Impulse paths to load, indexed by file
    pub fn file_paths(&self) -> impl Iterator<Item = (usize, &PathBuf)> {
        self.files
            .iter()
            .take(NUM_FILES)
            .enumerate()
            .map(|(i, f)| (i, &f.path))
            .filter(|(_, p)| !p.as_os_str().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_job_uses_defaults() {
        let yaml = "input: dry.wav\noutput: wet.wav\nfiles:\n  - path: hall.wav\n    head_cut_ms: 5.0\n";
        let job: RenderJob = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(job.input, PathBuf::from("dry.wav"));
        assert_eq!(job.files.len(), 1);
        assert_eq!(job.files[0].params.head_cut_ms, 5.0);
        assert!(!job.files[0].params.reverse);
        assert_eq!(job.fft_size, FFT_RANK_DEFAULT);
        assert!(job.engine.is_none());
    }

    #[test]
    fn test_apply_keeps_factory_routing_for_missing_slots() {
        let job = RenderJob {
            slots: vec![SlotParams {
                file: 3,
                mute: true,
                ..Default::default()
            }],
            wet_gain: 0.25,
            ..Default::default()
        };
        let mut params = Parameters::new(2);
        job.apply(&mut params);

        assert_eq!(params.slots[0].file, 3);
        assert!(params.slots[0].mute);
        assert_eq!(params.slots[1], SlotParams::preset(1));
        assert_eq!(params.wet_gain, 0.25);
    }

    #[test]
    fn test_file_paths_skip_empty_entries() {
        let job = RenderJob {
            files: vec![
                ImpulseFileConfig::default(),
                ImpulseFileConfig {
                    path: PathBuf::from("b.wav"),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let paths: Vec<_> = job.file_paths().collect();
        assert_eq!(paths, vec![(1, &PathBuf::from("b.wav"))]);
    }
}
