//! Engine construction settings
//!
//! These are the settings fixed at engine construction time: processing rate,
//! input layout, worker pool sizing and queue capacities. Everything the user
//! tweaks while audio runs lives in [`crate::engine::Parameters`] instead.

use serde::{Deserialize, Serialize};

use crate::types::{NUM_FILES, SAMPLE_RATE};

/// Engine construction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Processing sample rate in Hz
    /// Default: 48000
    pub sample_rate: u32,

    /// Number of audio inputs (1 = mono, 2 = stereo)
    /// Default: 2
    pub inputs: usize,

    /// Worker threads running loader, reconfigure and collect tasks
    /// Default: 2
    pub worker_threads: usize,

    /// Maximum number of tasks queued on the worker pool
    /// Submissions beyond this are refused and retried on a later block.
    /// Default: 16
    pub task_queue_capacity: usize,

    /// Capacity of the control → audio command queue
    /// Default: 256
    pub command_queue_capacity: usize,

    /// Seed for the per-instance convolution phase
    /// `None` draws a fresh seed from the OS at construction.
    pub phase_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            inputs: 2,
            worker_threads: 2,
            task_queue_capacity: 16,
            command_queue_capacity: 256,
            phase_seed: None,
        }
    }
}

impl EngineConfig {
    /// Return a copy with every field forced into its usable range
    ///
    /// Hand-edited files can contain zeros or out-of-range values; rather than
    /// refusing to start, the engine clamps them and logs what changed.
    pub fn sanitized(&self) -> Self {
        let mut config = self.clone();

        if config.sample_rate == 0 {
            log::warn!("[CONFIG] sample_rate 0 is invalid, using {}", SAMPLE_RATE);
            config.sample_rate = SAMPLE_RATE;
        }
        if !(1..=2).contains(&config.inputs) {
            log::warn!("[CONFIG] inputs {} out of range, clamping to 1..=2", config.inputs);
            config.inputs = config.inputs.clamp(1, 2);
        }
        config.worker_threads = config.worker_threads.max(1);
        // Every loader plus reconfigure and collect may be queued at once
        config.task_queue_capacity = config.task_queue_capacity.max(NUM_FILES + 2);
        config.command_queue_capacity = config.command_queue_capacity.max(1);

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config, save_config};

    #[test]
    fn test_defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config, config.sanitized());
    }

    #[test]
    fn test_sanitize_clamps_out_of_range() {
        let config = EngineConfig {
            sample_rate: 0,
            inputs: 5,
            worker_threads: 0,
            task_queue_capacity: 1,
            command_queue_capacity: 0,
            phase_seed: Some(7),
        }
        .sanitized();

        assert_eq!(config.sample_rate, SAMPLE_RATE);
        assert_eq!(config.inputs, 2);
        assert_eq!(config.worker_threads, 1);
        assert_eq!(config.task_queue_capacity, NUM_FILES + 2);
        assert_eq!(config.command_queue_capacity, 1);
        assert_eq!(config.phase_seed, Some(7));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: EngineConfig = serde_yaml::from_str("sample_rate: 44100\ninputs: 1\n").unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.inputs, 1);
        assert_eq!(config.worker_threads, EngineConfig::default().worker_threads);
        assert_eq!(config.phase_seed, None);
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        let config = EngineConfig {
            phase_seed: Some(0xdead_beef),
            ..Default::default()
        };

        save_config(&config, &path).unwrap();
        let loaded: EngineConfig = load_config(&path);
        assert_eq!(loaded, config);
    }
}
