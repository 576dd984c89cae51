//! Loader task: decode an impulse file into a new original sample

use std::path::PathBuf;

use basedrop::{Handle, Owned};

use super::Work;
use crate::error::{TaskError, TaskResult};
use crate::sample::Sample;
use crate::types::CONV_LENGTH_MAX_MS;

/// Decoded, resampled impulse ready to become a file's original
pub struct LoadedImpulse {
    pub sample: Owned<Sample>,
    /// Peak normalization factor of `sample`
    pub norm: f32,
}

/// Work data of one file's loader
///
/// The orchestrator moves the requested path and the processing rate in
/// before submitting and takes `loaded` out once the task has completed.
pub struct LoadWork {
    file: usize,
    path: Option<Owned<PathBuf>>,
    sample_rate: u32,
    loaded: Option<LoadedImpulse>,
    handle: Handle,
}

impl LoadWork {
    pub fn new(file: usize, sample_rate: u32, handle: Handle) -> Self {
        Self {
            file,
            path: None,
            sample_rate,
            loaded: None,
            handle,
        }
    }

    /// Replace the path to load, returning the previous one
    ///
    /// `None` (or an empty path) makes the next run report `Unspecified`.
    pub fn set_path(&mut self, path: Option<Owned<PathBuf>>) -> Option<Owned<PathBuf>> {
        std::mem::replace(&mut self.path, path)
    }

    /// Path the next run will load
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_deref()
    }

    /// Whether a non-empty path is set
    pub fn has_path(&self) -> bool {
        self.path().is_some_and(|p| !p.as_os_str().is_empty())
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    /// Take the result of the last successful run
    pub fn take_loaded(&mut self) -> Option<LoadedImpulse> {
        self.loaded.take()
    }

    /// Drop every held resource (teardown)
    pub fn clear(&mut self) {
        self.path = None;
        self.loaded = None;
    }
}

impl Work for LoadWork {
    fn name(&self) -> &'static str {
        "load"
    }

    fn run(&mut self) -> TaskResult {
        // A result nobody collected is stale by now
        self.loaded = None;

        let path = match self.path.as_deref() {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => return Err(TaskError::Unspecified),
        };

        log::info!("[LOAD] File {}: loading {:?}", self.file, path);
        let sample = Sample::load(path, CONV_LENGTH_MAX_MS)?.resample(self.sample_rate)?;
        let norm = sample.norm_factor();

        log::info!(
            "[LOAD] File {}: {} channels, {:.1} ms, norm {:.3}",
            self.file,
            sample.channels(),
            sample.duration_ms(),
            norm
        );

        self.loaded = Some(LoadedImpulse {
            sample: Owned::new(&self.handle, sample),
            norm,
        });
        Ok(())
    }
}
