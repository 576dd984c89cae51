//! Impulse response sample storage
//!
//! A [`Sample`] is a planar multi-channel buffer. The loader decodes files
//! into one ([`decode`]), the reconfigure task derives trimmed, faded and
//! reversed copies of it ([`render`]) together with their waveform
//! [`Thumbnails`].
//!
//! Samples never change after they are built. Published samples are wrapped
//! in `basedrop::Shared` so the real-time thread can hold and release them
//! without ever running their destructor itself.

mod decode;
mod render;

pub use render::{render, trimmed_length, RenderParams, Thumbnails};

use crate::error::TaskError;

/// Planar multi-channel audio buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    channels: Vec<Vec<f32>>,
    length: usize,
    sample_rate: u32,
}

impl Sample {
    /// Empty sample with no channels
    pub fn empty(sample_rate: u32) -> Self {
        Self {
            channels: Vec::new(),
            length: 0,
            sample_rate,
        }
    }

    /// Allocate a zeroed sample, reporting allocation failure instead of aborting
    pub fn try_with_length(
        channels: usize,
        length: usize,
        sample_rate: u32,
    ) -> Result<Self, TaskError> {
        let mut data = Vec::new();
        data.try_reserve_exact(channels)
            .map_err(|_| TaskError::NoMemory("sample"))?;
        for _ in 0..channels {
            let mut channel = Vec::new();
            channel
                .try_reserve_exact(length)
                .map_err(|_| TaskError::NoMemory("sample"))?;
            channel.resize(length, 0.0);
            data.push(channel);
        }

        Ok(Self {
            channels: data,
            length,
            sample_rate,
        })
    }

    /// Build a sample from planar channel data
    ///
    /// Channels are truncated to the shortest one so every channel has the
    /// same length.
    pub fn from_channels(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let length = channels.iter().map(Vec::len).min().unwrap_or(0);
        for channel in channels.iter_mut() {
            channel.truncate(length);
        }
        Self {
            channels,
            length,
            sample_rate,
        }
    }

    /// Number of channels (tracks)
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel data; panics if `index >= channels()`
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    /// Channel data if the channel exists
    #[inline]
    pub fn get_channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Duration in milliseconds at the sample's own rate
    pub fn duration_ms(&self) -> f32 {
        crate::types::samples_to_millis(self.sample_rate, self.length)
    }

    /// Peak absolute value across all channels
    pub fn abs_max(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0f32, |peak, &s| peak.max(s.abs()))
    }

    /// Peak normalization factor: reciprocal of the peak, or 1 for silence
    pub fn norm_factor(&self) -> f32 {
        let peak = self.abs_max();
        if peak > 0.0 {
            1.0 / peak
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_channels_truncates_to_shortest() {
        let sample = Sample::from_channels(vec![vec![1.0; 10], vec![0.5; 7]], 48000);
        assert_eq!(sample.channels(), 2);
        assert_eq!(sample.len(), 7);
        assert_eq!(sample.channel(0).len(), 7);
    }

    #[test]
    fn test_norm_factor() {
        let sample = Sample::from_channels(vec![vec![0.1, -0.5], vec![0.25, 0.0]], 48000);
        assert!((sample.abs_max() - 0.5).abs() < 1e-6);
        assert!((sample.norm_factor() - 2.0).abs() < 1e-6);

        let silent = Sample::try_with_length(2, 100, 48000).unwrap();
        assert_eq!(silent.norm_factor(), 1.0);
        assert_eq!(Sample::empty(48000).norm_factor(), 1.0);
    }

    #[test]
    fn test_try_with_length_zeroed() {
        let sample = Sample::try_with_length(3, 64, 44100).unwrap();
        assert_eq!(sample.channels(), 3);
        assert_eq!(sample.len(), 64);
        assert!(sample.channel(2).iter().all(|&s| s == 0.0));
        assert!(sample.get_channel(3).is_none());
    }
}
