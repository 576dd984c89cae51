//! Processed buffer derivation: trim, reverse, fades and thumbnails

use serde::{Deserialize, Serialize};

use super::Sample;
use crate::error::TaskError;
use crate::types::{millis_to_samples, MESH_SIZE, TRACKS_MAX};

/// Trim, fade and reverse settings for one impulse file (milliseconds)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderParams {
    pub head_cut_ms: f32,
    pub tail_cut_ms: f32,
    pub fade_in_ms: f32,
    pub fade_out_ms: f32,
    pub reverse: bool,
}

/// Fixed-resolution peak envelopes, one row per track
///
/// Always `TRACKS_MAX` rows of `MESH_SIZE` buckets; only the first
/// `channels()` rows are meaningful.
#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnails {
    tracks: Vec<Vec<f32>>,
    channels: usize,
}

impl Default for Thumbnails {
    fn default() -> Self {
        Self::new()
    }
}

impl Thumbnails {
    pub fn new() -> Self {
        Self {
            tracks: vec![vec![0.0; MESH_SIZE]; TRACKS_MAX],
            channels: 0,
        }
    }

    /// Number of tracks with valid data
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Bucket values of one track
    #[inline]
    pub fn track(&self, index: usize) -> &[f32] {
        &self.tracks[index]
    }

    fn clear(&mut self, channels: usize) {
        for track in self.tracks.iter_mut() {
            track.fill(0.0);
        }
        self.channels = channels.min(TRACKS_MAX);
    }
}

/// Length of the processed buffer after cutting `head` and `tail` frames
///
/// Never negative: cuts that meet or overlap yield zero.
#[inline]
pub fn trimmed_length(length: usize, head_cut: usize, tail_cut: usize) -> usize {
    length.saturating_sub(head_cut).saturating_sub(tail_cut)
}

/// Derive a processed buffer from `original`
///
/// Only the first `TRACKS_MAX` channels are kept. Thumbnails are recomputed
/// from scratch into `thumbnails` and scaled by `norm`, so repeated renders
/// of the same input produce identical envelopes.
pub fn render(
    original: &Sample,
    params: &RenderParams,
    norm: f32,
    thumbnails: &mut Thumbnails,
) -> Result<Sample, TaskError> {
    let sample_rate = original.sample_rate();
    let channels = original.channels().min(TRACKS_MAX);
    let head_cut = millis_to_samples(sample_rate, params.head_cut_ms);
    let tail_cut = millis_to_samples(sample_rate, params.tail_cut_ms);
    let length = trimmed_length(original.len(), head_cut, tail_cut);

    thumbnails.clear(channels);
    let mut processed = Sample::try_with_length(channels, length, sample_rate)?;
    if length == 0 {
        return Ok(processed);
    }

    let fade_in = millis_to_samples(sample_rate, params.fade_in_ms);
    let fade_out = millis_to_samples(sample_rate, params.fade_out_ms);

    for ch in 0..channels {
        let src = original.channel(ch);
        let dst = processed.channel_mut(ch);

        if params.reverse {
            let segment = &src[tail_cut..tail_cut + length];
            for (d, &s) in dst.iter_mut().zip(segment.iter().rev()) {
                *d = s;
            }
        } else {
            dst.copy_from_slice(&src[head_cut..head_cut + length]);
        }

        apply_fade_in(dst, fade_in);
        apply_fade_out(dst, fade_out);

        compute_thumbnail(dst, &mut thumbnails.tracks[ch]);
        if norm != 1.0 {
            for v in thumbnails.tracks[ch].iter_mut() {
                *v *= norm;
            }
        }
    }

    Ok(processed)
}

/// Linear fade-in over the first `fade` frames
fn apply_fade_in(buf: &mut [f32], fade: usize) {
    if fade == 0 {
        return;
    }
    let k = 1.0 / fade as f32;
    for (i, s) in buf.iter_mut().take(fade).enumerate() {
        *s *= i as f32 * k;
    }
}

/// Linear fade-out over the last `fade` frames
///
/// When the fade is longer than the buffer, only its final part is applied,
/// keeping the slope the same as for a full-length fade.
fn apply_fade_out(buf: &mut [f32], fade: usize) {
    if fade == 0 {
        return;
    }
    let len = buf.len();
    let k = 1.0 / fade as f32;
    let start = len.saturating_sub(fade);
    for (i, s) in buf.iter_mut().enumerate().skip(start) {
        *s *= (len - i) as f32 * k;
    }
}

/// Peak-magnitude envelope of `src` into `MESH_SIZE` buckets
///
/// Bucket `k` covers `[k*n/MESH_SIZE, (k+1)*n/MESH_SIZE)`. When a bucket maps
/// to no source frames it takes the magnitude of its first frame instead.
fn compute_thumbnail(src: &[f32], dst: &mut [f32]) {
    let n = src.len();
    if n == 0 {
        dst.fill(0.0);
        return;
    }

    for (k, bucket) in dst.iter_mut().enumerate().take(MESH_SIZE) {
        let first = k * n / MESH_SIZE;
        let last = (k + 1) * n / MESH_SIZE;
        *bucket = if first < last {
            src[first..last].iter().fold(0.0f32, |peak, &s| peak.max(s.abs()))
        } else {
            src[first.min(n - 1)].abs()
        };
    }
}
