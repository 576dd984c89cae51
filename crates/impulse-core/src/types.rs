//! Common types and constants for the impulse reverb
//!
//! Fixed arena sizes, parameter ranges and the small conversion helpers
//! shared by the offline tasks and the real-time path.

/// Default processing sample rate
pub const SAMPLE_RATE: u32 = 48000;

/// Number of impulse files that can be loaded at once
pub const NUM_FILES: usize = 4;

/// Number of convolution slots (routing units)
pub const NUM_SLOTS: usize = 4;

/// Number of output channels (always stereo)
pub const NUM_OUTPUTS: usize = 2;

/// Maximum number of tracks (channels) considered per impulse file
pub const TRACKS_MAX: usize = 8;

/// Number of thumbnail buckets per track
pub const MESH_SIZE: usize = 600;

/// Maximum impulse length in milliseconds; longer files are truncated on load
pub const CONV_LENGTH_MAX_MS: f32 = 10000.0;

/// Maximum pre-delay in milliseconds (global and per slot)
pub const PREDELAY_MAX_MS: f32 = 100.0;

/// Smallest FFT rank (2^9 = 512 point FFT)
pub const FFT_RANK_MIN: usize = 9;

/// Number of selectable FFT sizes (512 ..= 65536)
pub const FFT_RANK_STEPS: usize = 8;

/// Default FFT size selector (32768 point FFT)
pub const FFT_RANK_DEFAULT: usize = 6;

/// Sub-block size of the real-time convolution loop
pub const BLOCK_SIZE: usize = 4096;

/// Number of parametric equalizer bands
pub const EQ_BANDS: usize = 8;

/// Band edge frequencies of the wet equalizer
pub const EQ_BAND_FREQS: [f32; EQ_BANDS - 1] =
    [73.0, 156.0, 332.0, 707.0, 1507.0, 3213.0, 6849.0];

/// Low-cut frequency range and default (Hz)
pub const LOW_CUT_MIN: f32 = 10.0;
pub const LOW_CUT_MAX: f32 = 1000.0;
pub const LOW_CUT_DEFAULT: f32 = 50.0;

/// High-cut frequency range and default (Hz)
pub const HIGH_CUT_MIN: f32 = 2000.0;
pub const HIGH_CUT_MAX: f32 = 22000.0;
pub const HIGH_CUT_DEFAULT: f32 = 10000.0;

/// Number of cut filter slopes (off, 12, 24, 36 dB/oct)
pub const FILTER_SLOPES: usize = 4;

/// Maximum number of simultaneous preview voices per output channel
pub const PLAYER_VOICES: usize = 32;

/// Convert a duration in milliseconds to a whole number of samples
///
/// Negative durations clamp to zero.
#[inline]
pub fn millis_to_samples(sample_rate: u32, millis: f32) -> usize {
    let samples = millis * 0.001 * sample_rate as f32;
    if samples > 0.0 {
        samples as usize
    } else {
        0
    }
}

/// Convert a sample count to milliseconds
#[inline]
pub fn samples_to_millis(sample_rate: u32, samples: usize) -> f32 {
    if sample_rate == 0 {
        return 0.0;
    }
    samples as f32 * 1000.0 / sample_rate as f32
}

/// Resolve an FFT size selector (0..FFT_RANK_STEPS) into an FFT rank
#[inline]
pub fn fft_rank(selector: usize) -> usize {
    FFT_RANK_MIN + selector.min(FFT_RANK_STEPS - 1)
}

/// Left/right weights for a pan position in -100..=100
#[inline]
pub fn pan_weights(pan: f32) -> [f32; 2] {
    let pan = pan.clamp(-100.0, 100.0);
    [(100.0 - pan) * 0.005, (100.0 + pan) * 0.005]
}
