//! Wet-signal equalizer
//!
//! Eight-band graphic EQ (low shelf, six peaking bands, high shelf) followed
//! by optional Butterworth low-cut and high-cut filters with 12/24/36 dB/oct
//! slopes. All filters are RBJ biquads.

use serde::{Deserialize, Serialize};

use crate::types::{
    EQ_BANDS, EQ_BAND_FREQS, FILTER_SLOPES, HIGH_CUT_DEFAULT, HIGH_CUT_MAX, HIGH_CUT_MIN,
    LOW_CUT_DEFAULT, LOW_CUT_MAX, LOW_CUT_MIN, SAMPLE_RATE,
};

/// Butterworth section quality
const BUTTERWORTH_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Maximum cascaded sections per cut filter (36 dB/oct)
const MAX_SECTIONS: usize = FILTER_SLOPES - 1;

/// Biquad filter coefficients
#[derive(Debug, Clone, Copy, PartialEq)]
struct BiquadCoeffs {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl BiquadCoeffs {
    fn low_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / 2.0 * ((a + 1.0 / a) * (1.0 / 0.9 - 1.0) + 2.0).sqrt();

        let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        Self {
            b0: (a * ((a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha)) / a0,
            b1: (2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha)) / a0,
            a1: (-2.0 * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha) / a0,
        }
    }

    fn peaking(freq: f32, gain_db: f32, q: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_w0) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha / a) / a0,
        }
    }

    fn high_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / 2.0 * ((a + 1.0 / a) * (1.0 / 0.9 - 1.0) + 2.0).sqrt();

        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        Self {
            b0: (a * ((a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha)) / a0,
            b1: (-2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha)) / a0,
            a1: (2.0 * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha) / a0,
        }
    }

    fn high_pass(freq: f32, sample_rate: f32) -> Self {
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * BUTTERWORTH_Q);

        let a0 = 1.0 + alpha;
        Self {
            b0: ((1.0 + cos_w0) / 2.0) / a0,
            b1: (-(1.0 + cos_w0)) / a0,
            b2: ((1.0 + cos_w0) / 2.0) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn low_pass(freq: f32, sample_rate: f32) -> Self {
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * BUTTERWORTH_Q);

        let a0 = 1.0 + alpha;
        Self {
            b0: ((1.0 - cos_w0) / 2.0) / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: ((1.0 - cos_w0) / 2.0) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn passthrough() -> Self {
        Self { b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 }
    }
}

/// One biquad section with its direct-form I state
#[derive(Debug, Clone, Copy)]
struct Biquad {
    coeffs: BiquadCoeffs,
    active: bool,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Default for Biquad {
    fn default() -> Self {
        Self {
            coeffs: BiquadCoeffs::passthrough(),
            active: false,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }
}

impl Biquad {
    fn set(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
        self.active = true;
    }

    fn disable(&mut self) {
        self.active = false;
        self.reset();
    }

    fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    fn process(&mut self, buf: &mut [f32]) {
        if !self.active {
            return;
        }
        let c = self.coeffs;
        for s in buf.iter_mut() {
            let x = *s;
            let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
            self.x2 = self.x1;
            self.x1 = x;
            self.y2 = self.y1;
            self.y1 = y;
            *s = y;
        }
    }
}

/// Equalizer operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EqMode {
    #[default]
    Bypass,
    Iir,
}

/// User-facing equalizer settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqSettings {
    /// Linear amplitude gain per band (1.0 = flat)
    pub band_gains: [f32; EQ_BANDS],
    /// Low-cut slope selector (0 = off, 1..=3 = 12/24/36 dB/oct)
    pub low_cut_slope: usize,
    pub low_cut_freq: f32,
    /// High-cut slope selector (0 = off, 1..=3 = 12/24/36 dB/oct)
    pub high_cut_slope: usize,
    pub high_cut_freq: f32,
}

impl Default for EqSettings {
    fn default() -> Self {
        Self {
            band_gains: [1.0; EQ_BANDS],
            low_cut_slope: 0,
            low_cut_freq: LOW_CUT_DEFAULT,
            high_cut_slope: 0,
            high_cut_freq: HIGH_CUT_DEFAULT,
        }
    }
}

/// Equalizer for one output channel
pub struct Equalizer {
    mode: EqMode,
    sample_rate: f32,
    settings: EqSettings,
    bands: [Biquad; EQ_BANDS],
    low_cut: [Biquad; MAX_SECTIONS],
    high_cut: [Biquad; MAX_SECTIONS],
}

impl Default for Equalizer {
    fn default() -> Self {
        Self::new(SAMPLE_RATE)
    }
}

impl Equalizer {
    pub fn new(sample_rate: u32) -> Self {
        let mut eq = Self {
            mode: EqMode::Bypass,
            sample_rate: sample_rate as f32,
            settings: EqSettings::default(),
            bands: [Biquad::default(); EQ_BANDS],
            low_cut: [Biquad::default(); MAX_SECTIONS],
            high_cut: [Biquad::default(); MAX_SECTIONS],
        };
        eq.update_filters();
        eq
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate as f32;
        self.update_filters();
        self.reset();
    }

    pub fn set_mode(&mut self, mode: EqMode) {
        if self.mode != mode {
            self.mode = mode;
            self.reset();
        }
    }

    #[inline]
    pub fn mode(&self) -> EqMode {
        self.mode
    }

    /// Apply new settings; coefficients are only recomputed when they changed
    pub fn configure(&mut self, settings: &EqSettings) {
        if self.settings != *settings {
            self.settings = *settings;
            self.update_filters();
        }
    }

    /// Equalize `buf` in place (no-op in bypass mode)
    pub fn process(&mut self, buf: &mut [f32]) {
        if self.mode == EqMode::Bypass {
            return;
        }
        for filter in self
            .bands
            .iter_mut()
            .chain(self.low_cut.iter_mut())
            .chain(self.high_cut.iter_mut())
        {
            filter.process(buf);
        }
    }

    pub fn reset(&mut self) {
        for filter in self
            .bands
            .iter_mut()
            .chain(self.low_cut.iter_mut())
            .chain(self.high_cut.iter_mut())
        {
            filter.reset();
        }
    }

    fn update_filters(&mut self) {
        let sr = self.sample_rate;
        let nyquist_guard = sr * 0.49;

        for (band, filter) in self.bands.iter_mut().enumerate() {
            let gain = self.settings.band_gains[band];
            if (gain - 1.0).abs() < 1e-6 {
                filter.disable();
                continue;
            }
            let gain_db = 20.0 * gain.max(1e-6).log10();

            let coeffs = if band == 0 {
                BiquadCoeffs::low_shelf(EQ_BAND_FREQS[0], gain_db, sr)
            } else if band == EQ_BANDS - 1 {
                BiquadCoeffs::high_shelf(EQ_BAND_FREQS[band - 1].min(nyquist_guard), gain_db, sr)
            } else {
                let f1 = EQ_BAND_FREQS[band - 1];
                let f2 = EQ_BAND_FREQS[band];
                let center = (f1 * f2).sqrt();
                BiquadCoeffs::peaking(center.min(nyquist_guard), gain_db, center / (f2 - f1), sr)
            };
            filter.set(coeffs);
        }

        let low_freq = self.settings.low_cut_freq.clamp(LOW_CUT_MIN, LOW_CUT_MAX);
        let low_sections = self.settings.low_cut_slope.min(MAX_SECTIONS);
        for (i, filter) in self.low_cut.iter_mut().enumerate() {
            if i < low_sections {
                filter.set(BiquadCoeffs::high_pass(low_freq.min(nyquist_guard), sr));
            } else {
                filter.disable();
            }
        }

        let high_freq = self.settings.high_cut_freq.clamp(HIGH_CUT_MIN, HIGH_CUT_MAX);
        let high_sections = self.settings.high_cut_slope.min(MAX_SECTIONS);
        for (i, filter) in self.high_cut.iter_mut().enumerate() {
            if i < high_sections {
                filter.set(BiquadCoeffs::low_pass(high_freq.min(nyquist_guard), sr));
            } else {
                filter.disable();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / 48000.0).sin())
            .collect()
    }

    fn rms(buf: &[f32]) -> f32 {
        (buf.iter().map(|s| s * s).sum::<f32>() / buf.len() as f32).sqrt()
    }

    #[test]
    fn test_bypass_leaves_signal_untouched() {
        let mut eq = Equalizer::new(48000);
        eq.configure(&EqSettings {
            band_gains: [4.0; EQ_BANDS],
            ..Default::default()
        });
        let input = sine(1000.0, 480);
        let mut buf = input.clone();
        eq.process(&mut buf);
        assert_eq!(buf, input);
    }

    #[test]
    fn test_flat_iir_is_transparent() {
        let mut eq = Equalizer::new(48000);
        eq.set_mode(EqMode::Iir);
        let input = sine(440.0, 480);
        let mut buf = input.clone();
        eq.process(&mut buf);
        assert_eq!(buf, input);
    }

    #[test]
    fn test_low_cut_attenuates_lows() {
        let mut eq = Equalizer::new(48000);
        eq.set_mode(EqMode::Iir);
        eq.configure(&EqSettings {
            low_cut_slope: 3,
            low_cut_freq: 1000.0,
            ..Default::default()
        });

        let mut low = sine(50.0, 48000);
        eq.process(&mut low);
        eq.reset();
        let mut high = sine(8000.0, 48000);
        eq.process(&mut high);

        let tail = 24000..48000;
        assert!(rms(&low[tail.clone()]) < 0.01);
        assert!(rms(&high[tail]) > 0.6);
    }

    #[test]
    fn test_band_boost_raises_level() {
        let mut eq = Equalizer::new(48000);
        eq.set_mode(EqMode::Iir);
        let mut gains = [1.0; EQ_BANDS];
        gains[4] = 4.0; // 707..1507 Hz band
        eq.configure(&EqSettings {
            band_gains: gains,
            ..Default::default()
        });

        let mut buf = sine(1032.0, 48000);
        eq.process(&mut buf);
        assert!(rms(&buf[24000..]) > 0.707 * 2.0);
    }
}
