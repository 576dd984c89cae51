//! Click-free bypass crossfade between dry and processed signals

use crate::types::SAMPLE_RATE;

/// Crossfade duration when toggling bypass
const BYPASS_FADE_SECS: f32 = 0.005;

/// Ramped dry/wet switch
pub struct Bypass {
    /// Current wet fraction (0 = fully bypassed, 1 = fully processed)
    gain: f32,
    /// Wet fraction the ramp is heading for
    target: f32,
    /// Per-sample ramp increment
    delta: f32,
}

impl Default for Bypass {
    fn default() -> Self {
        Self::new(SAMPLE_RATE)
    }
}

impl Bypass {
    pub fn new(sample_rate: u32) -> Self {
        let mut bypass = Self {
            gain: 1.0,
            target: 1.0,
            delta: 0.0,
        };
        bypass.init(sample_rate);
        bypass
    }

    /// Recompute the ramp rate for `sample_rate`
    pub fn init(&mut self, sample_rate: u32) {
        let fade_samples = (sample_rate as f32 * BYPASS_FADE_SECS).max(1.0);
        self.delta = 1.0 / fade_samples;
    }

    /// Request bypass on or off; the transition is ramped
    pub fn set_bypass(&mut self, bypass: bool) {
        self.target = if bypass { 0.0 } else { 1.0 };
    }

    /// Write `dry * (1 - g) + wet * g` into `out`
    pub fn process(&mut self, out: &mut [f32], dry: &[f32], wet: &[f32]) {
        // Steady states avoid the per-sample ramp
        if self.gain == self.target {
            if self.gain >= 1.0 {
                out.copy_from_slice(wet);
            } else if self.gain <= 0.0 {
                out.copy_from_slice(dry);
            } else {
                for ((o, &d), &w) in out.iter_mut().zip(dry.iter()).zip(wet.iter()) {
                    *o = d + (w - d) * self.gain;
                }
            }
            return;
        }

        for ((o, &d), &w) in out.iter_mut().zip(dry.iter()).zip(wet.iter()) {
            if self.gain < self.target {
                self.gain = (self.gain + self.delta).min(self.target);
            } else if self.gain > self.target {
                self.gain = (self.gain - self.delta).max(self.target);
            }
            *o = d + (w - d) * self.gain;
        }
    }
}
