//! Real-time state of convolution slots and output channels

use basedrop::Owned;

use super::params::{Parameters, SlotParams};
use crate::dsp::{Bypass, Convolver, Delay, EqMode, Equalizer, SamplePlayer};
use crate::task::SlotRoute;
use crate::types::{fft_rank, millis_to_samples, pan_weights, BLOCK_SIZE, PREDELAY_MAX_MS};

/// Delay line capacity: global plus slot pre-delay with headroom
fn delay_capacity(sample_rate: u32) -> usize {
    millis_to_samples(sample_rate, PREDELAY_MAX_MS * 4.0)
}

/// One routing unit: input mix → kernel → pre-delay → output pan
pub struct ConvolutionSlot {
    /// Kernel the audio path reads; replaced only between blocks
    live: Option<Owned<Convolver>>,
    delay: Delay,
    buffer: Vec<f32>,
    pan_in: [f32; 2],
    pan_out: [f32; 2],
    route: SlotRoute,
}

impl ConvolutionSlot {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            live: None,
            delay: Delay::new(delay_capacity(sample_rate)),
            buffer: vec![0.0; BLOCK_SIZE],
            pan_in: [1.0, 0.0],
            pan_out: [0.0, 0.0],
            route: SlotRoute::default(),
        }
    }

    /// Resize the delay line and flush the kernel tail (not real-time safe)
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.delay.init(delay_capacity(sample_rate));
        if let Some(live) = self.live.as_mut() {
            live.reset();
        }
    }

    /// Derive gains, delay and route from the parameters
    ///
    /// Returns true when the kernel source (file, track or FFT rank) changed
    /// and a rebuild is needed.
    pub fn update(
        &mut self,
        slot: &SlotParams,
        params: &Parameters,
        inputs: usize,
        sample_rate: u32,
    ) -> bool {
        let makeup = slot.makeup * params.wet_gain * params.output_gain;
        self.pan_in = if inputs < 2 {
            [1.0, 0.0]
        } else {
            pan_weights(slot.pan_in)
        };
        let [l, r] = pan_weights(slot.pan_out);
        self.pan_out = [l * makeup, r * makeup];

        let predelay = params.predelay_ms + slot.predelay_ms;
        self.delay.set_delay(millis_to_samples(sample_rate, predelay));

        let route = SlotRoute {
            file: if slot.mute { 0 } else { slot.file },
            track: slot.track,
            rank: fft_rank(params.fft_size),
        };
        if route != self.route {
            self.route = route;
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn route(&self) -> SlotRoute {
        self.route
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.live.is_some()
    }

    /// Install a new kernel; returns true if one was displaced
    pub fn swap(&mut self, kernel: Option<Owned<Convolver>>) -> bool {
        std::mem::replace(&mut self.live, kernel).is_some()
    }

    /// Convolve `count` frames of input starting at `offset` and accumulate
    /// into both outputs
    pub fn process(
        &mut self,
        inputs: &[&[f32]],
        offset: usize,
        left: &mut [f32],
        right: &mut [f32],
    ) {
        let count = left.len();
        let buf = &mut self.buffer[..count];

        match inputs {
            [mono] => buf.copy_from_slice(&mono[offset..offset + count]),
            [l, r, ..] => {
                let [gl, gr] = self.pan_in;
                for ((o, &a), &b) in buf
                    .iter_mut()
                    .zip(&l[offset..offset + count])
                    .zip(&r[offset..offset + count])
                {
                    *o = a * gl + b * gr;
                }
            }
            [] => buf.fill(0.0),
        }

        match self.live.as_mut() {
            Some(kernel) => kernel.process(buf),
            None => buf.fill(0.0),
        }
        self.delay.process(buf);

        let [gl, gr] = self.pan_out;
        for ((l, r), &s) in left.iter_mut().zip(right.iter_mut()).zip(buf.iter()) {
            *l += s * gl;
            *r += s * gr;
        }
    }

    /// Drop the kernel and silence the delay line (teardown)
    pub fn clear(&mut self) {
        self.live = None;
        self.delay.clear();
    }
}

/// Post-processing chain of one output channel
pub struct OutputChannel {
    pub(crate) bypass: Bypass,
    pub(crate) player: SamplePlayer,
    pub(crate) equalizer: Equalizer,
    /// Wet accumulation buffer
    pub(crate) buffer: Vec<f32>,
    /// Dry gain per input channel
    dry_pan: [f32; 2],
}

impl OutputChannel {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            bypass: Bypass::new(sample_rate),
            player: SamplePlayer::new(),
            equalizer: Equalizer::new(sample_rate),
            buffer: vec![0.0; BLOCK_SIZE],
            dry_pan: [0.0, 0.0],
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.bypass.init(sample_rate);
        self.equalizer.set_sample_rate(sample_rate);
    }

    /// Derive dry pan, EQ and player gain for output `channel`
    pub fn update(&mut self, channel: usize, params: &Parameters, inputs: usize) {
        let gain = params.dry_gain * params.output_gain;
        self.dry_pan = if inputs < 2 {
            [pan_weights(params.input_pan[0])[channel] * gain, 0.0]
        } else {
            [
                pan_weights(params.input_pan[0])[channel] * gain,
                pan_weights(params.input_pan[1])[channel] * gain,
            ]
        };

        self.bypass.set_bypass(params.bypass);
        self.equalizer.set_mode(if params.wet_eq {
            EqMode::Iir
        } else {
            EqMode::Bypass
        });
        self.equalizer.configure(&params.eq);
        self.player.set_gain(params.output_gain);
    }

    /// Finish `out.len()` frames: EQ the wet sum, add dry and preview, then
    /// crossfade against the unprocessed input `dry`
    pub fn process(&mut self, inputs: &[&[f32]], offset: usize, dry: &[f32], out: &mut [f32]) {
        let count = out.len();
        let wet = &mut self.buffer[..count];

        self.equalizer.process(wet);

        for (input, &gain) in inputs.iter().zip(self.dry_pan.iter()) {
            if gain == 0.0 {
                continue;
            }
            for (w, &x) in wet.iter_mut().zip(&input[offset..offset + count]) {
                *w += x * gain;
            }
        }

        self.player.process(wet);
        self.bypass.process(out, dry, wet);
    }

    /// Release bound samples and voices (teardown)
    pub fn clear(&mut self) {
        self.player.clear();
        self.equalizer.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FFT_RANK_DEFAULT, FFT_RANK_MIN, SAMPLE_RATE};
    use basedrop::Collector;

    #[test]
    fn test_update_reports_route_changes() {
        let mut slot = ConvolutionSlot::new(SAMPLE_RATE);
        let mut params = Parameters::new(2);
        let sp = params.slots[0];

        assert!(slot.update(&sp, &params, 2, SAMPLE_RATE));
        assert!(!slot.update(&sp, &params, 2, SAMPLE_RATE));
        assert_eq!(slot.route().rank, FFT_RANK_MIN + FFT_RANK_DEFAULT);

        // Gains and delay do not trigger a rebuild
        params.wet_gain = 0.5;
        params.predelay_ms = 10.0;
        assert!(!slot.update(&sp, &params, 2, SAMPLE_RATE));
        assert_eq!(slot.delay.delay(), 480);

        let muted = SlotParams { mute: true, ..sp };
        assert!(slot.update(&muted, &params, 2, SAMPLE_RATE));
        assert_eq!(slot.route().file, 0);

        params.fft_size = 0;
        assert!(slot.update(&muted, &params, 2, SAMPLE_RATE));
    }

    #[test]
    fn test_unbound_slot_is_silent() {
        let mut slot = ConvolutionSlot::new(SAMPLE_RATE);
        let params = Parameters::new(1);
        slot.update(&params.slots[1], &params, 1, SAMPLE_RATE);

        let input = vec![1.0; 64];
        let mut left = vec![0.25; 64];
        let mut right = vec![0.0; 64];
        slot.process(&[&input[..]], 0, &mut left, &mut right);
        assert!(left.iter().all(|&s| s == 0.25));
        assert!(right.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_bound_slot_pans_output() {
        let collector = Collector::new();
        let mut slot = ConvolutionSlot::new(SAMPLE_RATE);
        let mut params = Parameters::new(1);
        params.slots[0].pan_out = 100.0;
        let sp = params.slots[0];
        slot.update(&sp, &params, 1, SAMPLE_RATE);

        let kernel = Convolver::new(&[1.0], FFT_RANK_MIN, 0.0).unwrap();
        assert!(!slot.swap(Some(Owned::new(&collector.handle(), kernel))));
        assert!(slot.is_active());

        let mut input = vec![0.0; 32];
        input[0] = 1.0;
        let mut left = vec![0.0; 32];
        let mut right = vec![0.0; 32];
        slot.process(&[&input[..]], 0, &mut left, &mut right);
        assert!(left.iter().all(|s| s.abs() < 1e-6));
        assert!((right[0] - 1.0).abs() < 1e-4);

        assert!(slot.swap(None));
        assert!(!slot.is_active());
    }

    #[test]
    fn test_dry_pan_mono_and_stereo() {
        let mut params = Parameters::new(1);
        params.dry_gain = 0.5;
        let mut left = OutputChannel::new(SAMPLE_RATE);
        let mut right = OutputChannel::new(SAMPLE_RATE);
        left.update(0, &params, 1);
        right.update(1, &params, 1);
        assert_eq!(left.dry_pan, [0.25, 0.0]);
        assert_eq!(right.dry_pan, [0.25, 0.0]);

        let params = Parameters::new(2);
        left.update(0, &params, 2);
        right.update(1, &params, 2);
        assert_eq!(left.dry_pan, [1.0, 0.0]);
        assert_eq!(right.dry_pan, [0.0, 1.0]);
    }

    #[test]
    fn test_output_mixes_dry_into_wet() {
        let params = Parameters::new(1);
        let mut channel = OutputChannel::new(SAMPLE_RATE);
        channel.update(0, &params, 1);

        let input = vec![1.0; 16];
        channel.buffer[..16].fill(0.25);
        let mut out = vec![0.0; 16];
        channel.process(&[&input[..]], 0, &input, &mut out);
        // 0.25 wet + 0.5 dry (centre pan)
        assert!(out.iter().all(|&s| (s - 0.75).abs() < 1e-6));
    }
}
