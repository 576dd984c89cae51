//! One-shot sample playback for previewing impulse files
//!
//! The player binds one processed [`Sample`] per impulse file and mixes any
//! number of active voices (up to [`PLAYER_VOICES`]) into the output. Bound
//! samples and voices hold `basedrop::Shared` handles, so dropping them on
//! the audio thread only enqueues the buffer for the collector. The player
//! counts every handle it lets go of; the engine uses that count to decide
//! when a collect pass is worth scheduling.

use basedrop::Shared;

use crate::sample::Sample;
use crate::types::{NUM_FILES, PLAYER_VOICES};

struct Voice {
    sample: Option<Shared<Sample>>,
    channel: usize,
    position: usize,
    delay: usize,
    volume: f32,
}

impl Voice {
    fn idle() -> Self {
        Self {
            sample: None,
            channel: 0,
            position: 0,
            delay: 0,
            volume: 0.0,
        }
    }
}

/// Preview sample player for one output channel
pub struct SamplePlayer {
    bound: [Option<Shared<Sample>>; NUM_FILES],
    voices: Vec<Voice>,
    gain: f32,
    released: usize,
}

impl Default for SamplePlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplePlayer {
    pub fn new() -> Self {
        Self {
            bound: std::array::from_fn(|_| None),
            voices: (0..PLAYER_VOICES).map(|_| Voice::idle()).collect(),
            gain: 1.0,
            released: 0,
        }
    }

    /// Bind `sample` to slot `index`, releasing whatever was bound before
    ///
    /// Voices already playing the old sample keep their own handle and finish
    /// normally.
    pub fn bind(&mut self, index: usize, sample: Option<Shared<Sample>>) {
        let Some(slot) = self.bound.get_mut(index) else {
            return;
        };
        if std::mem::replace(slot, sample).is_some() {
            self.released += 1;
        }
    }

    /// Output gain applied to all voices
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    /// Start playing `channel` of the sample bound at `index`
    ///
    /// When every voice is busy the one closest to finishing is stolen.
    /// Returns false if nothing playable is bound.
    pub fn play(&mut self, index: usize, channel: usize, volume: f32, delay: usize) -> bool {
        let Some(Some(sample)) = self.bound.get(index) else {
            return false;
        };
        if channel >= sample.channels() || sample.is_empty() {
            return false;
        }
        let sample = sample.clone();

        let slot = match self.voices.iter().position(|v| v.sample.is_none()) {
            Some(free) => free,
            None => self
                .voices
                .iter()
                .enumerate()
                .max_by_key(|(_, v)| v.position)
                .map(|(i, _)| i)
                .unwrap_or(0),
        };

        let voice = &mut self.voices[slot];
        if voice.sample.replace(sample).is_some() {
            self.released += 1;
        }
        voice.channel = channel;
        voice.position = 0;
        voice.delay = delay;
        voice.volume = volume;
        true
    }

    /// Number of voices currently playing
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.sample.is_some()).count()
    }

    /// Mix active voices into `buf`
    pub fn process(&mut self, buf: &mut [f32]) {
        for voice in self.voices.iter_mut() {
            let Voice {
                sample,
                channel,
                position,
                delay,
                volume,
            } = voice;
            let Some(shared) = sample.as_ref() else {
                continue;
            };
            let data = shared.channel(*channel);
            let length = data.len();
            let gain = *volume * self.gain;

            let skip = (*delay).min(buf.len());
            *delay -= skip;

            let count = (length - *position).min(buf.len() - skip);
            for (o, &s) in buf[skip..skip + count]
                .iter_mut()
                .zip(data[*position..*position + count].iter())
            {
                *o += s * gain;
            }
            *position += count;

            if *position >= length {
                *sample = None;
                self.released += 1;
            }
        }
    }

    /// Release every bound sample and stop all voices
    pub fn clear(&mut self) {
        for slot in self.bound.iter_mut() {
            if slot.take().is_some() {
                self.released += 1;
            }
        }
        for voice in self.voices.iter_mut() {
            if voice.sample.take().is_some() {
                self.released += 1;
            }
        }
    }

    /// Handles released since the last call
    pub fn take_released(&mut self) -> usize {
        std::mem::take(&mut self.released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Collector;

    #[test]
    fn test_play_mixes_into_buffer() {
        let collector = Collector::new();
        let sample = Shared::new(
            &collector.handle(),
            Sample::from_channels(vec![vec![1.0, 2.0, 3.0], vec![-1.0, -2.0, -3.0]], 48000),
        );

        let mut player = SamplePlayer::new();
        player.bind(0, Some(sample));
        player.set_gain(0.5);
        assert!(player.play(0, 1, 2.0, 1));
        assert!(!player.play(1, 0, 1.0, 0));
        assert!(!player.play(0, 5, 1.0, 0));

        let mut buf = [10.0; 3];
        player.process(&mut buf);
        assert_eq!(buf, [10.0, 9.0, 8.0]);

        let mut buf = [0.0; 3];
        player.process(&mut buf);
        assert_eq!(buf, [-3.0, 0.0, 0.0]);
        assert_eq!(player.active_voices(), 0);
        assert_eq!(player.take_released(), 1);
        assert_eq!(player.take_released(), 0);
    }

    #[test]
    fn test_rebind_counts_release() {
        let collector = Collector::new();
        let handle = collector.handle();
        let mut player = SamplePlayer::new();

        player.bind(2, Some(Shared::new(&handle, Sample::from_channels(vec![vec![1.0]], 48000))));
        assert_eq!(player.take_released(), 0);
        player.bind(2, Some(Shared::new(&handle, Sample::from_channels(vec![vec![2.0]], 48000))));
        assert_eq!(player.take_released(), 1);

        player.clear();
        assert_eq!(player.take_released(), 1);
    }

    #[test]
    fn test_voice_stealing_when_full() {
        let collector = Collector::new();
        let sample = Shared::new(
            &collector.handle(),
            Sample::from_channels(vec![vec![1.0; 100]], 48000),
        );
        let mut player = SamplePlayer::new();
        player.bind(0, Some(sample));

        for _ in 0..PLAYER_VOICES {
            assert!(player.play(0, 0, 1.0, 0));
        }
        assert!(player.play(0, 0, 1.0, 0));
        assert_eq!(player.active_voices(), PLAYER_VOICES);
        assert_eq!(player.take_released(), 1);
    }
}
