//! Mono ring-buffer delay line for slot pre-delay

/// Ring buffer delay line
pub struct Delay {
    buffer: Vec<f32>,
    write_pos: usize,
    delay_samples: usize,
}

impl Delay {
    /// Create a delay line holding up to `max_samples - 1` frames of delay
    pub fn new(max_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_samples.max(1)],
            write_pos: 0,
            delay_samples: 0,
        }
    }

    /// Reallocate for a new maximum (sample rate change; not real-time safe)
    pub fn init(&mut self, max_samples: usize) {
        *self = Self::new(max_samples);
    }

    /// Set the delay amount in samples, clamped to the buffer size
    pub fn set_delay(&mut self, samples: usize) {
        self.delay_samples = samples.min(self.buffer.len() - 1);
    }

    #[inline]
    pub fn delay(&self) -> usize {
        self.delay_samples
    }

    /// Delay `buf` in place
    pub fn process(&mut self, buf: &mut [f32]) {
        let len = self.buffer.len();
        for s in buf.iter_mut() {
            self.buffer[self.write_pos] = *s;

            let read_pos = if self.write_pos >= self.delay_samples {
                self.write_pos - self.delay_samples
            } else {
                len - (self.delay_samples - self.write_pos)
            };
            *s = self.buffer[read_pos];

            self.write_pos = (self.write_pos + 1) % len;
        }
    }

    /// Fill with silence
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_delay_passthrough() {
        let mut delay = Delay::new(16);
        let mut buf = [1.0, 2.0, 3.0];
        delay.process(&mut buf);
        assert_eq!(buf, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_delay_shifts_signal_across_calls() {
        let mut delay = Delay::new(16);
        delay.set_delay(3);

        let mut a = [1.0, 2.0, 3.0, 4.0];
        delay.process(&mut a);
        assert_eq!(a, [0.0, 0.0, 0.0, 1.0]);

        let mut b = [5.0, 6.0];
        delay.process(&mut b);
        assert_eq!(b, [2.0, 3.0]);
    }

    #[test]
    fn test_delay_clamps_to_capacity() {
        let mut delay = Delay::new(8);
        delay.set_delay(100);
        assert_eq!(delay.delay(), 7);
    }
}
