//! Zero-latency uniformly partitioned FFT convolution
//!
//! The impulse is split into segments of `B = 2^(rank-1)` frames, each
//! transformed with a `2B` point real FFT. Input is accumulated into a
//! `B`-frame buffer; every call transforms the partially filled buffer so
//! output is produced without block latency. The contribution of all older
//! segments is pre-multiplied once per block.
//!
//! All buffers, including FFT scratch, are allocated in [`Convolver::new`];
//! [`Convolver::process`] never allocates.

use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use thiserror::Error;

use crate::types::FFT_RANK_MIN;

/// Largest supported FFT rank (2^16 = 65536 point FFT)
pub const FFT_RANK_MAX: usize = 16;

/// Kernel construction errors
#[derive(Error, Debug)]
pub enum ConvolverError {
    #[error("Impulse response is empty")]
    EmptyImpulse,

    #[error("FFT rank {0} outside supported range")]
    InvalidRank(usize),

    #[error("Out of memory allocating convolution kernel")]
    NoMemory,

    #[error("FFT failure: {0}")]
    Fft(String),
}

/// Prepared convolution kernel with its running state
pub struct Convolver {
    ir_len: usize,
    block_size: usize,
    fft_forward: Arc<dyn RealToComplex<f32>>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
    forward_scratch: Vec<Complex<f32>>,
    inverse_scratch: Vec<Complex<f32>>,
    segments: Vec<Vec<Complex<f32>>>,
    segments_ir: Vec<Vec<Complex<f32>>>,
    fft_buffer: Vec<f32>,
    pre_multiplied: Vec<Complex<f32>>,
    conv: Vec<Complex<f32>>,
    overlap: Vec<f32>,
    current: usize,
    input_buffer: Vec<f32>,
    input_buffer_fill: usize,
    initial_fill: usize,
}

fn try_zeroed<T: Clone + Default>(len: usize) -> Result<Vec<T>, ConvolverError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| ConvolverError::NoMemory)?;
    v.resize(len, T::default());
    Ok(v)
}

impl Convolver {
    /// Build a kernel from `impulse` at the given FFT `rank`
    ///
    /// `phase` in `[0, 1)` shifts where inside a partition block processing
    /// starts. Kernels with different phases produce the same output but
    /// perform their heavy per-block work on different audio callbacks.
    pub fn new(impulse: &[f32], rank: usize, phase: f32) -> Result<Self, ConvolverError> {
        if impulse.is_empty() {
            return Err(ConvolverError::EmptyImpulse);
        }
        if !(FFT_RANK_MIN..=FFT_RANK_MAX).contains(&rank) {
            return Err(ConvolverError::InvalidRank(rank));
        }

        let seg_size = 1usize << rank;
        let block_size = seg_size / 2;
        let complex_size = seg_size / 2 + 1;
        let seg_count = impulse.len().div_ceil(block_size);

        let mut planner = RealFftPlanner::<f32>::new();
        let fft_forward = planner.plan_fft_forward(seg_size);
        let fft_inverse = planner.plan_fft_inverse(seg_size);

        let forward_scratch = try_zeroed(fft_forward.get_scratch_len())?;
        let inverse_scratch = try_zeroed(fft_inverse.get_scratch_len())?;
        let mut fft_buffer = try_zeroed(seg_size)?;

        let mut segments = Vec::new();
        segments
            .try_reserve_exact(seg_count)
            .map_err(|_| ConvolverError::NoMemory)?;
        let mut segments_ir = Vec::new();
        segments_ir
            .try_reserve_exact(seg_count)
            .map_err(|_| ConvolverError::NoMemory)?;

        let mut scratch = forward_scratch.clone();
        for chunk in impulse.chunks(block_size) {
            segments.push(try_zeroed(complex_size)?);

            let mut segment = try_zeroed(complex_size)?;
            fft_buffer.fill(0.0);
            fft_buffer[..chunk.len()].copy_from_slice(chunk);
            fft_forward
                .process_with_scratch(&mut fft_buffer, &mut segment, &mut scratch)
                .map_err(|e| ConvolverError::Fft(e.to_string()))?;
            segments_ir.push(segment);
        }
        fft_buffer.fill(0.0);

        let initial_fill = ((phase.clamp(0.0, 1.0) * block_size as f32) as usize) % block_size;

        Ok(Self {
            ir_len: impulse.len(),
            block_size,
            fft_forward,
            fft_inverse,
            forward_scratch,
            inverse_scratch,
            segments,
            segments_ir,
            fft_buffer,
            pre_multiplied: try_zeroed(complex_size)?,
            conv: try_zeroed(complex_size)?,
            overlap: try_zeroed(block_size)?,
            current: 0,
            input_buffer: try_zeroed(block_size)?,
            input_buffer_fill: initial_fill,
            initial_fill,
        })
    }

    /// Impulse length in frames
    #[inline]
    pub fn len(&self) -> usize {
        self.ir_len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ir_len == 0
    }

    /// Partition block size in frames
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Clear all running state as if no audio had been processed
    pub fn reset(&mut self) {
        for segment in self.segments.iter_mut() {
            segment.fill(Complex::default());
        }
        self.pre_multiplied.fill(Complex::default());
        self.overlap.fill(0.0);
        self.input_buffer.fill(0.0);
        self.input_buffer_fill = self.initial_fill;
        self.current = 0;
    }

    /// Convolve `buf` in place
    pub fn process(&mut self, buf: &mut [f32]) {
        let seg_count = self.segments_ir.len();
        let mut processed = 0;

        while processed < buf.len() {
            let input_buffer_was_empty = self.input_buffer_fill == 0;
            let pos = self.input_buffer_fill;
            let processing = (buf.len() - processed).min(self.block_size - pos);

            self.input_buffer[pos..pos + processing]
                .copy_from_slice(&buf[processed..processed + processing]);

            // Forward FFT of the zero-padded input block
            self.fft_buffer[..self.block_size].copy_from_slice(&self.input_buffer);
            self.fft_buffer[self.block_size..].fill(0.0);
            if self
                .fft_forward
                .process_with_scratch(
                    &mut self.fft_buffer,
                    &mut self.segments[self.current],
                    &mut self.forward_scratch,
                )
                .is_err()
            {
                buf.fill(0.0);
                return;
            }

            // Older segments only change once per block
            if input_buffer_was_empty {
                self.pre_multiplied.fill(Complex::default());
                for i in 1..seg_count {
                    let index_audio = (self.current + i) % seg_count;
                    multiply_accumulate(
                        &mut self.pre_multiplied,
                        &self.segments_ir[i],
                        &self.segments[index_audio],
                    );
                }
            }

            self.conv.copy_from_slice(&self.pre_multiplied);
            multiply_accumulate(
                &mut self.conv,
                &self.segments[self.current],
                &self.segments_ir[0],
            );

            // DC and Nyquist bins of a real signal's spectrum are real
            let last = self.conv.len() - 1;
            self.conv[0].im = 0.0;
            self.conv[last].im = 0.0;

            if self
                .fft_inverse
                .process_with_scratch(&mut self.conv, &mut self.fft_buffer, &mut self.inverse_scratch)
                .is_err()
            {
                buf.fill(0.0);
                return;
            }

            let scale = 1.0 / (2 * self.block_size) as f32;
            for i in 0..processing {
                buf[processed + i] =
                    self.fft_buffer[pos + i] * scale + self.overlap[pos + i];
            }

            self.input_buffer_fill += processing;
            if self.input_buffer_fill == self.block_size {
                self.input_buffer.fill(0.0);
                self.input_buffer_fill = 0;

                for (o, &f) in self
                    .overlap
                    .iter_mut()
                    .zip(self.fft_buffer[self.block_size..].iter())
                {
                    *o = f * scale;
                }

                self.current = if self.current > 0 {
                    self.current - 1
                } else {
                    seg_count - 1
                };
            }

            processed += processing;
        }
    }
}

#[inline]
fn multiply_accumulate(result: &mut [Complex<f32>], a: &[Complex<f32>], b: &[Complex<f32>]) {
    for ((r, x), y) in result.iter_mut().zip(a.iter()).zip(b.iter()) {
        *r += x * y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_convolution(input: &[f32], ir: &[f32]) -> Vec<f32> {
        let mut out = vec![0.0; input.len()];
        for (n, o) in out.iter_mut().enumerate() {
            for (k, &h) in ir.iter().enumerate() {
                if k <= n {
                    *o += input[n - k] * h;
                }
            }
        }
        out
    }

    fn test_signal(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| ((i * 7919) % 97) as f32 / 97.0 - 0.5)
            .collect()
    }

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            assert!(
                (x - y).abs() < 1e-3 * (1.0 + y.abs()),
                "mismatch at {}: {} vs {}",
                i,
                x,
                y
            );
        }
    }

    #[test]
    fn test_rejects_invalid_input() {
        assert!(matches!(
            Convolver::new(&[], 10, 0.0),
            Err(ConvolverError::EmptyImpulse)
        ));
        assert!(matches!(
            Convolver::new(&[1.0], 4, 0.0),
            Err(ConvolverError::InvalidRank(4))
        ));
    }

    #[test]
    fn test_unit_impulse_is_identity() {
        let mut cv = Convolver::new(&[1.0], FFT_RANK_MIN, 0.0).unwrap();
        let input = test_signal(1000);
        let mut buf = input.clone();
        cv.process(&mut buf);
        assert_close(&buf, &input);
    }

    #[test]
    fn test_matches_direct_convolution() {
        let ir = test_signal(1500);
        let input = test_signal(3000);
        let expected = direct_convolution(&input, &ir);

        let mut cv = Convolver::new(&ir, FFT_RANK_MIN, 0.0).unwrap();
        let mut out = Vec::new();
        // Odd chunk sizes exercise partial blocks
        for chunk in input.chunks(77) {
            let mut buf = chunk.to_vec();
            cv.process(&mut buf);
            out.extend_from_slice(&buf);
        }
        assert_close(&out, &expected);
    }

    #[test]
    fn test_phase_offset_preserves_output() {
        let ir = test_signal(700);
        let input = test_signal(2048);
        let expected = direct_convolution(&input, &ir);

        for phase in [0.25, 0.5, 0.99] {
            let mut cv = Convolver::new(&ir, FFT_RANK_MIN + 1, phase).unwrap();
            let mut buf = input.clone();
            cv.process(&mut buf);
            assert_close(&buf, &expected);
        }
    }

    #[test]
    fn test_reset_restarts_from_silence() {
        let ir = test_signal(300);
        let input = test_signal(600);
        let mut cv = Convolver::new(&ir, FFT_RANK_MIN, 0.5).unwrap();

        let mut first = input.clone();
        cv.process(&mut first);
        cv.reset();
        let mut second = input.clone();
        cv.process(&mut second);
        assert_close(&first, &second);
    }
}
