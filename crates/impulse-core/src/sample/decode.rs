//! Impulse file decoding (Symphonia) and sample rate conversion (Rubato)

use std::fs::File;
use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::Sample;
use crate::error::TaskError;
use crate::types::millis_to_samples;

impl Sample {
    /// Decode an audio file into a planar sample
    ///
    /// Decoding stops once `max_duration_ms` worth of frames has been read, so
    /// over-long files are truncated rather than rejected. The result keeps
    /// the file's own sample rate.
    pub fn load(path: &Path, max_duration_ms: f32) -> Result<Self, TaskError> {
        let file = File::open(path).map_err(|_| TaskError::NotFound(path.to_path_buf()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| TaskError::Decode(e.to_string()))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| TaskError::Decode("No audio track found".to_string()))?;
        let track_id = track.id;
        let track_frames = track.codec_params.n_frames.map(|n| n as usize);

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| TaskError::Decode("Unknown sample rate".to_string()))?;
        let max_frames = millis_to_samples(sample_rate, max_duration_ms);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| TaskError::Decode(e.to_string()))?;

        let mut channels: Vec<Vec<f32>> = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;
        let mut buf_capacity = 0u64;
        let mut frames = 0usize;

        while frames < max_frames {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => {
                    if frames == 0 {
                        return Err(TaskError::Decode(e.to_string()));
                    }
                    log::warn!("[LOAD] Error reading packet from {:?}: {}", path, e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("[LOAD] Skipping corrupt packet in {:?}: {}", path, e);
                    continue;
                }
                Err(e) => return Err(TaskError::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            let n_channels = spec.channels.count();
            if n_channels == 0 {
                return Err(TaskError::Decode("Stream has no channels".to_string()));
            }
            if channels.is_empty() {
                let hint = track_frames.map_or(max_frames, |n| n.min(max_frames));
                channels
                    .try_reserve_exact(n_channels)
                    .map_err(|_| TaskError::NoMemory("decode"))?;
                for _ in 0..n_channels {
                    let mut channel = Vec::new();
                    channel
                        .try_reserve_exact(hint)
                        .map_err(|_| TaskError::NoMemory("decode"))?;
                    channels.push(channel);
                }
            }

            let capacity = decoded.capacity() as u64;
            if sample_buf.is_none() || capacity > buf_capacity {
                sample_buf = Some(SampleBuffer::new(capacity, spec));
                buf_capacity = capacity;
            }

            if let Some(ref mut buf) = sample_buf {
                buf.copy_interleaved_ref(decoded);
                let take = (buf.samples().len() / n_channels).min(max_frames - frames);
                for channel in channels.iter_mut() {
                    channel
                        .try_reserve(take)
                        .map_err(|_| TaskError::NoMemory("decode"))?;
                }
                for frame in buf.samples().chunks_exact(n_channels).take(take) {
                    for (channel, &s) in channels.iter_mut().zip(frame.iter()) {
                        channel.push(s);
                    }
                }
                frames += take;
            }
        }

        log::debug!(
            "[LOAD] Decoded {:?}: {} channels, {} frames @ {} Hz",
            path,
            channels.len(),
            frames,
            sample_rate
        );

        Ok(Sample::from_channels(channels, sample_rate))
    }

    /// Convert the sample to `target_rate`
    ///
    /// The flushed resampler output is already delay-aligned, so the impulse
    /// onset stays at frame zero. The output is trimmed or padded to exactly
    /// `ceil(len * target / source)` frames.
    pub fn resample(self, target_rate: u32) -> Result<Self, TaskError> {
        let source_rate = self.sample_rate;
        if source_rate == target_rate || self.is_empty() || self.channels() == 0 {
            return Ok(Self {
                sample_rate: target_rate,
                ..self
            });
        }
        if source_rate == 0 || target_rate == 0 {
            return Err(TaskError::Resample(format!(
                "invalid rates {} -> {}",
                source_rate, target_rate
            )));
        }

        let ratio = target_rate as f64 / source_rate as f64;
        let frames = self.len();
        let expected = (frames as f64 * ratio).ceil() as usize;

        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        };

        let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, frames, self.channels())
            .map_err(|e| TaskError::Resample(e.to_string()))?;

        let mut result = resampler
            .process(&self.channels, None)
            .map_err(|e| TaskError::Resample(e.to_string()))?;

        // Flush the filter tail so the last samples are not lost
        let tail = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| TaskError::Resample(e.to_string()))?;
        for (channel, tail) in result.iter_mut().zip(tail.iter()) {
            channel.extend_from_slice(tail);
        }

        for channel in result.iter_mut() {
            channel.resize(expected, 0.0);
        }

        log::debug!(
            "[LOAD] Resampled {} -> {} Hz: {} -> {} frames",
            source_rate,
            target_rate,
            frames,
            expected
        );

        Ok(Sample::from_channels(result, target_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, channels: u16, rate: u32, frames: &[Vec<f32>]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for frame in frames {
            for &s in frame {
                writer.write_sample(s).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_stereo_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ir.wav");
        let frames: Vec<Vec<f32>> = (0..1000).map(|i| vec![i as f32 / 1000.0, -0.5]).collect();
        write_wav(&path, 2, 48000, &frames);

        let sample = Sample::load(&path, 10000.0).unwrap();
        assert_eq!(sample.channels(), 2);
        assert_eq!(sample.len(), 1000);
        assert_eq!(sample.sample_rate(), 48000);
        assert!((sample.channel(0)[500] - 0.5).abs() < 1e-6);
        assert_eq!(sample.channel(1)[999], -0.5);
    }

    #[test]
    fn test_load_truncates_to_max_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        let frames: Vec<Vec<f32>> = (0..4800).map(|_| vec![0.25]).collect();
        write_wav(&path, 1, 48000, &frames);

        // 50 ms at 48 kHz
        let sample = Sample::load(&path, 50.0).unwrap();
        assert_eq!(sample.len(), 2400);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Sample::load(Path::new("/nonexistent/ir.wav"), 1000.0).unwrap_err();
        assert!(matches!(err, TaskError::NotFound(_)));
    }

    #[test]
    fn test_load_garbage_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"this is not audio at all").unwrap();
        let err = Sample::load(&path, 1000.0).unwrap_err();
        assert!(matches!(err, TaskError::Decode(_)));
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let sample = Sample::from_channels(vec![vec![1.0, 0.5, 0.25]], 48000);
        let out = sample.clone().resample(48000).unwrap();
        assert_eq!(out, sample);
    }

    #[test]
    fn test_resample_length_and_onset() {
        let mut data = vec![0.0f32; 4410];
        data[100] = 1.0;
        let sample = Sample::from_channels(vec![data], 44100);

        let out = sample.resample(48000).unwrap();
        assert_eq!(out.sample_rate(), 48000);
        assert_eq!(out.len(), 4800);

        // Onset of the click stays where it was in time (100 frames @ 44.1k ≈ 108.8 @ 48k)
        let peak = out
            .channel(0)
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(i, _)| i)
            .unwrap();
        assert!((107..=111).contains(&peak), "peak at {}", peak);
    }

    #[test]
    fn test_resample_keeps_direct_sound_at_frame_zero() {
        let mut data = vec![0.0f32; 4410];
        data[0] = 1.0;
        let sample = Sample::from_channels(vec![data], 44100);

        let out = sample.resample(48000).unwrap();
        let channel = out.channel(0);
        let energy: f32 = channel.iter().map(|s| s * s).sum();
        let peak = channel
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(i, _)| i)
            .unwrap();

        assert!(peak <= 1, "peak at {}", peak);
        assert!(channel[peak].abs() > 0.5);
        assert!(energy > 0.5, "energy {}", energy);
    }
}
