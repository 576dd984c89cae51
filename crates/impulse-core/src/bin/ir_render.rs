//! ir-render - render a WAV file through the impulse reverb engine offline
//!
//! Usage: `ir-render <job.yaml>`
//!
//! The job file (see `RenderJob`) names the dry input, the output file, the
//! impulse files and the mixing controls. Relative paths are resolved against
//! the job file's directory. Set RUST_LOG=debug for task-level logging.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use impulse_core::config::{
    default_engine_config_path, load_config, read_config, EngineConfig, RenderJob,
};
use impulse_core::engine::ReverbEngine;
use impulse_core::task::ThreadPoolExecutor;
use impulse_core::{millis_to_samples, LoadStatus, NUM_SLOTS};

/// Frames per engine call
const RENDER_BLOCK: usize = 1024;

/// How long to wait for loads and kernel builds before giving up
const SETTLE_TIMEOUT: Duration = Duration::from_secs(120);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(job_path) = args.get(1).map(PathBuf::from) else {
        bail!("usage: ir-render <job.yaml>");
    };

    let job: RenderJob = read_config(&job_path)?;
    let base = job_path.parent().unwrap_or(Path::new("."));

    let input_path = resolve(base, &job.input);
    let (mut input, sample_rate) = read_input(&input_path)?;
    log::info!(
        "Input {:?}: {} channel(s), {} frames at {} Hz",
        input_path,
        input.len(),
        input.first().map_or(0, Vec::len),
        sample_rate
    );

    let base_config: EngineConfig = match &job.engine {
        Some(config) => config.clone(),
        None => load_config(&default_engine_config_path()),
    };
    let config = EngineConfig {
        sample_rate,
        inputs: input.len(),
        ..base_config
    };
    let executor = Arc::new(ThreadPoolExecutor::new(
        config.worker_threads,
        config.task_queue_capacity,
    ));
    let (mut engine, mut sender) = ReverbEngine::new(&config, executor);

    job.apply(engine.params_mut());
    for (file, path) in job.file_paths() {
        let path = resolve(base, path);
        log::info!("File {}: {:?}", file + 1, path);
        if !sender.set_file_path(file, Some(path)) {
            bail!("command queue full while queueing impulse files");
        }
    }

    settle(&mut engine)?;
    for (file, _) in job.file_paths() {
        let status = engine.file_status(file);
        if status != LoadStatus::Ok {
            log::warn!("File {}: {}", file + 1, status.name());
        }
    }
    let active = (0..NUM_SLOTS).filter(|&s| engine.slot_active(s)).count();
    log::info!("{} of {} slots active", active, NUM_SLOTS);

    // Append silence for the reverb tail
    let tail = millis_to_samples(sample_rate, job.tail_ms);
    for channel in input.iter_mut() {
        channel.resize(channel.len() + tail, 0.0);
    }
    let (left, right) = render(&mut engine, &input);

    let output_path = resolve(base, &job.output);
    write_output(&output_path, sample_rate, &left, &right)?;
    log::info!("Wrote {:?} ({} frames)", output_path, left.len());

    Ok(())
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Feed silent blocks until every requested load and rebuild is published
fn settle(engine: &mut ReverbEngine) -> Result<()> {
    let silence = vec![0.0f32; RENDER_BLOCK];
    let inputs: Vec<&[f32]> = vec![&silence[..]; engine.inputs()];
    let mut left = vec![0.0f32; RENDER_BLOCK];
    let mut right = vec![0.0f32; RENDER_BLOCK];

    let start = Instant::now();
    loop {
        engine.process(&inputs, &mut left, &mut right);
        if engine.is_settled() {
            log::info!("Engine ready after {:.2?}", start.elapsed());
            return Ok(());
        }
        if start.elapsed() > SETTLE_TIMEOUT {
            bail!("timed out waiting for impulse files to load");
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn render(engine: &mut ReverbEngine, input: &[Vec<f32>]) -> (Vec<f32>, Vec<f32>) {
    let frames = input.first().map_or(0, Vec::len);
    let mut left = vec![0.0f32; frames];
    let mut right = vec![0.0f32; frames];

    let mut offset = 0;
    while offset < frames {
        let count = (frames - offset).min(RENDER_BLOCK);
        let block: Vec<&[f32]> = input.iter().map(|c| &c[offset..offset + count]).collect();
        engine.process(
            &block,
            &mut left[offset..offset + count],
            &mut right[offset..offset + count],
        );
        offset += count;
    }
    (left, right)
}

/// Read up to two channels of a WAV file as f32
fn read_input(path: &Path) -> Result<(Vec<Vec<f32>>, u32)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        bail!("{:?} has no channels", path);
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .with_context(|| format!("Failed to decode {:?}", path))?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .with_context(|| format!("Failed to decode {:?}", path))?
        }
    };

    let used = channels.min(2);
    let mut out = vec![Vec::with_capacity(interleaved.len() / channels); used];
    for frame in interleaved.chunks_exact(channels) {
        for (c, dst) in out.iter_mut().enumerate() {
            dst.push(frame[c]);
        }
    }
    if channels > used {
        log::warn!("{:?}: using the first {} of {} channels", path, used, channels);
    }
    Ok((out, spec.sample_rate))
}

fn write_output(path: &Path, sample_rate: u32, left: &[f32], right: &[f32]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).with_context(|| format!("Failed to create {:?}", path))?;
    for (&l, &r) in left.iter().zip(right.iter()) {
        writer.write_sample(l)?;
        writer.write_sample(r)?;
    }
    writer.finalize().context("Failed to finalize output WAV")?;
    Ok(())
}
