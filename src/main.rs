// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::info;
use tracing_subscriber::EnvFilter;

use injector::audio::resampler::MAX_CHANNELS;
use injector::injector::options::{MAX_PITCH, MIN_PITCH};
use injector::{config, sink, InjectorOptions, InjectorState, Resampler, Scheduler, Sound};

/// Input frames handed to the resampler per call when converting files.
const RESAMPLE_BLOCK_FRAMES: usize = 4096;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Timed audio injection and resampling."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plays a WAV file through the scheduler in real time.
    Play {
        /// The WAV file to play.
        path: PathBuf,
        /// Playback pitch; 2.0 plays an octave up in half the time.
        #[arg(short, long, default_value_t = 1.0)]
        pitch: f32,
        /// Playback volume, 0.0 to 1.0.
        #[arg(short, long, default_value_t = 1.0)]
        volume: f32,
        /// Loop the sound for this long, e.g. 5s.
        #[arg(short, long)]
        loop_for: Option<String>,
        /// The path to the scheduler config.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// WAV file to write the injected frames to. Frames are only counted
        /// when not set.
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Converts a WAV file to another sample rate.
    Resample {
        /// The WAV file to read.
        input: PathBuf,
        /// The WAV file to write.
        output: PathBuf,
        /// The output sample rate in Hz.
        #[arg(short, long)]
        rate: u32,
        /// Pitch shift applied during conversion.
        #[arg(short, long, default_value_t = 1.0)]
        pitch: f32,
    },
    /// Prints the frame count bounds of a rate conversion.
    Bounds {
        /// The input sample rate in Hz.
        input_rate: u32,
        /// The output sample rate in Hz.
        output_rate: u32,
        /// The frame count to compute bounds for.
        frames: usize,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            path,
            pitch,
            volume,
            loop_for,
            config,
            output,
        } => play(&path, pitch, volume, loop_for, config, output)?,
        Commands::Resample {
            input,
            output,
            rate,
            pitch,
        } => resample(&input, &output, rate, pitch)?,
        Commands::Bounds {
            input_rate,
            output_rate,
            frames,
        } => {
            if input_rate == 0 || output_rate == 0 {
                return Err("sample rates must be positive".into());
            }
            let resampler = Resampler::new(input_rate, output_rate, 1);
            let (up, down) = resampler.ratio();
            println!(
                "{} Hz -> {} Hz: {} (up {}, down {}, {} taps, {} kernel)",
                input_rate,
                output_rate,
                if resampler.is_rational() {
                    "rational"
                } else {
                    "irrational"
                },
                up,
                down,
                resampler.taps(),
                resampler.kernel_name(),
            );
            println!("min_output({}) = {}", frames, resampler.min_output(frames));
            println!("max_output({}) = {}", frames, resampler.max_output(frames));
            println!("min_input({}) = {}", frames, resampler.min_input(frames));
            println!("max_input({}) = {}", frames, resampler.max_input(frames));
        }
    }

    Ok(())
}

fn play(
    path: &Path,
    pitch: f32,
    volume: f32,
    loop_for: Option<String>,
    config: Option<PathBuf>,
    output: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let config = match config {
        Some(config) => config::load(&config)?,
        None => config::Scheduler::default(),
    };
    let loop_for: Option<Duration> = loop_for
        .map(|value| DurationString::from_string(value).map(Duration::from))
        .transpose()?;

    let sound = Sound::load(path, config.sample_rate())?;
    let sink = sink::get_sink(output.as_deref().unwrap_or("mock"), config.sample_rate())?;
    let scheduler = Scheduler::new(&config, sink)?;

    let options = InjectorOptions::default()
        .with_pitch(pitch)
        .with_volume(volume)
        .with_looping(loop_for.is_some());
    let start = Instant::now();
    let handle = scheduler.submit(sound, options)?;
    info!(id = %handle.id(), "Playing");

    if let Some(loop_for) = loop_for {
        thread::sleep(loop_for);
        handle.stop()?;
    }
    while handle.state() != InjectorState::Finished {
        thread::sleep(Duration::from_millis(10));
    }

    info!(
        id = %handle.id(),
        elapsed_ms = start.elapsed().as_millis(),
        "Playback finished"
    );
    scheduler.shutdown();
    Ok(())
}

fn resample(input: &Path, output: &Path, rate: u32, pitch: f32) -> Result<(), Box<dyn Error>> {
    if rate == 0 {
        return Err("output rate must be positive".into());
    }

    let mut reader = WavReader::open(input)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 || channels > MAX_CHANNELS {
        return Err(format!(
            "{} has {} channels; at most {} are supported",
            input.display(),
            channels,
            MAX_CHANNELS
        )
        .into());
    }

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    let pitch = if pitch.is_nan() {
        1.0
    } else {
        pitch.clamp(MIN_PITCH, MAX_PITCH)
    };
    let conversion_rate = ((rate as f64 / pitch as f64) as u32).max(1);
    let mut resampler = Resampler::new(spec.sample_rate, conversion_rate, channels);
    let mut writer = WavWriter::create(
        output,
        WavSpec {
            channels: spec.channels,
            sample_rate: rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;

    let mut out = vec![0.0f32; resampler.max_output(RESAMPLE_BLOCK_FRAMES) * channels];
    let mut written = 0;
    for block in samples.chunks(RESAMPLE_BLOCK_FRAMES * channels) {
        let frames = block.len() / channels;
        let made = resampler.render_interleaved(block, &mut out, frames);
        for sample in &out[..made * channels] {
            writer.write_sample(*sample)?;
        }
        written += made;
    }
    writer.finalize()?;

    info!(
        input = ?input,
        output = ?output,
        source_rate = spec.sample_rate,
        rate,
        pitch,
        frames_in = samples.len() / channels,
        frames_out = written,
        "Resampled"
    );
    Ok(())
}
