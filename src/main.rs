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
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use notesampler::audio::{self, ClockState};
use notesampler::config::Engine;
use notesampler::note::NoteSequence;
use notesampler::samples::{self, SampleCache};
use notesampler::scheduler::{PlayOutcome, Scheduler};
use tracing_subscriber::EnvFilter;

/// How often to check whether scheduled voices have finished.
const FINISH_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A note scheduler and sample player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Decodes a sample and prints its format.
    Sample {
        /// The path to the audio file.
        path: PathBuf,
    },
    /// Plays a note file (JSON or YAML) through the audio interface.
    Play {
        /// The path to the notes.
        notes: PathBuf,
        /// An audio file to play the notes with. Without one, notes are played
        /// as tones.
        #[arg[short, long]]
        sample: Option<PathBuf>,
        /// The pitch the sample was recorded at.
        #[arg[short, long]]
        base_pitch: Option<u8>,
        /// The path to the engine config.
        #[arg[short, long]]
        config: Option<PathBuf>,
        /// The device name to play through. Overrides the config.
        #[arg[short, long]]
        device: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Sample { path } => {
            let bytes = std::fs::read(&path)?;
            let buffer = samples::decode_async(bytes, extension(&path)).await?;
            println!("{}:", path.display());
            println!("- Channels: {}", buffer.channel_count());
            println!("- Sample rate: {}", buffer.sample_rate());
            println!("- Frames: {}", buffer.frames());
            println!("- Duration: {:?}", buffer.duration());
        }
        Commands::Play {
            notes,
            sample,
            base_pitch,
            config,
            device,
        } => {
            let mut engine = match config {
                Some(path) => Engine::load(&path)?,
                None => Engine::default(),
            };
            if let Some(device) = device {
                engine = engine.with_device(&device);
            }

            let notes = NoteSequence::load(&notes)?;
            let output = audio::get_device(&engine)?;
            let cache = Arc::new(SampleCache::new());

            let sample_id = match sample {
                Some(path) => {
                    let id = path.to_string_lossy().to_string();
                    let name = path
                        .file_name()
                        .map(|name| name.to_string_lossy().to_string())
                        .unwrap_or_else(|| id.clone());
                    let bytes = std::fs::read(&path)?;
                    let extension = extension(&path);
                    cache
                        .load(&id, &name, bytes, extension.as_deref(), None)
                        .await?;
                    Some(id)
                }
                None => None,
            };

            let scheduler = Scheduler::new(output.clone(), cache, &engine)?;
            let outcome = scheduler
                .play_sample_id(&notes, sample_id.as_deref(), base_pitch)
                .await;
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    output.teardown();
                    return Err(e.into());
                }
            };

            if let PlayOutcome::Scheduled { failed, .. } = &outcome {
                println!(
                    "Scheduled {} notes on {} ({} failed).",
                    outcome.voice_count(),
                    output,
                    failed
                );
            } else {
                println!("No notes to play.");
            }

            // Mock outputs only render on demand, so there's nothing to wait for.
            let renders = !engine.device().starts_with("mock");
            if let Some(end) = outcome.end_time().filter(|_| renders) {
                let clock = output.clock();
                while clock.state() == ClockState::Running && clock.now() < end {
                    tokio::time::sleep(FINISH_POLL_INTERVAL).await;
                }
            }
            output.teardown();
        }
    }

    Ok(())
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_string)
}
