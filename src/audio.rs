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
use std::{fmt, sync::Arc, time::Duration};

use crate::config;
use crate::synth::Voice;

pub mod clock;
pub mod cpal;
pub mod format;
pub mod mixer;
pub mod mock;
mod thread_priority;

pub use clock::{Clock, ClockState};
pub use format::{SampleFormat, TargetFormat};

/// Sends voices from the scheduling side to whatever renders the output.
pub type VoiceSender = crossbeam_channel::Sender<Voice>;

/// Errors produced by audio outputs.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("audio output unsupported: {0}")]
    Unsupported(String),

    #[error("audio output has been torn down")]
    Closed,

    #[error("audio output did not resume within {0:?}")]
    NotResumed(Duration),

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// An audio output sink. Owns the clock that every scheduling decision is made
/// against and accepts voices to render.
pub trait Output: fmt::Display + Send + Sync {
    /// The clock driven by this output.
    fn clock(&self) -> Arc<Clock>;

    /// The output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// The number of interleaved output channels.
    fn channels(&self) -> u16;

    /// Asks the output to start rendering. Calling this on a running output is
    /// a no-op. The clock reports `Running` once the output confirms it is live.
    fn resume(&self) -> Result<(), OutputError>;

    /// Hands a voice to the renderer. The output owns the voice from here on.
    fn submit(&self, voice: Voice) -> Result<(), OutputError>;

    /// Stops rendering and closes the clock. Further submissions fail.
    fn teardown(&self);
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Output>>, OutputError> {
    cpal::Device::list()
}

/// Gets the output described by the given configuration. Device names starting
/// with "mock" produce a mock output that renders nothing on its own.
pub fn get_device(config: &config::Engine) -> Result<Arc<dyn Output>, OutputError> {
    let device = config.device();
    if device.starts_with("mock") {
        let target_format = config
            .target_format()
            .map_err(|e| OutputError::Unsupported(e.to_string()))?;
        return Ok(Arc::new(mock::Device::new(
            device,
            target_format.sample_rate,
            config.channels(),
        )));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
