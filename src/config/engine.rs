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
use std::{path::Path, str::FromStr, time::Duration};

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::{SampleFormat, TargetFormat};
use crate::note::MAX_MIDI_VALUE;
use crate::samples::DEFAULT_BASE_PITCH;
use crate::synth::{EnvelopeShape, SynthSettings};

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 2;
const DEFAULT_BITS_PER_SAMPLE: u16 = 32;
const DEFAULT_LEAD_IN: Duration = Duration::from_millis(100);
const DEFAULT_RESUME_TIMEOUT: Duration = Duration::from_secs(2);

/// Overrides for one envelope shape. Unset fields keep the built-in value.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct EnvelopeConfig {
    /// Attack window, e.g. "20ms".
    attack: Option<String>,

    /// Release window, e.g. "30ms".
    release: Option<String>,

    /// Sustain level at full velocity, between 0 and 1.
    peak: Option<f64>,
}

impl EnvelopeConfig {
    fn apply(
        &self,
        shape: EnvelopeShape,
        key: &'static str,
    ) -> Result<EnvelopeShape, ConfigError> {
        let attack = match &self.attack {
            Some(attack) => parse_duration(key, attack)?.as_secs_f64(),
            None => shape.attack,
        };
        let release = match &self.release {
            Some(release) => parse_duration(key, release)?.as_secs_f64(),
            None => shape.release,
        };
        let peak = self.peak.unwrap_or(shape.peak);
        if !(0.0..=1.0).contains(&peak) {
            return Err(ConfigError::Invalid {
                key,
                reason: format!("peak {} is outside 0..=1", peak),
            });
        }

        Ok(EnvelopeShape {
            attack,
            release,
            peak,
        })
    }
}

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Engine {
    /// The audio device (default: the host's default output).
    device: Option<String>,

    /// Target sample rate in Hz (default: 44100)
    sample_rate: Option<u32>,

    /// Output channel count (default: 2)
    channels: Option<u16>,

    /// Target sample format (default: "float")
    sample_format: Option<String>,

    /// Target bits per sample (default: 32)
    bits_per_sample: Option<u16>,

    /// Delay between the clock reading taken at play time and the first note.
    lead_in: Option<String>,

    /// How long to wait for a suspended output to start rendering.
    resume_timeout: Option<String>,

    /// Shortest note duration that will be scheduled.
    min_duration: Option<String>,

    /// Time a voice keeps running after its envelope ends.
    tail: Option<String>,

    /// Pitch samples are assumed to be recorded at.
    base_pitch: Option<u8>,

    sample_envelope: Option<EnvelopeConfig>,

    tone_envelope: Option<EnvelopeConfig>,
}

impl Engine {
    /// Creates an engine configuration for the given device with everything
    /// else at its default.
    pub fn new(device: &str) -> Engine {
        Engine {
            device: Some(device.to_string()),
            ..Default::default()
        }
    }

    /// Parse an engine configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Engine, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Engine>()?)
    }

    /// Replaces the configured device.
    pub fn with_device(mut self, device: &str) -> Engine {
        self.device = Some(device.to_string());
        self
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Returns the target sample rate (default: 44100)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the output channel count (default: 2)
    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS).max(1)
    }

    /// Returns the target sample format (default: Float)
    pub fn sample_format(&self) -> Result<SampleFormat, ConfigError> {
        match self.sample_format.as_deref() {
            Some(format) => SampleFormat::from_str(format).map_err(|e| ConfigError::Invalid {
                key: "sample_format",
                reason: e.to_string(),
            }),
            None => Ok(SampleFormat::Float),
        }
    }

    /// Returns the target bits per sample (default: 32)
    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample.unwrap_or(DEFAULT_BITS_PER_SAMPLE)
    }

    /// Returns the validated output stream format.
    pub fn target_format(&self) -> Result<TargetFormat, ConfigError> {
        TargetFormat::new(
            self.sample_rate(),
            self.sample_format()?,
            self.bits_per_sample(),
        )
        .map_err(|e| ConfigError::Invalid {
            key: "bits_per_sample",
            reason: e.to_string(),
        })
    }

    /// Returns the lead-in (default: 100ms)
    pub fn lead_in(&self) -> Result<Duration, ConfigError> {
        optional_duration("lead_in", &self.lead_in, DEFAULT_LEAD_IN)
    }

    /// Returns the resume timeout (default: 2s)
    pub fn resume_timeout(&self) -> Result<Duration, ConfigError> {
        optional_duration("resume_timeout", &self.resume_timeout, DEFAULT_RESUME_TIMEOUT)
    }

    /// Returns the default base pitch (default: 60)
    pub fn base_pitch(&self) -> Result<u8, ConfigError> {
        let base_pitch = self.base_pitch.unwrap_or(DEFAULT_BASE_PITCH);
        if base_pitch > MAX_MIDI_VALUE {
            return Err(ConfigError::Invalid {
                key: "base_pitch",
                reason: format!("{} is not a MIDI pitch", base_pitch),
            });
        }
        Ok(base_pitch)
    }

    /// Returns the voice timing and envelope settings.
    pub fn synth_settings(&self) -> Result<SynthSettings, ConfigError> {
        let defaults = SynthSettings::default();
        let sample_envelope = match &self.sample_envelope {
            Some(envelope) => envelope.apply(defaults.sample_envelope, "sample_envelope")?,
            None => defaults.sample_envelope,
        };
        let tone_envelope = match &self.tone_envelope {
            Some(envelope) => envelope.apply(defaults.tone_envelope, "tone_envelope")?,
            None => defaults.tone_envelope,
        };

        let min_duration = match &self.min_duration {
            Some(value) => parse_duration("min_duration", value)?.as_secs_f64(),
            None => defaults.min_duration,
        };
        let tail = match &self.tail {
            Some(value) => parse_duration("tail", value)?.as_secs_f64(),
            None => defaults.tail,
        };

        Ok(SynthSettings {
            min_duration,
            tail,
            sample_envelope,
            tone_envelope,
        })
    }
}

fn parse_duration(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    DurationString::from_string(value.to_string())
        .map(Duration::from)
        .map_err(|e| ConfigError::Duration {
            key,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn optional_duration(
    key: &'static str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => parse_duration(key, value),
        None => Ok(default),
    }
}
