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
use std::time::Duration;

use super::DecodeError;

/// The pitch a sample is assumed to have been recorded at when nothing says
/// otherwise (middle C).
pub const DEFAULT_BASE_PITCH: u8 = 60;

/// Decoded audio held in memory, one plane per channel. Never mutated after
/// construction; share it with `Arc`.
#[derive(Debug, PartialEq)]
pub struct SampleBuffer {
    planes: Vec<Vec<f32>>,
    sample_rate: u32,
    frames: usize,
    base_pitch: Option<u8>,
}

impl SampleBuffer {
    /// Creates a buffer from per-channel planes. All planes must hold the same
    /// number of frames and there must be at least one frame.
    pub fn new(planes: Vec<Vec<f32>>, sample_rate: u32) -> Result<SampleBuffer, DecodeError> {
        if planes.is_empty() {
            return Err(DecodeError::Invalid("no channels".to_string()));
        }
        if sample_rate == 0 {
            return Err(DecodeError::NoSampleRate);
        }
        let frames = planes[0].len();
        if frames == 0 {
            return Err(DecodeError::Empty);
        }
        if planes.iter().any(|plane| plane.len() != frames) {
            return Err(DecodeError::Invalid(
                "channels have different lengths".to_string(),
            ));
        }

        Ok(SampleBuffer {
            planes,
            sample_rate,
            frames,
            base_pitch: None,
        })
    }

    /// Builds a buffer from interleaved samples.
    pub fn from_interleaved(
        samples: &[f32],
        channels: u16,
        sample_rate: u32,
    ) -> Result<SampleBuffer, DecodeError> {
        let channels = channels as usize;
        if channels == 0 {
            return Err(DecodeError::Invalid("no channels".to_string()));
        }
        let frames = samples.len() / channels;
        let mut planes = vec![Vec::with_capacity(frames); channels];
        for frame in samples.chunks_exact(channels) {
            for (plane, sample) in planes.iter_mut().zip(frame) {
                plane.push(*sample);
            }
        }
        SampleBuffer::new(planes, sample_rate)
    }

    /// Records the pitch the sample was recorded at.
    pub fn with_base_pitch(mut self, base_pitch: u8) -> SampleBuffer {
        self.base_pitch = Some(base_pitch);
        self
    }

    /// The recorded pitch, if one was given.
    pub fn base_pitch(&self) -> Option<u8> {
        self.base_pitch
    }

    pub fn channel_count(&self) -> u16 {
        self.planes.len() as u16
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames as f64 / f64::from(self.sample_rate))
    }

    /// The samples of one channel.
    pub fn channel(&self, channel: usize) -> Option<&[f32]> {
        self.planes.get(channel).map(Vec::as_slice)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.planes.len() * self.frames * std::mem::size_of::<f32>()
    }

    /// Reads a channel at a fractional frame position, interpolating linearly
    /// between neighbouring frames. Out of range positions read as silence.
    pub fn value_at(&self, channel: usize, position: f64) -> f32 {
        let Some(plane) = self.planes.get(channel) else {
            return 0.0;
        };
        if position < 0.0 {
            return 0.0;
        }
        let index = position.floor() as usize;
        let Some(s0) = plane.get(index).copied() else {
            return 0.0;
        };
        let s1 = plane.get(index + 1).copied().unwrap_or(s0);
        let frac = position.fract() as f32;
        s0 + (s1 - s0) * frac
    }
}
