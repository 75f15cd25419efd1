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

//! Per-note voices.
//!
//! A [`VoicePlan`] is the pure arithmetic of a voice: where it starts, how it
//! is pitched, what its envelope looks like and when it stops. A [`Voice`] is
//! that plan bound to a generator and converted to frames, ready to be mixed.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::envelope::{Envelope, EnvelopeShape};
use super::pitch::{playback_rate, tone_frequency};
use crate::audio::clock::seconds_to_frame;
use crate::note::{Note, MAX_MIDI_VALUE};
use crate::samples::SampleBuffer;

/// Global voice ID counter.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// Shortest duration a voice will be scheduled for, in seconds.
pub const MIN_DURATION: f64 = 0.05;

/// Time a voice keeps running past its envelope end, in seconds.
pub const STOP_TAIL: f64 = 0.1;

/// Timing and envelope parameters shared by every voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthSettings {
    /// Floor applied to note durations.
    pub min_duration: f64,
    /// Time between envelope end and hard stop.
    pub tail: f64,
    /// Envelope for sample playback.
    pub sample_envelope: EnvelopeShape,
    /// Envelope for the tone fallback.
    pub tone_envelope: EnvelopeShape,
}

impl Default for SynthSettings {
    fn default() -> Self {
        SynthSettings {
            min_duration: MIN_DURATION,
            tail: STOP_TAIL,
            sample_envelope: EnvelopeShape::SAMPLE,
            tone_envelope: EnvelopeShape::TONE,
        }
    }
}

/// What produces sound for a voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackSource {
    /// A sample buffer resampled by `rate`.
    Sample { rate: f64 },
    /// A sine tone at `frequency` Hz.
    Tone { frequency: f64 },
}

/// The computed schedule for one note.
#[derive(Debug, Clone, PartialEq)]
pub struct VoicePlan {
    pitch: u8,
    source: PlaybackSource,
    start: f64,
    duration: f64,
    stop: f64,
    envelope: Envelope,
}

impl VoicePlan {
    /// Plans a voice for `note` starting at the absolute clock time
    /// `absolute_start`. Velocity is expected to be in MIDI range already.
    pub fn new(
        note: &Note,
        absolute_start: f64,
        has_sample: bool,
        base_pitch: u8,
        settings: &SynthSettings,
    ) -> VoicePlan {
        let duration = note.duration().max(settings.min_duration);
        let velocity_gain = f64::from(note.velocity()) / f64::from(MAX_MIDI_VALUE);

        let (source, shape) = if has_sample {
            (
                PlaybackSource::Sample {
                    rate: playback_rate(note.pitch(), base_pitch),
                },
                settings.sample_envelope,
            )
        } else {
            (
                PlaybackSource::Tone {
                    frequency: tone_frequency(note.pitch()),
                },
                settings.tone_envelope,
            )
        };

        VoicePlan {
            pitch: note.pitch(),
            source,
            start: absolute_start,
            duration,
            stop: absolute_start + duration + settings.tail.max(0.0),
            envelope: Envelope::new(shape, velocity_gain, duration),
        }
    }

    /// The MIDI pitch this voice sounds.
    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn source(&self) -> PlaybackSource {
        self.source
    }

    /// Absolute clock time the voice starts at.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Effective duration after the minimum clamp.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Absolute clock time the voice is hard-stopped at.
    pub fn stop(&self) -> f64 {
        self.stop
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }
}

/// Lifecycle of a voice. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VoiceState {
    Scheduled,
    Playing,
    Releasing,
    Stopped,
}

enum Generator {
    Sample {
        buffer: Arc<SampleBuffer>,
        /// Fractional read position in source frames.
        position: f64,
        /// Source frames advanced per output frame.
        step: f64,
    },
    Tone {
        /// Phase in cycles, kept in [0, 1).
        phase: f64,
        /// Cycles advanced per output frame.
        increment: f64,
    },
}

/// A voice bound to an output rate, ready to be mixed.
pub struct Voice {
    id: u64,
    plan: VoicePlan,
    generator: Generator,
    sample_rate: f64,
    start_frame: u64,
    release_frame: u64,
    stop_frame: u64,
    state: VoiceState,
}

impl Voice {
    /// Binds a plan to a generator at the given output rate. When the plan is
    /// for a sample, `sample` must carry the buffer; without one the voice
    /// falls back to the tone for the plan's pitch.
    pub fn new(plan: VoicePlan, sample: Option<Arc<SampleBuffer>>, sample_rate: u32) -> Voice {
        let rate = f64::from(sample_rate);
        let generator = match (plan.source, sample) {
            (PlaybackSource::Sample { rate: playback }, Some(buffer)) => Generator::Sample {
                step: playback * f64::from(buffer.sample_rate()) / rate,
                buffer,
                position: 0.0,
            },
            (PlaybackSource::Tone { frequency }, _) => Generator::Tone {
                phase: 0.0,
                increment: frequency / rate,
            },
            (PlaybackSource::Sample { .. }, None) => Generator::Tone {
                phase: 0.0,
                increment: tone_frequency(plan.pitch) / rate,
            },
        };

        let start_frame = seconds_to_frame(plan.start, sample_rate);
        let release_frame =
            seconds_to_frame(plan.start + plan.envelope.release_start(), sample_rate);
        let stop_frame = seconds_to_frame(plan.stop, sample_rate).max(start_frame);

        Voice {
            id: NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed),
            plan,
            generator,
            sample_rate: rate,
            start_frame,
            release_frame,
            stop_frame,
            state: VoiceState::Scheduled,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn plan(&self) -> &VoicePlan {
        &self.plan
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    /// First frame the voice sounds on.
    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    /// Frame at which the voice is stopped and released.
    pub fn stop_frame(&self) -> u64 {
        self.stop_frame
    }

    pub fn is_finished(&self) -> bool {
        self.state == VoiceState::Stopped
    }

    /// Adds this voice into an interleaved block whose first frame is
    /// `block_start` on the clock.
    pub fn render(&mut self, output: &mut [f32], channels: usize, block_start: u64) {
        if self.state == VoiceState::Stopped || channels == 0 {
            return;
        }
        let frames = output.len() / channels;
        let block_end = block_start + frames as u64;
        if block_end <= self.start_frame {
            return;
        }
        if block_start >= self.stop_frame {
            self.state = VoiceState::Stopped;
            return;
        }

        let first = self.start_frame.saturating_sub(block_start) as usize;
        for index in first..frames {
            let frame = block_start + index as u64;
            if frame >= self.stop_frame {
                self.state = VoiceState::Stopped;
                return;
            }
            self.state = if frame >= self.release_frame {
                VoiceState::Releasing
            } else {
                VoiceState::Playing
            };

            let t = (frame - self.start_frame) as f64 / self.sample_rate;
            let gain = self.plan.envelope.gain_at(t) as f32;
            let out = &mut output[index * channels..(index + 1) * channels];
            self.generator.next_frame(out, gain);
        }

        if block_end >= self.stop_frame {
            self.state = VoiceState::Stopped;
        }
    }
}

impl Generator {
    /// Adds one frame scaled by `gain` into `out` and advances.
    fn next_frame(&mut self, out: &mut [f32], gain: f32) {
        match self {
            Generator::Sample {
                buffer,
                position,
                step,
            } => {
                if (*position as usize) < buffer.frames() {
                    let source_channels = buffer.channel_count() as usize;
                    for (channel, sample) in out.iter_mut().enumerate() {
                        *sample += buffer.value_at(channel % source_channels, *position) * gain;
                    }
                }
                *position += *step;
            }
            Generator::Tone { phase, increment } => {
                let value = (TAU * *phase).sin() as f32 * gain;
                for sample in out.iter_mut() {
                    *sample += value;
                }
                *phase = (*phase + *increment).fract();
            }
        }
    }
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("id", &self.id)
            .field("pitch", &self.plan.pitch)
            .field("start_frame", &self.start_frame)
            .field("stop_frame", &self.stop_frame)
            .field("state", &self.state)
            .finish()
    }
}
