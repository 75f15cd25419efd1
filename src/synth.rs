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

//! Voice synthesis.
//!
//! This module provides:
//! - Equal-tempered pitch math for sample transposition and the tone fallback
//! - Attack/sustain/release envelopes
//! - Per-note voices and the synthesizer that hands them to an output

use std::sync::Arc;

use tracing::debug;

use crate::audio::{ClockState, Output, OutputError};
use crate::note::Note;
use crate::samples::SampleBuffer;

pub mod envelope;
pub mod pitch;
mod voice;

pub use envelope::{Envelope, EnvelopeShape};
pub use voice::{
    PlaybackSource, SynthSettings, Voice, VoicePlan, VoiceState, MIN_DURATION, STOP_TAIL,
};

/// Errors scheduling a single voice.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("audio output unsupported: {0}")]
    Unsupported(String),

    #[error("audio output {0} is not running")]
    NotRunning(String),

    #[error("start time {0} is not a finite clock time")]
    InvalidTime(f64),

    #[error("unable to schedule voice: {0}")]
    Output(#[from] OutputError),
}

/// Builds voices and hands them to an output. Keeps no reference to a voice
/// once it has been submitted.
pub struct Synthesizer {
    output: Arc<dyn Output>,
    settings: SynthSettings,
}

impl Synthesizer {
    pub fn new(output: Arc<dyn Output>, settings: SynthSettings) -> Synthesizer {
        Synthesizer { output, settings }
    }

    pub fn settings(&self) -> &SynthSettings {
        &self.settings
    }

    /// Schedules one note to start at the absolute clock time
    /// `absolute_start`. With a sample the note is played by transposing the
    /// sample from `base_pitch`; without one it is played as a sine tone.
    ///
    /// The output must have been resumed first.
    pub fn schedule_voice(
        &self,
        note: &Note,
        absolute_start: f64,
        sample: Option<&Arc<SampleBuffer>>,
        base_pitch: u8,
    ) -> Result<VoicePlan, VoiceError> {
        if !absolute_start.is_finite() {
            return Err(VoiceError::InvalidTime(absolute_start));
        }
        match self.output.clock().state() {
            ClockState::Running => {}
            ClockState::Suspended => {
                return Err(VoiceError::NotRunning(self.output.to_string()));
            }
            ClockState::Closed => {
                return Err(VoiceError::Unsupported(format!(
                    "{} has been torn down",
                    self.output
                )));
            }
        }

        let plan = VoicePlan::new(
            note,
            absolute_start,
            sample.is_some(),
            base_pitch,
            &self.settings,
        );
        let voice = Voice::new(plan.clone(), sample.cloned(), self.output.sample_rate());
        let voice_id = voice.id();

        self.output.submit(voice).map_err(|e| match e {
            OutputError::Closed => VoiceError::Unsupported(e.to_string()),
            e => VoiceError::Output(e),
        })?;

        debug!(
            voice_id,
            pitch = plan.pitch(),
            start = plan.start(),
            duration = plan.duration(),
            source = ?plan.source(),
            "Voice scheduled"
        );
        Ok(plan)
    }
}

impl std::fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("output", &self.output.to_string())
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock;

    fn note(pitch: u8, duration: f64) -> Note {
        Note::new(pitch, 0.0, duration, 100).unwrap()
    }

    #[test]
    fn test_schedule_voice_submits_to_output() {
        let output = Arc::new(mock::Device::new("mock-synth", 44100, 2));
        output.resume().unwrap();
        let synth = Synthesizer::new(output.clone(), SynthSettings::default());
        let buffer = Arc::new(SampleBuffer::new(vec![vec![0.5; 100]], 44100).unwrap());

        let plan = synth
            .schedule_voice(&note(72, 0.5), 1.0, Some(&buffer), 60)
            .unwrap();
        assert_eq!(plan.source(), PlaybackSource::Sample { rate: 2.0 });
        assert_eq!(output.scheduled(), vec![plan]);

        // The voice holds its own reference to the buffer.
        assert_eq!(Arc::strong_count(&buffer), 2);
    }

    #[test]
    fn test_schedule_voice_clamps_duration() {
        let output = Arc::new(mock::Device::new("mock-synth", 44100, 2));
        output.resume().unwrap();
        let synth = Synthesizer::new(output, SynthSettings::default());

        let plan = synth.schedule_voice(&note(60, 0.01), 0.0, None, 60).unwrap();
        assert_eq!(plan.duration(), 0.05);
    }

    #[test]
    fn test_schedule_voice_before_resume() {
        let output = Arc::new(mock::Device::new("mock-synth", 44100, 2));
        let synth = Synthesizer::new(output.clone(), SynthSettings::default());

        let result = synth.schedule_voice(&note(60, 0.5), 0.0, None, 60);
        assert!(matches!(result, Err(VoiceError::NotRunning(_))));
        assert!(output.scheduled().is_empty());
        assert_eq!(output.active_voices(), 0);

        output.resume().unwrap();
        assert!(synth.schedule_voice(&note(60, 0.5), 0.0, None, 60).is_ok());
        assert_eq!(output.scheduled().len(), 1);
    }

    #[test]
    fn test_schedule_voice_rejects_bad_time() {
        let output = Arc::new(mock::Device::new("mock-synth", 44100, 2));
        let synth = Synthesizer::new(output, SynthSettings::default());

        let result = synth.schedule_voice(&note(60, 0.5), f64::NAN, None, 60);
        assert!(matches!(result, Err(VoiceError::InvalidTime(_))));
    }

    #[test]
    fn test_schedule_voice_after_teardown() {
        let output = Arc::new(mock::Device::new("mock-synth", 44100, 2));
        let synth = Synthesizer::new(output.clone(), SynthSettings::default());
        output.teardown();

        let result = synth.schedule_voice(&note(60, 0.5), 0.0, None, 60);
        assert!(matches!(result, Err(VoiceError::Unsupported(_))));
        assert!(output.scheduled().is_empty());
    }
}
