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

//! Turns note sequences into scheduled voices.
//!
//! Every note of one `play` call is placed relative to a single anchor taken
//! from the output clock, so the authored spacing between notes is kept no
//! matter how long scheduling itself takes.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, span, warn, Level};

use crate::audio::{ClockState, Output, OutputError};
use crate::config::{self, ConfigError};
use crate::note::NoteSequence;
use crate::samples::{SampleBuffer, SampleCache};
use crate::synth::{Synthesizer, VoicePlan};

/// Errors that fail a whole `play` call.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("audio environment unsupported: {0}")]
    EnvironmentUnsupported(String),

    #[error("audio output did not resume within {0:?}")]
    NotResumed(Duration),
}

/// What a `play` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    /// There were no notes; nothing was scheduled.
    Empty,
    /// Voices were handed to the output.
    Scheduled {
        /// Absolute clock time that note start times are relative to.
        anchor: f64,
        /// Plans of the voices that were scheduled.
        voices: Vec<VoicePlan>,
        /// Notes that could not be scheduled.
        failed: usize,
    },
}

impl PlayOutcome {
    /// Number of voices scheduled.
    pub fn voice_count(&self) -> usize {
        match self {
            PlayOutcome::Empty => 0,
            PlayOutcome::Scheduled { voices, .. } => voices.len(),
        }
    }

    /// The latest stop time of any scheduled voice.
    pub fn end_time(&self) -> Option<f64> {
        match self {
            PlayOutcome::Empty => None,
            PlayOutcome::Scheduled { voices, .. } => voices
                .iter()
                .map(VoicePlan::stop)
                .max_by(|a, b| a.total_cmp(b)),
        }
    }
}

/// Schedules note sequences against an output.
pub struct Scheduler {
    output: Arc<dyn Output>,
    cache: Arc<SampleCache>,
    synth: Synthesizer,
    lead_in: Duration,
    resume_timeout: Duration,
    default_base_pitch: u8,
}

impl Scheduler {
    /// Creates a scheduler for the given output and cache.
    pub fn new(
        output: Arc<dyn Output>,
        cache: Arc<SampleCache>,
        config: &config::Engine,
    ) -> Result<Scheduler, ConfigError> {
        Ok(Scheduler {
            synth: Synthesizer::new(output.clone(), config.synth_settings()?),
            output,
            cache,
            lead_in: config.lead_in()?,
            resume_timeout: config.resume_timeout()?,
            default_base_pitch: config.base_pitch()?,
        })
    }

    pub fn cache(&self) -> &Arc<SampleCache> {
        &self.cache
    }

    pub fn output(&self) -> &Arc<dyn Output> {
        &self.output
    }

    /// Plays a note sequence with an optional sample. Returns as soon as every
    /// voice has been handed to the output; playback itself is not awaited.
    ///
    /// The base pitch used to transpose the sample is, in order of preference,
    /// `base_pitch`, the sample's own base pitch, and the configured default.
    pub async fn play(
        &self,
        notes: &NoteSequence,
        sample: Option<Arc<SampleBuffer>>,
        base_pitch: Option<u8>,
    ) -> Result<PlayOutcome, PlaybackError> {
        if notes.is_empty() {
            info!("No notes to play");
            return Ok(PlayOutcome::Empty);
        }

        self.ensure_running().await?;

        let span = span!(Level::INFO, "play", notes = notes.len());
        let _enter = span.enter();

        let anchor = self.output.clock().now() + self.lead_in.as_secs_f64();
        let base_pitch = base_pitch
            .or_else(|| sample.as_ref().and_then(|sample| sample.base_pitch()))
            .unwrap_or(self.default_base_pitch);

        let mut voices = Vec::with_capacity(notes.len());
        let mut failed = 0;
        for (index, note) in notes.iter().enumerate() {
            match self.synth.schedule_voice(
                note,
                anchor + note.start_time(),
                sample.as_ref(),
                base_pitch,
            ) {
                Ok(plan) => voices.push(plan),
                Err(e) => {
                    error!(index, pitch = note.pitch(), err = %e, "Unable to schedule note");
                    failed += 1;
                }
            }
        }

        info!(
            anchor,
            voices = voices.len(),
            failed,
            sample = sample.is_some(),
            base_pitch,
            device = %self.output,
            "Notes scheduled"
        );
        Ok(PlayOutcome::Scheduled {
            anchor,
            voices,
            failed,
        })
    }

    /// Plays a note sequence with a sample looked up in the cache. An unknown
    /// ID falls back to tone playback.
    pub async fn play_sample_id(
        &self,
        notes: &NoteSequence,
        sample_id: Option<&str>,
        base_pitch: Option<u8>,
    ) -> Result<PlayOutcome, PlaybackError> {
        let sample = match sample_id {
            Some(id) => {
                let sample = self.cache.get(id);
                if sample.is_none() {
                    warn!(id, "Sample not found, falling back to tones");
                }
                sample
            }
            None => None,
        };
        self.play(notes, sample, base_pitch).await
    }

    /// Resumes the output if needed and waits for its clock to run.
    async fn ensure_running(&self) -> Result<(), PlaybackError> {
        let clock = self.output.clock();
        match clock.state() {
            ClockState::Running => return Ok(()),
            ClockState::Closed => {
                return Err(PlaybackError::EnvironmentUnsupported(format!(
                    "{} has been torn down",
                    self.output
                )))
            }
            ClockState::Suspended => {}
        }

        debug!(device = %self.output, "Resuming output");
        // Starting a real stream blocks until the device reports back.
        let output = self.output.clone();
        tokio::task::spawn_blocking(move || output.resume())
            .await
            .map_err(|e| PlaybackError::EnvironmentUnsupported(e.to_string()))?
            .map_err(|e| PlaybackError::EnvironmentUnsupported(e.to_string()))?;

        clock
            .wait_running(self.resume_timeout)
            .await
            .map_err(|e| match e {
                OutputError::NotResumed(timeout) => PlaybackError::NotResumed(timeout),
                e => PlaybackError::EnvironmentUnsupported(e.to_string()),
            })
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("output", &self.output.to_string())
            .field("cache", &self.cache)
            .field("lead_in", &self.lead_in)
            .field("resume_timeout", &self.resume_timeout)
            .field("default_base_pitch", &self.default_base_pitch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::audio::mock;
    use crate::note::Note;
    use crate::synth::PlaybackSource;

    fn notes(notes: &[(u8, f64, f64)]) -> NoteSequence {
        notes
            .iter()
            .map(|(pitch, start, duration)| Note::new(*pitch, *start, *duration, 100).unwrap())
            .collect()
    }

    fn scheduler(device: Arc<mock::Device>) -> Scheduler {
        Scheduler::new(
            device,
            Arc::new(SampleCache::new()),
            &config::Engine::new("mock"),
        )
        .unwrap()
    }

    fn sample() -> Arc<SampleBuffer> {
        Arc::new(SampleBuffer::new(vec![vec![0.5; 4410]], 44100).unwrap())
    }

    fn scheduled(outcome: PlayOutcome) -> (f64, Vec<VoicePlan>, usize) {
        match outcome {
            PlayOutcome::Scheduled {
                anchor,
                voices,
                failed,
            } => (anchor, voices, failed),
            PlayOutcome::Empty => panic!("expected scheduled voices"),
        }
    }

    #[tokio::test]
    async fn test_sample_pitch_mapping() {
        let device = Arc::new(mock::Device::new("mock", 44100, 2));
        let scheduler = scheduler(device.clone());

        let outcome = scheduler
            .play(
                &notes(&[(72, 0.0, 0.5), (60, 0.0, 0.5), (48, 0.0, 0.5)]),
                Some(sample()),
                Some(60),
            )
            .await
            .unwrap();
        let (_, voices, failed) = scheduled(outcome);
        assert_eq!(failed, 0);
        let rates: Vec<PlaybackSource> = voices.iter().map(VoicePlan::source).collect();
        assert_eq!(
            rates,
            vec![
                PlaybackSource::Sample { rate: 2.0 },
                PlaybackSource::Sample { rate: 1.0 },
                PlaybackSource::Sample { rate: 0.5 },
            ]
        );
        assert_eq!(device.scheduled(), voices);
    }

    #[tokio::test]
    async fn test_tone_fallback_without_sample() {
        let device = Arc::new(mock::Device::new("mock", 44100, 2));
        let scheduler = scheduler(device.clone());

        let outcome = scheduler
            .play(&notes(&[(69, 0.0, 0.5), (81, 0.5, 0.5)]), None, None)
            .await
            .unwrap();
        let (_, voices, failed) = scheduled(outcome);
        assert_eq!(failed, 0);
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].source(), PlaybackSource::Tone { frequency: 440.0 });
        assert_eq!(voices[1].source(), PlaybackSource::Tone { frequency: 880.0 });
    }

    #[tokio::test]
    async fn test_minimum_duration_clamp() {
        let device = Arc::new(mock::Device::new("mock", 44100, 2));
        let scheduler = scheduler(device);

        let outcome = scheduler
            .play(&notes(&[(60, 0.0, 0.01)]), Some(sample()), None)
            .await
            .unwrap();
        let (_, voices, _) = scheduled(outcome);
        assert_eq!(voices[0].duration(), 0.05);
    }

    #[tokio::test]
    async fn test_relative_timing_preserved() {
        let device = Arc::new(mock::Device::new("mock", 44100, 2));
        let scheduler = scheduler(device.clone());
        device.render(12345);

        let outcome = scheduler
            .play(&notes(&[(60, 1.0, 0.5), (64, 0.0, 0.5)]), None, None)
            .await
            .unwrap();
        let (anchor, voices, _) = scheduled(outcome);
        assert!((anchor - (12345.0 / 44100.0 + 0.1)).abs() < 1e-12);

        let clock = device.clock();
        assert_eq!(voices[1].start(), anchor);
        assert!((voices[0].start() - voices[1].start() - 1.0).abs() < 1e-9);
        assert_eq!(
            clock.seconds_to_frame(voices[0].start()) - clock.seconds_to_frame(voices[1].start()),
            44100
        );
    }

    #[tokio::test]
    async fn test_empty_input_is_noop() {
        let device = Arc::new(mock::Device::new("mock", 44100, 2));
        let scheduler = scheduler(device.clone());

        let outcome = scheduler.play(&NoteSequence::default(), None, None).await;
        assert_eq!(outcome.unwrap(), PlayOutcome::Empty);
        assert!(device.scheduled().is_empty());
        assert_eq!(device.active_voices(), 0);
    }

    #[tokio::test]
    async fn test_empty_input_is_noop_even_when_torn_down() {
        let device = Arc::new(mock::Device::new("mock", 44100, 2));
        let scheduler = scheduler(device.clone());
        device.teardown();

        let outcome = scheduler.play(&NoteSequence::default(), None, None).await;
        assert_eq!(outcome.unwrap(), PlayOutcome::Empty);
    }

    #[tokio::test]
    async fn test_voice_keeps_overwritten_sample() {
        let device = Arc::new(mock::Device::new("mock", 1000, 1));
        let scheduler = scheduler(device.clone());
        let cache = scheduler.cache().clone();

        let first = Arc::new(SampleBuffer::new(vec![vec![0.25; 2000]], 1000).unwrap());
        let second = Arc::new(SampleBuffer::new(vec![vec![0.75; 2000]], 1000).unwrap());
        cache.put("a", "First", first);

        scheduler
            .play_sample_id(&notes(&[(60, 0.0, 1.0)]), Some("a"), None)
            .await
            .unwrap();
        cache.put("a", "Second", second.clone());
        assert!(Arc::ptr_eq(&cache.get("a").unwrap(), &second));

        // Lead-in is 100 frames; the sustain is reached by frame 200.
        let frames = device.render(300);
        assert!((frames[250] - 0.25 * 0.7 * 100.0 / 127.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_missing_sample_id_falls_back_to_tone() {
        let device = Arc::new(mock::Device::new("mock", 44100, 2));
        let scheduler = scheduler(device);

        let outcome = scheduler
            .play_sample_id(&notes(&[(69, 0.0, 0.5)]), Some("missing"), None)
            .await
            .unwrap();
        let (_, voices, failed) = scheduled(outcome);
        assert_eq!(failed, 0);
        assert_eq!(voices[0].source(), PlaybackSource::Tone { frequency: 440.0 });
    }

    #[tokio::test]
    async fn test_base_pitch_precedence() {
        let device = Arc::new(mock::Device::new("mock", 44100, 2));
        let scheduler = scheduler(device);
        let tagged = Arc::new(
            SampleBuffer::new(vec![vec![0.5; 100]], 44100)
                .unwrap()
                .with_base_pitch(48),
        );
        let melody = notes(&[(72, 0.0, 0.5)]);

        let outcome = scheduler
            .play(&melody, Some(tagged.clone()), Some(72))
            .await
            .unwrap();
        assert_eq!(
            scheduled(outcome).1[0].source(),
            PlaybackSource::Sample { rate: 1.0 }
        );

        let outcome = scheduler.play(&melody, Some(tagged), None).await.unwrap();
        assert_eq!(
            scheduled(outcome).1[0].source(),
            PlaybackSource::Sample { rate: 4.0 }
        );

        let outcome = scheduler.play(&melody, Some(sample()), None).await.unwrap();
        assert_eq!(
            scheduled(outcome).1[0].source(),
            PlaybackSource::Sample { rate: 2.0 }
        );
    }

    #[tokio::test]
    async fn test_failed_note_does_not_abort_siblings() {
        let device = Arc::new(mock::Device::new("mock", 44100, 2).rejecting_pitch(64));
        let scheduler = scheduler(device.clone());

        let outcome = scheduler
            .play(
                &notes(&[(60, 0.0, 0.5), (64, 0.5, 0.5), (67, 1.0, 0.5)]),
                None,
                None,
            )
            .await
            .unwrap();
        let (_, voices, failed) = scheduled(outcome);
        assert_eq!(failed, 1);
        let pitches: Vec<u8> = voices.iter().map(VoicePlan::pitch).collect();
        assert_eq!(pitches, vec![60, 67]);
        assert_eq!(device.active_voices(), 2);
    }

    #[tokio::test]
    async fn test_torn_down_output_is_unsupported() {
        let device = Arc::new(mock::Device::new("mock", 44100, 2));
        let scheduler = scheduler(device.clone());
        device.teardown();

        let result = scheduler.play(&notes(&[(60, 0.0, 0.5)]), None, None).await;
        assert!(matches!(
            result,
            Err(PlaybackError::EnvironmentUnsupported(_))
        ));
        assert!(device.scheduled().is_empty());
    }

    #[tokio::test]
    async fn test_output_that_never_resumes() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        file.write_all(b"resume_timeout: 20ms\n").unwrap();
        let config = config::Engine::load(file.path()).unwrap();

        let device = Arc::new(mock::Device::new("mock", 44100, 2).stalled());
        let scheduler =
            Scheduler::new(device.clone(), Arc::new(SampleCache::new()), &config).unwrap();

        let result = scheduler.play(&notes(&[(60, 0.0, 0.5)]), None, None).await;
        assert!(matches!(result, Err(PlaybackError::NotResumed(_))));
        assert!(device.scheduled().is_empty());
    }

    #[tokio::test]
    async fn test_slow_resume_does_not_block_runtime() {
        let device = Arc::new(
            mock::Device::new("mock", 44100, 2).slow_to_resume(Duration::from_millis(300)),
        );
        let scheduler = scheduler(device.clone());
        let clock = device.clock();

        let to_play = notes(&[(60, 0.0, 0.5)]);
        let (result, state_during_resume) = tokio::join!(
            scheduler.play(&to_play, None, None),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                clock.state()
            }
        );
        // The timer fired while resume() was still blocked.
        assert_eq!(state_during_resume, ClockState::Suspended);
        assert_eq!(result.unwrap().voice_count(), 1);
        assert_eq!(clock.state(), ClockState::Running);
    }

    #[tokio::test]
    async fn test_outcome_end_time() {
        let device = Arc::new(mock::Device::new("mock", 44100, 2));
        let scheduler = scheduler(device);

        let outcome = scheduler
            .play(&notes(&[(60, 0.0, 0.5), (62, 2.0, 1.0)]), None, None)
            .await
            .unwrap();
        assert_eq!(outcome.voice_count(), 2);
        // Anchor 0.1, last note stops 2.0 + 1.0 + 0.1 later.
        assert!((outcome.end_time().unwrap() - 3.2).abs() < 1e-9);
        assert_eq!(PlayOutcome::Empty.end_time(), None);
    }
}
