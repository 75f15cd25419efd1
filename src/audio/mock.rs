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
use std::{collections::HashSet, fmt, sync::Arc, thread, time::Duration};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::mixer::Mixer;
use super::{Clock, ClockState, Output, OutputError, VoiceSender};
use crate::synth::{Voice, VoicePlan};

/// A mock device. Renders only when asked to, so the clock stands still unless
/// `render` is called.
pub struct Device {
    name: String,
    sample_rate: u32,
    channels: u16,
    clock: Arc<Clock>,
    voice_tx: VoiceSender,
    mixer: Mutex<Mixer>,
    /// Plans of every voice submitted, in submission order.
    scheduled: Mutex<Vec<VoicePlan>>,
    /// Whether resume() confirms immediately, like a device that starts.
    confirms_resume: bool,
    /// How long resume() blocks before returning.
    resume_delay: Option<Duration>,
    /// Pitches whose voices are refused, to exercise per-voice failures.
    rejected_pitches: HashSet<u8>,
}

impl Device {
    /// Creates a mock device.
    pub fn new(name: &str, sample_rate: u32, channels: u16) -> Device {
        let clock = Arc::new(Clock::new(sample_rate));
        let (voice_tx, voice_rx) = crossbeam_channel::unbounded();
        Device {
            name: name.to_string(),
            sample_rate,
            channels,
            mixer: Mutex::new(Mixer::new(clock.clone(), channels, voice_rx)),
            clock,
            voice_tx,
            scheduled: Mutex::new(Vec::new()),
            confirms_resume: true,
            resume_delay: None,
            rejected_pitches: HashSet::new(),
        }
    }

    /// A device that accepts resume() but never starts rendering.
    pub fn stalled(mut self) -> Device {
        self.confirms_resume = false;
        self
    }

    /// A device whose resume() blocks for the given time, like a hardware
    /// stream being built.
    pub fn slow_to_resume(mut self, delay: Duration) -> Device {
        self.resume_delay = Some(delay);
        self
    }

    /// A device that refuses voices at the given pitch.
    pub fn rejecting_pitch(mut self, pitch: u8) -> Device {
        self.rejected_pitches.insert(pitch);
        self
    }

    /// Renders the given number of frames and returns them interleaved.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        self.mixer.lock().process_frames(frames)
    }

    /// Plans of all voices submitted so far.
    pub fn scheduled(&self) -> Vec<VoicePlan> {
        self.scheduled.lock().clone()
    }

    /// Voices waiting to start or still sounding.
    pub fn active_voices(&self) -> usize {
        self.mixer.lock().active_voices()
    }
}

impl Output for Device {
    fn clock(&self) -> Arc<Clock> {
        self.clock.clone()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn resume(&self) -> Result<(), OutputError> {
        match self.clock.state() {
            ClockState::Closed => Err(OutputError::Closed),
            ClockState::Running => Ok(()),
            ClockState::Suspended => {
                if let Some(delay) = self.resume_delay {
                    thread::sleep(delay);
                }
                if self.confirms_resume {
                    info!(device = self.name, "Resuming mock output");
                    self.clock.mark_running();
                }
                Ok(())
            }
        }
    }

    fn submit(&self, voice: Voice) -> Result<(), OutputError> {
        if self.clock.state() == ClockState::Closed {
            return Err(OutputError::Closed);
        }
        let plan = voice.plan().clone();
        if self.rejected_pitches.contains(&plan.pitch()) {
            return Err(OutputError::Stream(format!(
                "mock device refused pitch {}",
                plan.pitch()
            )));
        }

        self.voice_tx
            .send(voice)
            .map_err(|_| OutputError::Closed)?;
        debug!(device = self.name, pitch = plan.pitch(), "Mock voice accepted");
        self.scheduled.lock().push(plan);
        Ok(())
    }

    fn teardown(&self) {
        self.clock.close();
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_is_idempotent() {
        let device = Device::new("mock", 44100, 2);
        assert_eq!(device.clock().state(), ClockState::Suspended);
        device.resume().unwrap();
        device.resume().unwrap();
        assert_eq!(device.clock().state(), ClockState::Running);
    }

    #[test]
    fn test_stalled_device_stays_suspended() {
        let device = Device::new("mock", 44100, 2).stalled();
        device.resume().unwrap();
        assert_eq!(device.clock().state(), ClockState::Suspended);
    }

    #[test]
    fn test_render_advances_clock() {
        let device = Device::new("mock", 1000, 2);
        let frames = device.render(500);
        assert_eq!(frames.len(), 1000);
        assert_eq!(device.clock().now(), 0.5);
    }

    #[test]
    fn test_teardown_closes() {
        let device = Device::new("mock", 44100, 2);
        device.teardown();
        assert_eq!(device.clock().state(), ClockState::Closed);
        assert!(matches!(device.resume(), Err(OutputError::Closed)));
    }

    #[test]
    fn test_display() {
        let device = Device::new("mock-device", 44100, 2);
        assert_eq!(device.to_string(), "mock-device (Mock)");
    }
}
