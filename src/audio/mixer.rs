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
// Core voice mixing logic shared by the cpal and mock outputs
use std::sync::Arc;

use crossbeam_channel::Receiver;

use super::Clock;
use crate::synth::Voice;

/// Mixes scheduled voices into interleaved output blocks and drives the clock.
/// Owned by whichever thread renders audio; voices arrive over a channel so the
/// render path never waits on a lock held by the scheduler.
pub struct Mixer {
    /// Voices that have been received and not yet stopped.
    voices: Vec<Voice>,
    /// Newly scheduled voices.
    incoming: Receiver<Voice>,
    /// The clock advanced after every block.
    clock: Arc<Clock>,
    /// Number of interleaved output channels.
    channels: u16,
}

impl Mixer {
    pub fn new(clock: Arc<Clock>, channels: u16, incoming: Receiver<Voice>) -> Mixer {
        Mixer {
            voices: Vec::new(),
            incoming,
            clock,
            channels,
        }
    }

    /// Renders `frames` frames into `output`, which must hold at least
    /// `frames * channels` samples. Voices past their stop frame are dropped,
    /// which releases any sample buffer they were holding.
    pub fn process_into_output(&mut self, output: &mut [f32], frames: usize) {
        let channels = self.channels as usize;
        let len = (frames * channels).min(output.len());
        let output = &mut output[..len];
        output.fill(0.0);

        while let Ok(voice) = self.incoming.try_recv() {
            self.voices.push(voice);
        }

        let block_start = self.clock.frames();
        for voice in self.voices.iter_mut() {
            voice.render(output, channels, block_start);
        }
        self.voices.retain(|voice| !voice.is_finished());

        self.clock.advance((len / channels.max(1)) as u64);
    }

    /// Renders a block into a freshly allocated buffer.
    pub fn process_frames(&mut self, frames: usize) -> Vec<f32> {
        let mut output = vec![0.0f32; frames * self.channels as usize];
        self.process_into_output(&mut output, frames);
        output
    }

    /// Voices that are scheduled or sounding.
    pub fn active_voices(&self) -> usize {
        self.voices.len() + self.incoming.len()
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("active_voices", &self.active_voices())
            .field("channels", &self.channels)
            .field("clock", &self.clock)
            .finish()
    }
}
