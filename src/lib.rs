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

//! Note scheduling and sample playback.
//!
//! A [`scheduler::Scheduler`] takes a [`note::NoteSequence`] and an optional
//! [`samples::SampleBuffer`] and turns every note into an independent voice,
//! pitch-shifted and enveloped, timed against the output's shared clock.

pub mod audio;
pub mod config;
pub mod note;
pub mod samples;
pub mod scheduler;
pub mod synth;

#[cfg(test)]
mod testutil;
