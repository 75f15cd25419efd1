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

//! Equal-tempered pitch math.

/// MIDI pitch of A4.
pub const A4_PITCH: u8 = 69;

/// Frequency of A4 in Hz.
pub const A4_FREQUENCY: f64 = 440.0;

/// Playback rate multiplier that shifts a sample recorded at `base_pitch` to
/// sound at `pitch`.
pub fn playback_rate(pitch: u8, base_pitch: u8) -> f64 {
    let semitones = f64::from(pitch) - f64::from(base_pitch);
    2.0_f64.powf(semitones / 12.0)
}

/// Frequency in Hz of the given MIDI pitch.
pub fn tone_frequency(pitch: u8) -> f64 {
    A4_FREQUENCY * playback_rate(pitch, A4_PITCH)
}
