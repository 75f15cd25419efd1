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

//! Attack/sustain/release gain envelopes.

/// The fixed parts of an envelope: attack and release windows in seconds and
/// the peak level reached at full velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeShape {
    pub attack: f64,
    pub release: f64,
    pub peak: f64,
}

impl EnvelopeShape {
    /// Used when a voice plays a sample.
    pub const SAMPLE: EnvelopeShape = EnvelopeShape {
        attack: 0.02,
        release: 0.03,
        peak: 0.7,
    };

    /// Used when a voice falls back to a tone.
    pub const TONE: EnvelopeShape = EnvelopeShape {
        attack: 0.05,
        release: 0.05,
        peak: 0.5,
    };
}

/// A linear attack, flat sustain and linear release over a fixed duration.
/// Times are seconds relative to the voice start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    attack: f64,
    release: f64,
    level: f64,
    duration: f64,
}

impl Envelope {
    /// Builds an envelope reaching `shape.peak * velocity_gain` and returning
    /// to silence at `duration`. When the attack and release windows don't fit
    /// inside the duration they are shrunk proportionally.
    pub fn new(shape: EnvelopeShape, velocity_gain: f64, duration: f64) -> Envelope {
        let attack = shape.attack.max(0.0);
        let release = shape.release.max(0.0);
        let windows = attack + release;
        let (attack, release) = if windows > duration && windows > 0.0 {
            let scale = duration / windows;
            (attack * scale, release * scale)
        } else {
            (attack, release)
        };

        Envelope {
            attack,
            release,
            level: shape.peak * velocity_gain,
            duration,
        }
    }

    /// Gain at `t` seconds after the voice start.
    pub fn gain_at(&self, t: f64) -> f64 {
        if t <= 0.0 || t >= self.duration {
            return 0.0;
        }
        if t < self.attack {
            return self.level * t / self.attack;
        }
        let release_start = self.release_start();
        if t < release_start {
            return self.level;
        }
        if self.release > 0.0 {
            self.level * (self.duration - t) / self.release
        } else {
            0.0
        }
    }

    /// The sustain level.
    pub fn level(&self) -> f64 {
        self.level
    }

    /// Attack window after any scaling.
    pub fn attack(&self) -> f64 {
        self.attack
    }

    /// Release window after any scaling.
    pub fn release(&self) -> f64 {
        self.release
    }

    /// Seconds after start at which the release ramp begins.
    pub fn release_start(&self) -> f64 {
        self.duration - self.release
    }

    /// Seconds after start at which the envelope reaches silence.
    pub fn duration(&self) -> f64 {
        self.duration
    }
}
