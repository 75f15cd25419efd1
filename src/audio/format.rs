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
use std::{fmt, str::FromStr};

/// Returned when a sample format or bit depth isn't one the output can render.
#[derive(Debug, thiserror::Error, PartialEq)]
#[error("unsupported output format: {0}")]
pub struct UnsupportedFormat(pub String);

/// Output stream sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Integer samples (16 or 32 bit)
    Int,
    /// 32-bit floating point samples
    Float,
}

impl FromStr for SampleFormat {
    type Err = UnsupportedFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float" | "Float" => Ok(SampleFormat::Float),
            "int" | "Int" => Ok(SampleFormat::Int),
            _ => Err(UnsupportedFormat(s.to_string())),
        }
    }
}

impl SampleFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::Float => "float",
            SampleFormat::Int => "int",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The stream format an output renders in.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Sample format (integer or float)
    pub sample_format: SampleFormat,
    /// Bits per sample
    pub bits_per_sample: u16,
}

impl TargetFormat {
    /// Creates a new TargetFormat, rejecting combinations the output can't
    /// build a stream for.
    pub fn new(
        sample_rate: u32,
        sample_format: SampleFormat,
        bits_per_sample: u16,
    ) -> Result<Self, UnsupportedFormat> {
        if sample_rate == 0 {
            return Err(UnsupportedFormat("sample rate must be greater than 0".into()));
        }
        match (sample_format, bits_per_sample) {
            (SampleFormat::Float, 32) | (SampleFormat::Int, 16) | (SampleFormat::Int, 32) => {}
            (format, bits) => return Err(UnsupportedFormat(format!("{} {}-bit", format, bits))),
        }

        Ok(TargetFormat {
            sample_rate,
            sample_format,
            bits_per_sample,
        })
    }
}

impl Default for TargetFormat {
    /// 44.1kHz, 32-bit float
    fn default() -> Self {
        TargetFormat {
            sample_rate: 44100,
            sample_format: SampleFormat::Float,
            bits_per_sample: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_format_from_str() {
        assert_eq!(
            SampleFormat::from_str("float").unwrap(),
            SampleFormat::Float
        );
        assert_eq!(
            SampleFormat::from_str("Float").unwrap(),
            SampleFormat::Float
        );
        assert_eq!(SampleFormat::from_str("int").unwrap(), SampleFormat::Int);
        assert!(SampleFormat::from_str("double").is_err());
        assert!(SampleFormat::from_str("").is_err());
    }

    #[test]
    fn test_sample_format_display() {
        assert_eq!(format!("{}", SampleFormat::Float), "float");
        assert_eq!(format!("{}", SampleFormat::Int), "int");
    }

    #[test]
    fn test_target_format_new() {
        let format = TargetFormat::new(48000, SampleFormat::Int, 16).unwrap();
        assert_eq!(format.sample_rate, 48000);
        assert_eq!(format.sample_format, SampleFormat::Int);
        assert_eq!(format.bits_per_sample, 16);

        assert!(TargetFormat::new(0, SampleFormat::Float, 32).is_err());
        assert!(TargetFormat::new(44100, SampleFormat::Float, 16).is_err());
        assert!(TargetFormat::new(44100, SampleFormat::Int, 24).is_err());
    }

    #[test]
    fn test_target_format_default() {
        let format = TargetFormat::default();
        assert_eq!(format.sample_rate, 44100);
        assert_eq!(format.sample_format, SampleFormat::Float);
        assert_eq!(format.bits_per_sample, 32);
    }
}
