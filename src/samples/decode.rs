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

//! Decoding of encoded audio (WAV, FLAC, MP3, ...) into sample buffers.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer as InterleavedBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, warn};

use super::SampleBuffer;

/// Errors produced while decoding audio.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed audio data: {0}")]
    Malformed(String),

    #[error("no audio track found")]
    NoTrack,

    #[error("sample rate not specified")]
    NoSampleRate,

    #[error("audio contains no frames")]
    Empty,

    #[error("invalid audio: {0}")]
    Invalid(String),

    #[error("audio error: {0}")]
    Audio(#[from] SymphoniaError),

    #[error("decode task failed: {0}")]
    Task(String),
}

/// Decodes encoded audio into a buffer. `extension` is an optional hint such
/// as "wav" or "flac"; the container is probed either way.
pub fn decode(bytes: Vec<u8>, extension: Option<&str>) -> Result<SampleBuffer, DecodeError> {
    let size = bytes.len();
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let params = track.codec_params.clone();
    let mut sample_rate = params.sample_rate;

    let decoder_opts: DecoderOptions = Default::default();
    let mut decoder = get_codecs()
        .make(&params, &decoder_opts)
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let mut channels = params.channels.map(|c| c.count()).unwrap_or(0);
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            // Some readers report the end of the stream as a decode error.
            Err(SymphoniaError::DecodeError(_)) => break,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(error = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        if channels == 0 {
            channels = spec.channels.count();
        }
        if sample_rate.is_none() {
            sample_rate = Some(spec.rate);
        }

        let mut interleaved = InterleavedBuffer::<f32>::new(decoded.capacity() as u64, spec);
        interleaved.copy_interleaved_ref(decoded);
        samples.extend_from_slice(interleaved.samples());
    }

    let sample_rate = sample_rate.ok_or(DecodeError::NoSampleRate)?;
    if channels == 0 {
        return Err(DecodeError::Invalid("no channels".to_string()));
    }
    if samples.is_empty() {
        return Err(DecodeError::Empty);
    }

    let buffer = SampleBuffer::from_interleaved(&samples, channels as u16, sample_rate)?;
    debug!(
        bytes = size,
        channels,
        sample_rate,
        frames = buffer.frames(),
        "Decoded sample"
    );
    Ok(buffer)
}

/// Decodes on the blocking thread pool so the caller's runtime keeps going.
pub async fn decode_async(
    bytes: Vec<u8>,
    extension: Option<String>,
) -> Result<SampleBuffer, DecodeError> {
    tokio::task::spawn_blocking(move || decode(bytes, extension.as_deref()))
        .await
        .map_err(|e| DecodeError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::wav_bytes;

    #[test]
    fn test_decode_wav_mono() {
        let bytes = wav_bytes(1, 22050, &[0, 16384, -16384, 8192]);
        let buffer = decode(bytes, Some("wav")).unwrap();

        assert_eq!(buffer.channel_count(), 1);
        assert_eq!(buffer.sample_rate(), 22050);
        assert_eq!(buffer.frames(), 4);
        assert_eq!(buffer.channel(0), Some(&[0.0, 0.5, -0.5, 0.25][..]));
        assert_eq!(buffer.base_pitch(), None);
    }

    #[test]
    fn test_decode_wav_stereo_without_hint() {
        let bytes = wav_bytes(2, 44100, &[16384, -16384, 8192, -8192]);
        let buffer = decode(bytes, None).unwrap();

        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.channel(0), Some(&[0.5, 0.25][..]));
        assert_eq!(buffer.channel(1), Some(&[-0.5, -0.25][..]));
    }

    #[test]
    fn test_decode_garbage() {
        let result = decode(b"definitely not audio".to_vec(), Some("wav"));
        assert!(result.is_err());

        let result = decode(Vec::new(), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_empty_wav() {
        let bytes = wav_bytes(1, 44100, &[]);
        assert!(decode(bytes, Some("wav")).is_err());
    }

    #[tokio::test]
    async fn test_decode_async() {
        let bytes = wav_bytes(1, 48000, &[16384; 480]);
        let buffer = decode_async(bytes, Some("wav".to_string())).await.unwrap();
        assert_eq!(buffer.frames(), 480);
        assert_eq!(buffer.duration(), std::time::Duration::from_millis(10));
    }
}
