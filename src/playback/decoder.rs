//! # Audio Chunk Decoding
//!
//! Turns an opaque encoded audio payload into playable f32 samples with a
//! derived duration. Chunks arrive either as small WAV containers or as
//! headerless little-endian PCM16 mono at a configured fallback rate; the
//! transport provides no framing beyond the message boundary.

use crate::error::AppError;
use byteorder::{ByteOrder, LittleEndian};
use std::io::Cursor;
use std::time::Duration;

/// A decoded, playable audio buffer.
#[derive(Debug, Clone)]
pub struct DecodedChunk {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl DecodedChunk {
    /// Playable duration derived from the sample count.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        Duration::from_nanos(frames * 1_000_000_000 / self.sample_rate as u64)
    }
}

/// Decode one inbound chunk.
///
/// Tries a WAV container first; anything that does not parse as WAV is
/// treated as raw PCM16 mono at `fallback_sample_rate`. Failure here is a
/// per-chunk event: the caller logs it and keeps the stream going.
pub fn decode_chunk(bytes: &[u8], fallback_sample_rate: u32) -> Result<DecodedChunk, AppError> {
    if bytes.is_empty() {
        return Err(AppError::Playback("empty audio chunk".to_string()));
    }

    if let Ok(chunk) = decode_wav(bytes) {
        return Ok(chunk);
    }

    decode_pcm16(bytes, fallback_sample_rate)
}

fn decode_wav(bytes: &[u8]) -> Result<DecodedChunk, AppError> {
    let mut reader = Cursor::new(bytes);
    let (header, data) = wav::read(&mut reader)
        .map_err(|e| AppError::Playback(format!("WAV parse failed: {}", e)))?;

    let samples: Vec<f32> = match data {
        wav::BitDepth::Eight(v) => v
            .into_iter()
            .map(|s| (s as f32 - 128.0) / 128.0)
            .collect(),
        wav::BitDepth::Sixteen(v) => v.into_iter().map(|s| s as f32 / 32768.0).collect(),
        wav::BitDepth::TwentyFour(v) => v
            .into_iter()
            .map(|s| s as f32 / 8_388_608.0)
            .collect(),
        wav::BitDepth::ThirtyTwoFloat(v) => v,
        wav::BitDepth::Empty => {
            return Err(AppError::Playback("WAV chunk carries no samples".to_string()))
        }
    };

    if samples.is_empty() {
        return Err(AppError::Playback("WAV chunk carries no samples".to_string()));
    }

    Ok(DecodedChunk {
        samples,
        channels: header.channel_count,
        sample_rate: header.sampling_rate,
    })
}

fn decode_pcm16(bytes: &[u8], sample_rate: u32) -> Result<DecodedChunk, AppError> {
    if bytes.len() % 2 != 0 {
        return Err(AppError::Playback(format!(
            "PCM16 chunk has odd length {}",
            bytes.len()
        )));
    }

    let samples: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|pair| LittleEndian::read_i16(pair) as f32 / 32768.0)
        .collect();

    Ok(DecodedChunk {
        samples,
        channels: 1,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm16_fallback_duration() {
        // 3200 bytes = 1600 mono samples = 100 ms at 16 kHz.
        let bytes = vec![0u8; 3200];
        let chunk = decode_chunk(&bytes, 16000).unwrap();
        assert_eq!(chunk.channels, 1);
        assert_eq!(chunk.sample_rate, 16000);
        assert_eq!(chunk.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_pcm16_sample_scaling() {
        // i16::MAX little-endian, then i16::MIN.
        let bytes = [0xFF, 0x7F, 0x00, 0x80];
        let chunk = decode_chunk(&bytes, 16000).unwrap();
        assert!((chunk.samples[0] - (32767.0 / 32768.0)).abs() < 1e-6);
        assert!((chunk.samples[1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_empty_and_odd_chunks() {
        assert!(decode_chunk(&[], 16000).is_err());
        assert!(decode_chunk(&[0u8; 3], 16000).is_err());
    }

    #[test]
    fn test_wav_container_roundtrip() {
        // Build a minimal 16-bit mono WAV in memory and decode it.
        let header = wav::Header::new(wav::WAV_FORMAT_PCM, 1, 8000, 16);
        let samples: Vec<i16> = vec![0; 800]; // 100 ms at 8 kHz
        let mut buf = Cursor::new(Vec::new());
        wav::write(header, &wav::BitDepth::Sixteen(samples), &mut buf).unwrap();

        let chunk = decode_chunk(buf.get_ref(), 16000).unwrap();
        assert_eq!(chunk.sample_rate, 8000);
        assert_eq!(chunk.channels, 1);
        assert_eq!(chunk.duration(), Duration::from_millis(100));
    }
}
