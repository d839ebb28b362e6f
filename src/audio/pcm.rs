//! # PCM Wire Codec
//!
//! Conversion between the float samples used internally and the 16-bit
//! signed little-endian PCM carried on the wire in both directions.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Decode raw 16-bit LE PCM bytes into normalized float samples.
///
/// Returns an error for empty input or an odd byte count; samples are
/// scaled from [-32768, 32767] to [-1.0, 1.0].
pub fn decode_pcm16(data: &[u8]) -> Result<Vec<f32>, String> {
    if data.is_empty() {
        return Err("No audio data provided".to_string());
    }
    if data.len() % 2 != 0 {
        return Err("Audio data length must be even for 16-bit samples".to_string());
    }

    let mut cursor = Cursor::new(data);
    let mut samples = Vec::with_capacity(data.len() / 2);
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample as f32 / 32768.0);
    }

    Ok(samples)
}

/// Encode normalized float samples as 16-bit LE PCM bytes.
///
/// Out-of-range input is clamped to the valid 16-bit range instead of
/// wrapping around.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let scaled = (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
        bytes.extend_from_slice(&scaled.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(decode_pcm16(&[]).is_err());
        assert!(decode_pcm16(&[0u8; 15]).is_err());
    }

    #[test]
    fn test_decode_scales_to_unit_range() {
        let mut data = Vec::new();
        for value in [0i16, 16384, -16384, 32767, -32768] {
            data.extend_from_slice(&value.to_le_bytes());
        }

        let samples = decode_pcm16(&data).unwrap();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[1], 0.5);
        assert_eq!(samples[2], -0.5);
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_encode_known_values() {
        let bytes = encode_pcm16(&[0.1, -0.2, 0.05]);

        let mut expected = Vec::new();
        for value in [3277i16, -6554, 1638] {
            expected.extend_from_slice(&value.to_le_bytes());
        }
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        let bytes = encode_pcm16(&[2.0, -2.0]);
        assert_eq!(&bytes[0..2], &i16::MAX.to_le_bytes());
        assert_eq!(&bytes[2..4], &i16::MIN.to_le_bytes());
    }

    #[test]
    fn test_round_trip_accuracy() {
        let original = vec![0.0f32, 0.5, -0.5, 0.999, -1.0];
        let decoded = decode_pcm16(&encode_pcm16(&original)).unwrap();

        for (a, b) in original.iter().zip(decoded.iter()) {
            assert!((a - b).abs() < 1.0 / 32000.0, "{} vs {}", a, b);
        }
    }
}
