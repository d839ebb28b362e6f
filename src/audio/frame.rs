//! # Audio Frame and Chunk Types
//!
//! Core data types for the audio path. An `AudioFrame` is the ephemeral view
//! of one transport delivery (arbitrary size and timing, possibly
//! multi-channel). An `AudioChunk` is the immutable mono snapshot that the
//! accumulator hands to the processing pipeline as one unit.

/// One incoming audio delivery from the transport.
///
/// ## Layout:
/// Samples are interleaved when `channels > 1` (frame-major ordering:
/// `[ch0, ch1, ch0, ch1, ...]`). Frames are borrowed views; the accumulator
/// is the only consumer and down-mixes during append.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    /// Interleaved sample data in the range [-1.0, 1.0]
    pub samples: &'a [f32],

    /// Sample rate of this delivery in Hz
    pub sample_rate: u32,

    /// Number of interleaved channels (1 = mono)
    pub channels: u16,
}

impl<'a> AudioFrame<'a> {
    pub fn new(samples: &'a [f32], sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }
}

/// A fixed-duration slice of accumulated mono audio, processed as one unit.
///
/// ## Ownership:
/// Created exactly once per threshold crossing; the accumulator's buffer is
/// moved out (cleared, not aliased), so a chunk is never mutated after
/// emission.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Mono samples in the range [-1.0, 1.0]
    pub samples: Vec<f32>,

    /// Sample rate the samples were captured at, in Hz
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration of this chunk in seconds.
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_duration() {
        let chunk = AudioChunk::new(vec![0.0; 32000], 16000);
        assert_eq!(chunk.duration_seconds(), 2.0);
    }

    #[test]
    fn test_chunk_duration_zero_rate() {
        let chunk = AudioChunk::new(vec![0.0; 100], 0);
        assert_eq!(chunk.duration_seconds(), 0.0);
    }
}
