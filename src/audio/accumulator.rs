//! # Frame Accumulator
//!
//! Turns the transport's arbitrary-sized, arbitrary-timing audio frames into
//! fixed-duration chunks for the pipeline. Multi-channel input is down-mixed
//! to mono on append; once the buffer holds more than one chunk's worth of
//! samples, the entire buffer is emitted as a single chunk and reset.
//!
//! ## Real-time constraint:
//! `on_frame` runs on the frame-delivery path and must never block; the only
//! side effect beyond the local buffer is a non-blocking queue push.
//!
//! ## Single writer:
//! Exactly one accumulator exists per audio source and only the receive path
//! mutates it, so append, threshold check, and reset are one atomic step
//! from the pipeline's point of view — no locking needed.

use crate::audio::frame::{AudioChunk, AudioFrame};
use crate::pipeline::{ChunkQueue, PipelineStats};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AccumulatorConfig {
    /// Target chunk duration in milliseconds
    pub chunk_duration_ms: u32,

    /// Hard cap on buffered samples; oldest samples are discarded beyond it
    pub max_buffer_samples: usize,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            chunk_duration_ms: 2000,
            // 30 s at 16 kHz
            max_buffer_samples: 480_000,
        }
    }
}

/// Accumulates mono samples and emits one chunk per threshold crossing.
pub struct FrameAccumulator {
    buffer: Vec<f32>,
    config: AccumulatorConfig,
    queue: ChunkQueue,
    stats: Arc<PipelineStats>,
}

impl FrameAccumulator {
    pub fn new(config: AccumulatorConfig, queue: ChunkQueue, stats: Arc<PipelineStats>) -> Self {
        Self {
            buffer: Vec::new(),
            config,
            queue,
            stats,
        }
    }

    /// Append one frame, down-mixing to mono, and emit a chunk if the
    /// buffer now exceeds the chunk threshold for this frame's sample rate.
    ///
    /// Down-mix is the arithmetic mean across channels per sample position
    /// (lossy, not configurable). Emission moves the entire buffer out in
    /// one chunk and resets it, so the buffer is always below the threshold
    /// immediately after any emission.
    pub fn on_frame(&mut self, frame: AudioFrame<'_>) {
        if frame.channels <= 1 {
            self.buffer.extend_from_slice(frame.samples);
        } else {
            let channels = frame.channels as usize;
            for position in frame.samples.chunks(channels) {
                let sum: f32 = position.iter().sum();
                self.buffer.push(sum / position.len() as f32);
            }
        }

        // Bound growth: frames can arrive faster than chunks are due.
        if self.buffer.len() > self.config.max_buffer_samples {
            let overflow = self.buffer.len() - self.config.max_buffer_samples;
            self.buffer.drain(..overflow);
            self.stats
                .samples_dropped_overflow
                .fetch_add(overflow as u64, Ordering::Relaxed);
            warn!("Audio buffer over capacity, discarded {} oldest samples", overflow);
        }

        let threshold =
            frame.sample_rate as usize * self.config.chunk_duration_ms as usize / 1000;
        if self.buffer.len() > threshold {
            let samples = std::mem::take(&mut self.buffer);
            self.queue
                .enqueue(AudioChunk::new(samples, frame.sample_rate));
        }
    }

    /// Number of samples currently buffered.
    pub fn buffered_samples(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn accumulator(
        config: AccumulatorConfig,
    ) -> (FrameAccumulator, mpsc::Receiver<AudioChunk>, Arc<PipelineStats>) {
        let stats = Arc::new(PipelineStats::default());
        let (queue, rx) = ChunkQueue::bounded(8, stats.clone());
        (FrameAccumulator::new(config, queue, stats.clone()), rx, stats)
    }

    fn mono_frame(samples: &[f32]) -> AudioFrame<'_> {
        AudioFrame::new(samples, 16000, 1)
    }

    #[test]
    fn test_single_emission_per_threshold_crossing() {
        let (mut acc, mut rx, _) = accumulator(AccumulatorConfig::default());
        let frame_samples = vec![0.25f32; 12000];

        // 12000 + 12000 = 24000: below the 32000-sample threshold.
        acc.on_frame(mono_frame(&frame_samples));
        acc.on_frame(mono_frame(&frame_samples));
        assert!(rx.try_recv().is_err());
        assert_eq!(acc.buffered_samples(), 24000);

        // 36000 > 32000: one emission of the whole buffer.
        acc.on_frame(mono_frame(&frame_samples));
        let chunk = rx.try_recv().unwrap();
        assert_eq!(chunk.samples.len(), 36000);
        assert_eq!(chunk.sample_rate, 16000);
        assert!(rx.try_recv().is_err());
        assert_eq!(acc.buffered_samples(), 0);

        // Buffer afterward only holds samples appended after the crossing.
        acc.on_frame(mono_frame(&frame_samples));
        assert_eq!(acc.buffered_samples(), 12000);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_threshold_is_strict() {
        let (mut acc, mut rx, _) = accumulator(AccumulatorConfig::default());

        // Exactly 2 s of samples does not emit; the next sample does.
        acc.on_frame(mono_frame(&vec![0.0f32; 32000]));
        assert!(rx.try_recv().is_err());
        assert_eq!(acc.buffered_samples(), 32000);

        acc.on_frame(mono_frame(&[0.0f32]));
        let chunk = rx.try_recv().unwrap();
        assert_eq!(chunk.samples.len(), 32001);
    }

    #[test]
    fn test_stereo_downmix_averages_channels() {
        let (mut acc, _rx, _) = accumulator(AccumulatorConfig::default());

        // Interleaved [L, R] pairs.
        let samples = [0.2f32, 0.4, -1.0, 1.0, 0.5, 0.5];
        acc.on_frame(AudioFrame::new(&samples, 16000, 2));

        assert_eq!(acc.buffered_samples(), 3);
        let expected = [0.3f32, 0.0, 0.5];
        for (got, want) in acc.buffer.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-6, "{} vs {}", got, want);
        }
    }

    #[test]
    fn test_overflow_discards_oldest_samples() {
        let config = AccumulatorConfig {
            chunk_duration_ms: 2000,
            max_buffer_samples: 100,
        };
        let (mut acc, _rx, stats) = accumulator(config);

        let old: Vec<f32> = vec![1.0; 80];
        let new: Vec<f32> = vec![-1.0; 40];
        // High sample rate keeps the chunk threshold above the cap, so the
        // cap (not emission) is what bounds the buffer here.
        acc.on_frame(AudioFrame::new(&old, 48000, 1));
        acc.on_frame(AudioFrame::new(&new, 48000, 1));

        assert_eq!(acc.buffered_samples(), 100);
        assert_eq!(stats.samples_dropped_overflow.load(Ordering::Relaxed), 20);
        // The newest samples survive.
        assert!(acc.buffer[99] < 0.0);
    }
}
