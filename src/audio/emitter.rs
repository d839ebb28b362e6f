//! # Response Emitter
//!
//! Final stage of the voice pipeline: converts synthesized float samples
//! into 16-bit PCM and hands the bytes to the active transport.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::audio::pcm;
use crate::pipeline::PipelineStats;

/// Transport-side destination for outbound audio frames.
///
/// Implementations are expected to be cheap and non-blocking; the WebSocket
/// sink forwards the bytes to an actor mailbox, tests collect them in memory.
pub trait AudioSink: Send + Sync {
    /// Deliver one encoded PCM frame to the client.
    fn write_frame(&self, pcm: Vec<u8>);
}

/// Encodes synthesized audio and pushes it to an [`AudioSink`].
pub struct ResponseEmitter {
    sink: Arc<dyn AudioSink>,
    stats: Arc<PipelineStats>,
}

impl ResponseEmitter {
    pub fn new(sink: Arc<dyn AudioSink>, stats: Arc<PipelineStats>) -> Self {
        Self { sink, stats }
    }

    /// Encode `samples` as little-endian 16-bit PCM and emit one frame.
    ///
    /// Empty sample buffers are skipped so the transport never sees a
    /// zero-length binary message.
    pub fn emit(&self, samples: &[f32], sample_rate: u32) {
        if samples.is_empty() {
            return;
        }

        let encoded = pcm::encode_pcm16(samples);
        debug!(
            "Emitting response frame: {} samples @ {} Hz ({} bytes)",
            samples.len(),
            sample_rate,
            encoded.len()
        );

        self.sink.write_frame(encoded);
        self.stats.responses_emitted.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CollectingSink {
        frames: Mutex<Vec<Vec<u8>>>,
    }

    impl CollectingSink {
        fn new() -> Self {
            Self {
                frames: Mutex::new(Vec::new()),
            }
        }
    }

    impl AudioSink for CollectingSink {
        fn write_frame(&self, pcm: Vec<u8>) {
            self.frames.lock().unwrap().push(pcm);
        }
    }

    #[test]
    fn test_emit_encodes_and_counts() {
        let sink = Arc::new(CollectingSink::new());
        let stats = Arc::new(PipelineStats::default());
        let emitter = ResponseEmitter::new(sink.clone(), stats.clone());

        emitter.emit(&[0.1, -0.2, 0.05], 22050);

        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);

        let mut expected = Vec::new();
        for value in [3277i16, -6554, 1638] {
            expected.extend_from_slice(&value.to_le_bytes());
        }
        assert_eq!(frames[0], expected);
        assert_eq!(stats.responses_emitted.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_emit_skips_empty_buffers() {
        let sink = Arc::new(CollectingSink::new());
        let stats = Arc::new(PipelineStats::default());
        let emitter = ResponseEmitter::new(sink.clone(), stats.clone());

        emitter.emit(&[], 22050);

        assert!(sink.frames.lock().unwrap().is_empty());
        assert_eq!(stats.responses_emitted.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_emit_large_frame_byte_length() {
        let sink = Arc::new(CollectingSink::new());
        let stats = Arc::new(PipelineStats::default());
        let emitter = ResponseEmitter::new(sink.clone(), stats.clone());

        let samples = vec![0.25f32; 32000];
        emitter.emit(&samples, 16000);

        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 64000);
    }
}
