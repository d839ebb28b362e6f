//! # Processing Pipeline
//!
//! The sequential three-stage transform applied to each audio chunk:
//! transcription, then generation, then synthesis. The whole pipeline runs
//! within the single worker claimed by the dispatcher; no stage is attempted
//! once its input is empty, and no stage failure escapes the pipeline
//! boundary.

use crate::audio::frame::AudioChunk;
use crate::models::ModelEngine;
use crate::pipeline::PipelineStats;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Audio-to-audio transform for one chunk.
pub struct ProcessingPipeline {
    engine: Arc<ModelEngine>,
    stats: Arc<PipelineStats>,
}

impl ProcessingPipeline {
    pub fn new(engine: Arc<ModelEngine>, stats: Arc<PipelineStats>) -> Self {
        Self { engine, stats }
    }

    /// Process one chunk through all three stages.
    ///
    /// ## Failure policy:
    /// - Transcription failure aborts the pipeline (no generation/synthesis)
    ///   and yields no output.
    /// - Generation failure degrades to the fixed fallback reply inside
    ///   [`ModelEngine::generate_reply`]; synthesis is still attempted.
    /// - Synthesis failure yields no output (silence downstream).
    ///
    /// `None` means "nothing to send back"; the caller emits only on `Some`.
    pub async fn process(&self, chunk: AudioChunk) -> Option<AudioChunk> {
        let sample_rate = chunk.sample_rate;
        let duration = chunk.duration_seconds();

        let transcript = match self.engine.transcribe(chunk.samples, sample_rate).await {
            Ok(text) => text,
            Err(err) => {
                self.stats.stage_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Transcription failed for {:.2}s chunk: {}", duration, err);
                return None;
            }
        };

        let transcript = transcript.trim();
        if transcript.is_empty() {
            debug!("Empty transcript for {:.2}s chunk, skipping remaining stages", duration);
            return None;
        }
        info!("Transcribed: {}", transcript);

        let reply = self.engine.generate_reply(transcript).await;
        if reply.is_empty() {
            debug!("Empty reply text, skipping synthesis");
            return None;
        }
        info!("Generated response: {}", reply);

        match self.engine.synthesize(reply).await {
            Ok(audio) => Some(AudioChunk::new(audio.samples, audio.sample_rate)),
            Err(err) => {
                self.stats.stage_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Synthesis failed, no audio response: {}", err);
                None
            }
        }
    }
}
