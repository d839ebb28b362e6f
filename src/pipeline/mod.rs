//! # Audio Processing Pipeline
//!
//! The core of the bridge: accumulated audio chunks flow through a bounded
//! queue into a single-flight dispatcher, which runs the three-stage
//! transform (speech-to-text, text generation, text-to-speech) and routes
//! the synthesized response back to the transport.
//!
//! ## Components:
//! - **ChunkQueue / SingleFlightDispatcher**: ordered handoff between the
//!   frame-receive path and the processing worker, at most one chunk in
//!   flight (`dispatcher`)
//! - **ProcessingPipeline**: the sequential three-stage transform
//!   (`processor`)
//! - **AudioBridge**: per-connection wiring of accumulator, queue,
//!   dispatcher, and emitter (`bridge`)

pub mod bridge;
pub mod dispatcher;
pub mod processor;

pub use bridge::{AudioBridge, BridgeSettings};
pub use dispatcher::{ChunkPolicy, ChunkQueue, SingleFlightDispatcher};
pub use processor::ProcessingPipeline;

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the accumulator, queue, dispatcher, and emitter.
///
/// One instance is shared process-wide so `/health` and `/metrics` see the
/// pipeline as a whole, regardless of how many voice connections have come
/// and gone.
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Chunks accepted into the queue
    pub chunks_enqueued: AtomicU64,

    /// Chunks discarded because the bounded queue was full
    pub chunks_dropped_queue_full: AtomicU64,

    /// Chunks discarded because another chunk was already in flight
    pub chunks_dropped_busy: AtomicU64,

    /// Pipeline invocations that ran to completion (with or without output)
    pub chunks_processed: AtomicU64,

    /// Stage failures observed by the pipeline (transcription/synthesis)
    pub stage_failures: AtomicU64,

    /// Synthesized responses written to the outbound transport
    pub responses_emitted: AtomicU64,

    /// Oldest accumulator samples discarded to bound buffer growth
    pub samples_dropped_overflow: AtomicU64,
}

/// Serializable view of [`PipelineStats`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineStatsSnapshot {
    pub chunks_enqueued: u64,
    pub chunks_dropped_queue_full: u64,
    pub chunks_dropped_busy: u64,
    pub chunks_processed: u64,
    pub stage_failures: u64,
    pub responses_emitted: u64,
    pub samples_dropped_overflow: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            chunks_enqueued: self.chunks_enqueued.load(Ordering::Relaxed),
            chunks_dropped_queue_full: self.chunks_dropped_queue_full.load(Ordering::Relaxed),
            chunks_dropped_busy: self.chunks_dropped_busy.load(Ordering::Relaxed),
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            stage_failures: self.stage_failures.load(Ordering::Relaxed),
            responses_emitted: self.responses_emitted.load(Ordering::Relaxed),
            samples_dropped_overflow: self.samples_dropped_overflow.load(Ordering::Relaxed),
        }
    }
}
