//! # Audio Bridge
//!
//! Ties the audio path together for one connection: inbound frames feed the
//! accumulator, accumulated chunks cross the bounded queue to the dispatcher,
//! and synthesized responses leave through the emitter. Each WebSocket voice
//! connection owns one bridge.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::audio::accumulator::{AccumulatorConfig, FrameAccumulator};
use crate::audio::emitter::{AudioSink, ResponseEmitter};
use crate::audio::frame::AudioFrame;
use crate::models::ModelEngine;
use crate::pipeline::dispatcher::{ChunkPolicy, ChunkQueue, SingleFlightDispatcher};
use crate::pipeline::processor::ProcessingPipeline;
use crate::pipeline::PipelineStats;

/// Per-bridge knobs, normally taken from the `[audio]` and `[pipeline]`
/// config sections.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub accumulator: AccumulatorConfig,
    pub queue_capacity: usize,
    pub chunk_policy: ChunkPolicy,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            accumulator: AccumulatorConfig::default(),
            queue_capacity: 16,
            chunk_policy: ChunkPolicy::default(),
        }
    }
}

/// Frame-in, audio-out pipeline for a single connection.
pub struct AudioBridge {
    accumulator: FrameAccumulator,
    dispatcher: JoinHandle<()>,
}

impl AudioBridge {
    /// Wire up accumulator, queue, dispatcher, and emitter, and start the
    /// dispatcher loop on its own task.
    pub fn start(
        engine: Arc<ModelEngine>,
        sink: Arc<dyn AudioSink>,
        settings: BridgeSettings,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let (queue, rx) = ChunkQueue::bounded(settings.queue_capacity, stats.clone());
        let pipeline = Arc::new(ProcessingPipeline::new(engine, stats.clone()));
        let emitter = Arc::new(ResponseEmitter::new(sink, stats.clone()));
        let dispatcher =
            SingleFlightDispatcher::new(rx, pipeline, emitter, settings.chunk_policy, stats.clone())
                .spawn();

        Self {
            accumulator: FrameAccumulator::new(settings.accumulator, queue, stats),
            dispatcher,
        }
    }

    /// Feed one inbound frame. Never blocks; chunk handoff is a non-blocking
    /// queue push.
    pub fn on_frame(&mut self, frame: AudioFrame<'_>) {
        self.accumulator.on_frame(frame);
    }

    /// Samples currently buffered below the chunk threshold.
    pub fn buffered_samples(&self) -> usize {
        self.accumulator.buffered_samples()
    }

    /// Stop accepting frames and wait for the in-flight chunk (if any) to
    /// finish. Buffered sub-threshold samples are discarded.
    pub async fn shutdown(self) {
        let Self {
            accumulator,
            dispatcher,
        } = self;
        // Dropping the accumulator drops the queue sender, which ends the
        // dispatcher loop once the queue drains.
        drop(accumulator);
        let _ = dispatcher.await;
        debug!("Audio bridge shut down");
    }
}
