//! # Chunk Queue and Single-Flight Dispatcher
//!
//! The handoff between the frame-receive path (which must never block) and
//! the processing workers (which may run for seconds). The queue accepts
//! chunks immediately; a dedicated consumption loop pulls them in FIFO order
//! and enforces the single-flight policy: at most one chunk is ever being
//! processed.
//!
//! ## Policies:
//! - `Drop` (default): while a chunk is in flight, further pulled chunks are
//!   discarded — not queued for later. This bounds peak concurrent model
//!   usage to one chunk at the cost of completeness.
//! - `Defer`: the loop waits for the in-flight worker before pulling the
//!   next chunk, so nothing is dropped but latency grows under load.
//!
//! The in-flight flag is claimed with a compare-and-swap and released by a
//! scope guard on every worker exit path, so a failing stage can never leave
//! the flag stuck true.

use crate::audio::emitter::ResponseEmitter;
use crate::audio::frame::AudioChunk;
use crate::pipeline::{PipelineStats, ProcessingPipeline};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What happens to a chunk pulled from the queue while another chunk is
/// still being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkPolicy {
    /// Discard the pulled chunk (source behavior)
    Drop,
    /// Wait for the in-flight chunk, then process the pulled chunk
    Defer,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        ChunkPolicy::Drop
    }
}

/// Producer side of the chunk handoff.
///
/// `enqueue` always returns immediately; the channel is bounded, and a full
/// queue discards the chunk with a counter rather than blocking the caller.
#[derive(Clone)]
pub struct ChunkQueue {
    tx: mpsc::Sender<AudioChunk>,
    stats: Arc<PipelineStats>,
}

impl ChunkQueue {
    /// Create a queue with the given capacity, returning the consumer end
    /// for the dispatcher.
    pub fn bounded(
        capacity: usize,
        stats: Arc<PipelineStats>,
    ) -> (Self, mpsc::Receiver<AudioChunk>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, stats }, rx)
    }

    /// Hand a chunk to the dispatcher without blocking.
    pub fn enqueue(&self, chunk: AudioChunk) {
        match self.tx.try_send(chunk) {
            Ok(()) => {
                self.stats.chunks_enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats
                    .chunks_dropped_queue_full
                    .fetch_add(1, Ordering::Relaxed);
                warn!("Chunk queue full, discarding chunk");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Chunk queue closed, discarding chunk");
            }
        }
    }
}

/// Releases the in-flight flag when the worker exits, on any path.
struct FlightGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Consumption loop enforcing the single-flight policy.
pub struct SingleFlightDispatcher {
    rx: mpsc::Receiver<AudioChunk>,
    pipeline: Arc<ProcessingPipeline>,
    emitter: Arc<ResponseEmitter>,
    policy: ChunkPolicy,

    /// True while a worker owns a chunk
    in_flight: Arc<AtomicBool>,

    /// Handle of the in-flight worker, retained so shutdown can drain it
    current: Option<JoinHandle<()>>,

    stats: Arc<PipelineStats>,
}

impl SingleFlightDispatcher {
    pub fn new(
        rx: mpsc::Receiver<AudioChunk>,
        pipeline: Arc<ProcessingPipeline>,
        emitter: Arc<ResponseEmitter>,
        policy: ChunkPolicy,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            rx,
            pipeline,
            emitter,
            policy,
            in_flight: Arc::new(AtomicBool::new(false)),
            current: None,
            stats,
        }
    }

    /// Start the consumption loop on its own task.
    ///
    /// The loop ends when every queue handle is dropped; the returned handle
    /// resolves once the in-flight worker (if any) has drained.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        while let Some(chunk) = self.rx.recv().await {
            if self.policy == ChunkPolicy::Defer {
                if let Some(handle) = self.current.take() {
                    let _ = handle.await;
                }
            }

            // Claim the single-flight slot; losing the race means a chunk is
            // mid-processing and this one is discarded, not queued for later.
            if self
                .in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                self.stats.chunks_dropped_busy.fetch_add(1, Ordering::Relaxed);
                debug!("Chunk discarded: another chunk is in flight");
                continue;
            }

            let guard = FlightGuard {
                flag: self.in_flight.clone(),
            };
            let pipeline = self.pipeline.clone();
            let emitter = self.emitter.clone();
            let stats = self.stats.clone();

            // Process on an independent worker so the loop is immediately
            // free to pull (and by policy, drop) the next chunk.
            self.current = Some(tokio::spawn(async move {
                let _guard = guard;
                if let Some(audio) = pipeline.process(chunk).await {
                    emitter.emit(&audio.samples, audio.sample_rate);
                }
                stats.chunks_processed.fetch_add(1, Ordering::Relaxed);
            }));
        }

        if let Some(handle) = self.current.take() {
            let _ = handle.await;
        }
        debug!("Dispatcher drained and stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::emitter::AudioSink;
    use crate::models::{
        GenerationError, Generator, ModelEngine, SynthesisError, SynthesizedAudio, Synthesizer,
        TranscriptionError, Transcriber,
    };
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc as std_mpsc;
    use std::sync::Mutex;
    use std::time::Duration;

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

    /// Blocks inside transcription until the test releases it, signalling
    /// when the call has started.
    struct GatedTranscriber {
        started: std_mpsc::Sender<()>,
        release: Mutex<std_mpsc::Receiver<()>>,
        calls: AtomicUsize,
    }

    impl Transcriber for GatedTranscriber {
        fn transcribe(&self, _: &[f32], _: u32) -> Result<String, TranscriptionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.send(()).unwrap();
            self.release
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5))
                .unwrap();
            Ok("hello".to_string())
        }
    }

    struct InstantTranscriber {
        calls: AtomicUsize,
    }

    impl Transcriber for InstantTranscriber {
        fn transcribe(&self, _: &[f32], _: u32) -> Result<String, TranscriptionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("hello".to_string())
        }
    }

    struct FailingTranscriber;

    impl Transcriber for FailingTranscriber {
        fn transcribe(&self, _: &[f32], _: u32) -> Result<String, TranscriptionError> {
            Err(TranscriptionError("decoder crashed".to_string()))
        }
    }

    struct EchoGenerator;

    impl Generator for EchoGenerator {
        fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            Ok(format!("{} hi there", prompt))
        }
    }

    struct ToneSynthesizer;

    impl Synthesizer for ToneSynthesizer {
        fn synthesize(&self, _: &str) -> Result<SynthesizedAudio, SynthesisError> {
            Ok(SynthesizedAudio {
                samples: vec![0.1, -0.2, 0.05],
                sample_rate: 22050,
            })
        }
    }

    struct Harness {
        queue: ChunkQueue,
        handle: JoinHandle<()>,
        stats: Arc<PipelineStats>,
        sink: Arc<CollectingSink>,
    }

    fn start(transcriber: Arc<dyn Transcriber>, policy: ChunkPolicy) -> Harness {
        let stats = Arc::new(PipelineStats::default());
        let engine = Arc::new(ModelEngine::new(
            transcriber,
            Arc::new(EchoGenerator),
            Arc::new(ToneSynthesizer),
            Duration::from_secs(10),
        ));
        let pipeline = Arc::new(ProcessingPipeline::new(engine, stats.clone()));
        let sink = Arc::new(CollectingSink::new());
        let emitter = Arc::new(ResponseEmitter::new(sink.clone(), stats.clone()));

        let (queue, rx) = ChunkQueue::bounded(8, stats.clone());
        let handle =
            SingleFlightDispatcher::new(rx, pipeline, emitter, policy, stats.clone()).spawn();

        Harness {
            queue,
            handle,
            stats,
            sink,
        }
    }

    fn chunk() -> AudioChunk {
        AudioChunk::new(vec![0.5; 1600], 16000)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_single_flight_drops_chunks_while_busy() {
        let (started_tx, started_rx) = std_mpsc::channel();
        let (release_tx, release_rx) = std_mpsc::channel();
        let transcriber = Arc::new(GatedTranscriber {
            started: started_tx,
            release: Mutex::new(release_rx),
            calls: AtomicUsize::new(0),
        });

        let harness = start(transcriber.clone(), ChunkPolicy::Drop);

        harness.queue.enqueue(chunk());
        // Wait until the first chunk is mid-processing.
        tokio::task::spawn_blocking(move || {
            started_rx.recv_timeout(Duration::from_secs(5)).unwrap()
        })
        .await
        .unwrap();

        harness.queue.enqueue(chunk());
        harness.queue.enqueue(chunk());
        // Let the loop pull (and discard) both queued chunks.
        tokio::time::sleep(Duration::from_millis(100)).await;

        release_tx.send(()).unwrap();
        drop(harness.queue);
        harness.handle.await.unwrap();

        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.stats.chunks_dropped_busy.load(Ordering::Relaxed), 2);
        assert_eq!(harness.stats.chunks_processed.load(Ordering::Relaxed), 1);
        assert_eq!(harness.sink.frames.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_defer_policy_processes_every_chunk() {
        let transcriber = Arc::new(InstantTranscriber {
            calls: AtomicUsize::new(0),
        });
        let harness = start(transcriber.clone(), ChunkPolicy::Defer);

        for _ in 0..3 {
            harness.queue.enqueue(chunk());
        }
        drop(harness.queue);
        harness.handle.await.unwrap();

        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 3);
        assert_eq!(harness.stats.chunks_dropped_busy.load(Ordering::Relaxed), 0);
        assert_eq!(harness.stats.chunks_processed.load(Ordering::Relaxed), 3);
        assert_eq!(harness.sink.frames.lock().unwrap().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_flight_slot_released_after_stage_failure() {
        let harness = start(Arc::new(FailingTranscriber), ChunkPolicy::Drop);

        harness.queue.enqueue(chunk());
        // First chunk fails in transcription; the slot must come back.
        tokio::time::sleep(Duration::from_millis(100)).await;
        harness.queue.enqueue(chunk());

        drop(harness.queue);
        harness.handle.await.unwrap();

        assert_eq!(harness.stats.chunks_processed.load(Ordering::Relaxed), 2);
        assert_eq!(harness.stats.chunks_dropped_busy.load(Ordering::Relaxed), 0);
        // Failed pipelines emit nothing.
        assert!(harness.sink.frames.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_discards_with_counter() {
        let stats = Arc::new(PipelineStats::default());
        let (queue, _rx) = ChunkQueue::bounded(2, stats.clone());

        for _ in 0..4 {
            queue.enqueue(chunk());
        }

        assert_eq!(stats.chunks_enqueued.load(Ordering::Relaxed), 2);
        assert_eq!(stats.chunks_dropped_queue_full.load(Ordering::Relaxed), 2);
    }
}
