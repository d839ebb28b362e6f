//! # Model Engine
//!
//! Coordinates calls to the three model collaborators and enforces the
//! policies the rest of the bridge relies on:
//!
//! - **Isolation**: every collaborator call runs on a `spawn_blocking`
//!   worker so a blocking model never stalls the cooperative loop.
//! - **Bounded latency**: each call is wrapped in a timeout; a hung model
//!   becomes a stage failure instead of holding the single-flight slot
//!   forever.
//! - **Recovery**: generation failures degrade to a fixed fallback reply
//!   rather than propagating, because the system must keep accepting input.
//! - **Monitoring**: per-stage request counts, failures, and latency.

use crate::models::{Generator, SynthesizedAudio, Synthesizer, Transcriber};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

/// Fixed reply used when the generation collaborator fails.
pub const FALLBACK_REPLY: &str = "I'm sorry, I couldn't generate a proper response.";

/// Role framing markers used to bias the generation model's formatting.
const USER_MARKER: &str = "User:";
const BOT_MARKER: &str = "Bot:";

/// Failure of one pipeline stage.
///
/// Stage failures are recovered locally: the pipeline aborts remaining
/// stages for that chunk/message, and no error surfaces past the pipeline
/// boundary.
#[derive(Debug, Clone)]
pub enum StageError {
    /// The speech-to-text collaborator failed internally
    Transcription(String),

    /// The text-generation collaborator failed internally
    Generation(String),

    /// The text-to-speech collaborator failed internally
    Synthesis(String),

    /// The collaborator call exceeded the configured stage timeout
    Timeout { stage: &'static str, limit: Duration },

    /// The blocking worker running the call did not complete (panic/cancel)
    Worker { stage: &'static str, message: String },
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Transcription(msg) => write!(f, "transcription stage failed: {}", msg),
            StageError::Generation(msg) => write!(f, "generation stage failed: {}", msg),
            StageError::Synthesis(msg) => write!(f, "synthesis stage failed: {}", msg),
            StageError::Timeout { stage, limit } => {
                write!(f, "{} stage timed out after {:?}", stage, limit)
            }
            StageError::Worker { stage, message } => {
                write!(f, "{} stage worker failed: {}", stage, message)
            }
        }
    }
}

impl std::error::Error for StageError {}

/// Per-stage counters tracked by the engine.
#[derive(Debug, Default, Clone)]
struct StageMetrics {
    requests: u64,
    failures: u64,
    total_latency_ms: u64,
}

impl StageMetrics {
    fn record(&mut self, latency: Duration, failed: bool) {
        self.requests += 1;
        self.total_latency_ms += latency.as_millis() as u64;
        if failed {
            self.failures += 1;
        }
    }

    fn snapshot(&self) -> StageStats {
        StageStats {
            requests: self.requests,
            failures: self.failures,
            average_latency_ms: if self.requests > 0 {
                self.total_latency_ms / self.requests
            } else {
                0
            },
        }
    }
}

/// Snapshot of one stage's counters, reported by `/health` and `/metrics`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StageStats {
    pub requests: u64,
    pub failures: u64,
    pub average_latency_ms: u64,
}

/// Snapshot of all engine counters.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStats {
    pub transcription: StageStats,
    pub generation: StageStats,
    pub synthesis: StageStats,
}

#[derive(Debug, Default)]
struct EngineMetrics {
    transcription: StageMetrics,
    generation: StageMetrics,
    synthesis: StageMetrics,
}

/// High-level front to the model collaborators shared by the audio pipeline
/// and the chat sessions.
///
/// ## Thread Safety:
/// The collaborators are `Send + Sync` trait objects behind `Arc`, so the
/// engine itself is cheap to share across connections and workers.
pub struct ModelEngine {
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<dyn Generator>,
    synthesizer: Arc<dyn Synthesizer>,

    /// Upper bound for one collaborator call
    stage_timeout: Duration,

    metrics: Arc<RwLock<EngineMetrics>>,
}

impl ModelEngine {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn Generator>,
        synthesizer: Arc<dyn Synthesizer>,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            transcriber,
            generator,
            synthesizer,
            stage_timeout,
            metrics: Arc::new(RwLock::new(EngineMetrics::default())),
        }
    }

    /// Convert speech to text. Empty audio yields empty text.
    pub async fn transcribe(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
    ) -> Result<String, StageError> {
        let transcriber = self.transcriber.clone();
        self.run_stage("transcription", StageError::Transcription, move || {
            transcriber
                .transcribe(&samples, sample_rate)
                .map_err(|e| e.0)
        })
        .await
    }

    /// Generate text from a fully framed prompt.
    pub async fn generate(&self, prompt: String) -> Result<String, StageError> {
        let generator = self.generator.clone();
        self.run_stage("generation", StageError::Generation, move || {
            generator.generate(&prompt).map_err(|e| e.0)
        })
        .await
    }

    /// Convert text to speech.
    pub async fn synthesize(&self, text: String) -> Result<SynthesizedAudio, StageError> {
        let synthesizer = self.synthesizer.clone();
        self.run_stage("synthesis", StageError::Synthesis, move || {
            synthesizer.synthesize(&text).map_err(|e| e.0)
        })
        .await
    }

    /// Produce a bot reply for one user utterance.
    ///
    /// Frames the prompt with role markers ("User: ...\nBot:"), extracts the
    /// text after the bot marker from the decoded output, and degrades to
    /// [`FALLBACK_REPLY`] when the generation collaborator fails. Shared by
    /// the audio pipeline and the chat sessions so both paths behave the
    /// same way.
    pub async fn generate_reply(&self, user_text: &str) -> String {
        let prompt = format!("{} {}\n{}", USER_MARKER, user_text, BOT_MARKER);

        match self.generate(prompt).await {
            Ok(decoded) => extract_bot_reply(&decoded),
            Err(err) => {
                warn!("Generation failed, using fallback reply: {}", err);
                FALLBACK_REPLY.to_string()
            }
        }
    }

    /// Snapshot of the per-stage counters.
    pub async fn stats(&self) -> EngineStats {
        let metrics = self.metrics.read().await;
        EngineStats {
            transcription: metrics.transcription.snapshot(),
            generation: metrics.generation.snapshot(),
            synthesis: metrics.synthesis.snapshot(),
        }
    }

    /// Run one collaborator call on a blocking worker under the stage
    /// timeout.
    ///
    /// On timeout the abandoned call keeps running on its blocking thread
    /// until it returns; only the pipeline's wait is bounded, which is what
    /// frees the single-flight slot.
    async fn run_stage<T, F>(
        &self,
        stage: &'static str,
        wrap: fn(String) -> StageError,
        call: F,
    ) -> Result<T, StageError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, String> + Send + 'static,
    {
        let started = Instant::now();

        let outcome = match tokio::time::timeout(
            self.stage_timeout,
            tokio::task::spawn_blocking(call),
        )
        .await
        {
            Err(_) => Err(StageError::Timeout {
                stage,
                limit: self.stage_timeout,
            }),
            Ok(Err(join_err)) => Err(StageError::Worker {
                stage,
                message: join_err.to_string(),
            }),
            Ok(Ok(Err(message))) => Err(wrap(message)),
            Ok(Ok(Ok(value))) => Ok(value),
        };

        self.record_stage(stage, started.elapsed(), outcome.is_err())
            .await;

        outcome
    }

    async fn record_stage(&self, stage: &'static str, latency: Duration, failed: bool) {
        let mut metrics = self.metrics.write().await;
        match stage {
            "transcription" => metrics.transcription.record(latency, failed),
            "generation" => metrics.generation.record(latency, failed),
            "synthesis" => metrics.synthesis.record(latency, failed),
            _ => {}
        }
    }
}

/// Extract the bot's reply from the decoded model output.
///
/// Decoded output typically echoes the prompt (which itself ends in the bot
/// marker), so the reply is the segment right after the first marker; a
/// repeated marker later in the output cuts the reply off there. If the
/// marker is absent the full decoded output is used.
fn extract_bot_reply(decoded: &str) -> String {
    match decoded.split(BOT_MARKER).nth(1) {
        Some(reply) => reply.trim().to_string(),
        None => decoded.trim().to_string(),
    }
}
