//! # Model Collaborator Boundary
//!
//! Defines the call contracts for the three external speech/text models the
//! bridge coordinates: speech-to-text, text generation, and text-to-speech.
//! The concrete model implementations live behind these traits; the bridge
//! only depends on the contracts.
//!
//! ## Blocking contract:
//! Collaborator calls are synchronous and may block for their full duration
//! (models are assumed CPU/GPU-bound). The engine isolates every call on a
//! `tokio::task::spawn_blocking` worker under a bounded timeout so the
//! cooperative loop is never exposed to model latency.

pub mod engine;
pub mod loopback;

pub use engine::{EngineStats, ModelEngine, StageError};

use std::fmt;

/// Audio produced by the synthesis collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    /// Mono samples in the range [-1.0, 1.0]
    pub samples: Vec<f32>,

    /// Sample rate of the synthesized audio in Hz
    pub sample_rate: u32,
}

/// Speech-to-text collaborator.
///
/// Empty input must yield empty text, not an error.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String, TranscriptionError>;
}

/// Text-generation collaborator.
///
/// The caller supplies the full prompt including any role framing.
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Text-to-speech collaborator.
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SynthesisError>;
}

/// Internal failure of the speech-to-text collaborator.
#[derive(Debug, Clone)]
pub struct TranscriptionError(pub String);

/// Internal failure of the text-generation collaborator.
#[derive(Debug, Clone)]
pub struct GenerationError(pub String);

/// Internal failure of the text-to-speech collaborator.
#[derive(Debug, Clone)]
pub struct SynthesisError(pub String);

impl fmt::Display for TranscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transcription failed: {}", self.0)
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "generation failed: {}", self.0)
    }
}

impl fmt::Display for SynthesisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "synthesis failed: {}", self.0)
    }
}

impl std::error::Error for TranscriptionError {}
impl std::error::Error for GenerationError {}
impl std::error::Error for SynthesisError {}
