//! # Loopback Collaborators
//!
//! Deterministic, model-free implementations of the collaborator traits.
//! They let the whole bridge run end-to-end (WebSocket transports, chunking,
//! single-flight dispatch, PCM framing) on machines without any speech or
//! language models installed, and serve as the default wiring until real
//! backends are plugged in behind the same traits.

use crate::models::{
    GenerationError, Generator, SynthesisError, SynthesizedAudio, Synthesizer,
    TranscriptionError, Transcriber,
};

/// RMS level below which audio is reported as silence (empty transcript).
const SILENCE_RMS: f32 = 0.01;

/// Reports audible audio as a canned utterance and silence as empty text.
pub struct LoopbackTranscriber;

impl Transcriber for LoopbackTranscriber {
    fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String, TranscriptionError> {
        if samples.is_empty() {
            return Ok(String::new());
        }

        let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        if energy.sqrt() < SILENCE_RMS {
            return Ok(String::new());
        }

        let seconds = if sample_rate > 0 {
            samples.len() as f64 / sample_rate as f64
        } else {
            0.0
        };
        Ok(format!("I heard {:.1} seconds of speech", seconds))
    }
}

/// Echoes the user's utterance back in the bot role.
pub struct LoopbackGenerator;

impl Generator for LoopbackGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        // Prompt arrives framed as "User: ...\nBot:"; continue after the
        // trailing marker the way a decoded model output would, without
        // introducing a second marker.
        let user_text = prompt
            .strip_prefix("User: ")
            .and_then(|rest| rest.strip_suffix("\nBot:"))
            .unwrap_or(prompt);

        Ok(format!("{} You said: {}", prompt, user_text))
    }
}

/// Produces a fixed-pitch tone whose length tracks the reply text.
pub struct LoopbackSynthesizer {
    pub sample_rate: u32,
}

impl Default for LoopbackSynthesizer {
    fn default() -> Self {
        Self { sample_rate: 22050 }
    }
}

impl Synthesizer for LoopbackSynthesizer {
    fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SynthesisError> {
        if self.sample_rate == 0 {
            return Err(SynthesisError("sample rate is 0".to_string()));
        }

        // 60 ms of tone per character, A4 sine at modest amplitude.
        let duration_samples = text.chars().count() * (self.sample_rate as usize * 60 / 1000);
        let samples: Vec<f32> = (0..duration_samples)
            .map(|i| {
                let t = i as f32 / self.sample_rate as f32;
                0.3 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
            })
            .collect();

        Ok(SynthesizedAudio {
            samples,
            sample_rate: self.sample_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcriber_silence_yields_empty_text() {
        let transcriber = LoopbackTranscriber;
        assert_eq!(transcriber.transcribe(&[], 16000).unwrap(), "");
        assert_eq!(transcriber.transcribe(&[0.0; 16000], 16000).unwrap(), "");
    }

    #[test]
    fn test_transcriber_reports_audible_audio() {
        let transcriber = LoopbackTranscriber;
        let samples = vec![0.5; 32000];
        let text = transcriber.transcribe(&samples, 16000).unwrap();
        assert_eq!(text, "I heard 2.0 seconds of speech");
    }

    #[test]
    fn test_generator_echoes_in_bot_role() {
        let generator = LoopbackGenerator;
        let decoded = generator.generate("User: hi\nBot:").unwrap();
        assert_eq!(decoded, "User: hi\nBot: You said: hi");
    }

    #[test]
    fn test_synthesizer_length_tracks_text() {
        let synthesizer = LoopbackSynthesizer { sample_rate: 1000 };
        let audio = synthesizer.synthesize("abcd").unwrap();
        assert_eq!(audio.sample_rate, 1000);
        assert_eq!(audio.samples.len(), 4 * 60);
        assert!(audio.samples.iter().all(|s| s.abs() <= 0.3 + 1e-6));
    }
}
