//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use std::env;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::audio::accumulator::AccumulatorConfig;
use crate::pipeline::{BridgeSettings, ChunkPolicy};

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub pipeline: PipelineConfig,
    pub chat: ChatConfig,
}

/// Server-specific configuration settings.
///
/// - `host = "127.0.0.1"`: only accept connections from localhost
/// - `host = "0.0.0.0"`: accept connections from any address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Inbound audio format and buffering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Default sample rate of inbound frames (Hz)
    pub sample_rate: u32,

    /// Default channel count of inbound frames
    pub channels: u16,

    /// Accumulated audio per chunk handed to the pipeline (ms)
    pub chunk_duration_ms: u32,

    /// Hard cap on buffered samples before old audio is discarded
    pub max_buffer_samples: usize,

    /// Capacity of the chunk queue between accumulator and dispatcher
    pub queue_capacity: usize,
}

/// Processing pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound for any single model stage (ms)
    pub stage_timeout_ms: u64,

    /// What the dispatcher does with chunks pulled while one is in flight
    pub chunk_policy: ChunkPolicy,
}

/// Chat endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Maximum simultaneous chat connections
    pub max_connections: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            audio: AudioConfig {
                sample_rate: 16000,
                channels: 1,
                chunk_duration_ms: 2000,
                // 30 s at 16 kHz
                max_buffer_samples: 480_000,
                queue_capacity: 16,
            },
            pipeline: PipelineConfig {
                stage_timeout_ms: 30_000,
                chunk_policy: ChunkPolicy::Drop,
            },
            chat: ChatConfig {
                max_connections: 64,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml`, and environment.
    ///
    /// `HOST`/`PORT` are honored as overrides on top of the `APP_` prefix
    /// convention, since deployment platforms commonly set them directly.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rate must be greater than 0"));
        }

        if self.audio.channels == 0 {
            return Err(anyhow::anyhow!("Audio channel count must be greater than 0"));
        }

        if self.audio.chunk_duration_ms == 0 {
            return Err(anyhow::anyhow!("Chunk duration must be greater than 0"));
        }

        if self.audio.max_buffer_samples == 0 {
            return Err(anyhow::anyhow!("Max buffer samples must be greater than 0"));
        }

        if self.audio.queue_capacity == 0 {
            return Err(anyhow::anyhow!("Queue capacity must be greater than 0"));
        }

        if self.pipeline.stage_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Stage timeout must be greater than 0"));
        }

        if self.chat.max_connections == 0 {
            return Err(anyhow::anyhow!("Max chat connections must be greater than 0"));
        }

        Ok(())
    }

    /// Per-connection bridge settings derived from the audio and pipeline
    /// sections.
    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            accumulator: AccumulatorConfig {
                chunk_duration_ms: self.audio.chunk_duration_ms,
                max_buffer_samples: self.audio.max_buffer_samples,
            },
            queue_capacity: self.audio.queue_capacity,
            chunk_policy: self.pipeline.chunk_policy,
        }
    }

    /// Stage timeout as a `Duration`.
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.pipeline.stage_timeout_ms)
    }

    /// Update configuration from a JSON string (used for runtime config
    /// updates via `PUT /api/v1/config`).
    ///
    /// Only the fields present in the JSON are changed; the updated
    /// configuration is validated before being accepted.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(audio) = partial_config.get("audio") {
            if let Some(rate) = audio.get("sample_rate").and_then(|v| v.as_u64()) {
                self.audio.sample_rate = rate as u32;
            }
            if let Some(channels) = audio.get("channels").and_then(|v| v.as_u64()) {
                self.audio.channels = channels as u16;
            }
            if let Some(duration) = audio.get("chunk_duration_ms").and_then(|v| v.as_u64()) {
                self.audio.chunk_duration_ms = duration as u32;
            }
            if let Some(cap) = audio.get("max_buffer_samples").and_then(|v| v.as_u64()) {
                self.audio.max_buffer_samples = cap as usize;
            }
            if let Some(capacity) = audio.get("queue_capacity").and_then(|v| v.as_u64()) {
                self.audio.queue_capacity = capacity as usize;
            }
        }

        if let Some(pipeline) = partial_config.get("pipeline") {
            if let Some(timeout) = pipeline.get("stage_timeout_ms").and_then(|v| v.as_u64()) {
                self.pipeline.stage_timeout_ms = timeout;
            }
            if let Some(policy) = pipeline.get("chunk_policy") {
                self.pipeline.chunk_policy = serde_json::from_value(policy.clone())?;
            }
        }

        if let Some(chat) = partial_config.get("chat") {
            if let Some(max) = chat.get("max_connections").and_then(|v| v.as_u64()) {
                self.chat.max_connections = max as usize;
            }
        }

        self.validate()?;
        Ok(())
    }
}
