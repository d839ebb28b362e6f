//! # Voice WebSocket Transport
//!
//! Realizes the audio transport boundary as a WebSocket endpoint. Clients
//! connect to `/ws/voice` and stream binary PCM audio; pipeline responses
//! come back as binary PCM on the same connection.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: Client connects; the bridge for this connection starts
//! 2. **Configuration**: An optional JSON `config` message overrides the
//!    inbound sample rate and channel count
//! 3. **Audio Streaming**: Binary messages carry 16-bit little-endian PCM
//! 4. **Responses**: Each synthesized reply arrives as one binary payload
//!
//! Each connection owns its own [`AudioBridge`]; frames never block the
//! connection loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::audio::emitter::AudioSink;
use crate::audio::frame::AudioFrame;
use crate::audio::pcm;
use crate::models::ModelEngine;
use crate::pipeline::{AudioBridge, BridgeSettings, PipelineStats};
use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Control messages on the voice socket. Audio itself is binary, not JSON.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VoiceMessage {
    /// Inbound audio format override from the client
    #[serde(rename = "config")]
    Config {
        sample_rate: Option<u32>,
        channels: Option<u16>,
    },

    /// Error reply for malformed control messages
    #[serde(rename = "error")]
    Error { message: String },
}

/// Outbound response audio, delivered through the actor mailbox by the
/// dispatcher worker.
#[derive(Message)]
#[rtype(result = "()")]
struct SendFrame(Vec<u8>);

/// Routes emitted pipeline audio back into this connection's mailbox.
struct WsAudioSink {
    addr: Addr<VoiceWebSocket>,
}

impl AudioSink for WsAudioSink {
    fn write_frame(&self, pcm: Vec<u8>) {
        self.addr.do_send(SendFrame(pcm));
    }
}

/// WebSocket actor for one voice connection.
pub struct VoiceWebSocket {
    engine: Arc<ModelEngine>,
    stats: Arc<PipelineStats>,
    settings: BridgeSettings,

    /// Started once the actor has an address for its sink
    bridge: Option<AudioBridge>,

    /// Inbound audio format, overridable by a config message
    sample_rate: u32,
    channels: u16,

    last_heartbeat: Instant,
}

impl VoiceWebSocket {
    pub fn new(
        engine: Arc<ModelEngine>,
        stats: Arc<PipelineStats>,
        settings: BridgeSettings,
        sample_rate: u32,
        channels: u16,
    ) -> Self {
        Self {
            engine,
            stats,
            settings,
            bridge: None,
            sample_rate,
            channels,
            last_heartbeat: Instant::now(),
        }
    }

    /// Apply a client format override, rejecting values that would break the
    /// chunking math downstream.
    fn apply_stream_config(
        &mut self,
        sample_rate: Option<u32>,
        channels: Option<u16>,
    ) -> Result<(), String> {
        if sample_rate == Some(0) {
            return Err("Sample rate must be greater than 0".to_string());
        }
        if channels == Some(0) {
            return Err("Channel count must be greater than 0".to_string());
        }

        if let Some(rate) = sample_rate {
            self.sample_rate = rate;
        }
        if let Some(count) = channels {
            self.channels = count;
        }
        Ok(())
    }

    /// Decode one binary PCM message and feed it to the bridge.
    fn handle_audio_data(&mut self, data: &[u8]) -> Result<(), String> {
        let samples = pcm::decode_pcm16(data)?;
        debug!("Received {} bytes of audio data", data.len());

        match self.bridge.as_mut() {
            Some(bridge) => {
                bridge.on_frame(AudioFrame::new(&samples, self.sample_rate, self.channels));
                Ok(())
            }
            None => Err("Audio bridge not started".to_string()),
        }
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, message: &str) {
        let error_msg = VoiceMessage::Error {
            message: message.to_string(),
        };
        if let Ok(json) = serde_json::to_string(&error_msg) {
            ctx.text(json);
        }
        warn!("Voice WebSocket error: {}", message);
    }
}

impl Actor for VoiceWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("Voice WebSocket connection started");

        let sink = Arc::new(WsAudioSink {
            addr: ctx.address(),
        });
        self.bridge = Some(AudioBridge::start(
            self.engine.clone(),
            sink,
            self.settings.clone(),
            self.stats.clone(),
        ));

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("Voice heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("Voice WebSocket connection stopped");

        // Drain the in-flight chunk in the background; the connection is
        // already gone, so any late response frame is discarded by the
        // dead mailbox.
        if let Some(bridge) = self.bridge.take() {
            tokio::spawn(bridge.shutdown());
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for VoiceWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                match serde_json::from_str::<VoiceMessage>(&text) {
                    Ok(VoiceMessage::Config {
                        sample_rate,
                        channels,
                    }) => match self.apply_stream_config(sample_rate, channels) {
                        Ok(()) => {
                            info!(
                                "Voice connection configured: {} Hz, {} channel(s)",
                                self.sample_rate, self.channels
                            );
                        }
                        Err(err) => {
                            self.send_error(ctx, &format!("Invalid config: {}", err));
                        }
                    },
                    Ok(VoiceMessage::Error { .. }) => {
                        warn!("Received unexpected message type from client");
                    }
                    Err(err) => {
                        self.send_error(ctx, &format!("Invalid JSON: {}", err));
                    }
                }
            }
            Ok(ws::Message::Binary(data)) => {
                self.last_heartbeat = Instant::now();
                if let Err(err) = self.handle_audio_data(&data) {
                    self.send_error(ctx, &format!("Invalid audio: {}", err));
                }
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Voice WebSocket closed: {:?}", reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame on voice socket");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("Voice WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

impl Handler<SendFrame> for VoiceWebSocket {
    type Result = ();

    fn handle(&mut self, msg: SendFrame, ctx: &mut Self::Context) {
        debug!("Pushing {} bytes of response audio", msg.0.len());
        ctx.binary(msg.0);
    }
}

/// HTTP → WebSocket upgrade handler for `/ws/voice`.
pub async fn voice_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
    engine: web::Data<ModelEngine>,
    stats: web::Data<PipelineStats>,
) -> ActixResult<HttpResponse> {
    info!(
        "New voice WebSocket connection request from: {:?}",
        req.connection_info().peer_addr()
    );

    let config = app_state.get_config();
    let websocket = VoiceWebSocket::new(
        engine.into_inner(),
        stats.into_inner(),
        config.bridge_settings(),
        config.audio.sample_rate,
        config.audio.channels,
    );

    ws::start(websocket, &req, stream)
}
