//! # Chat WebSocket Session
//!
//! Handles one `/ws/chat` connection as an Actix actor.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: Client connects, the server registers it and sends the
//!    system greeting
//! 2. **Chat**: Client sends `{"message": ..., "generate_speech": bool}`;
//!    the server replies with a bot message, in message order
//! 3. **Speech**: When requested, the synthesized reply arrives later as one
//!    binary 16-bit PCM payload (unordered relative to later text replies)
//! 4. **Errors**: Malformed JSON gets an error reply; the connection stays
//!    open

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio::pcm;
use crate::chat::protocol::{ClientMessage, ServerMessage, GREETING, INVALID_JSON};
use crate::chat::registry::ConnectionRegistry;
use crate::models::ModelEngine;

/// How often the server pings the client.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long without any client activity before the connection is dropped.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Binary audio payload for the client, produced off the actor by the
/// synthesis task.
#[derive(Message)]
#[rtype(result = "()")]
pub struct SendAudio(pub Vec<u8>);

/// WebSocket actor for one chat connection.
pub struct ChatSession {
    /// Registry ID, present once registration succeeded
    id: Option<Uuid>,

    engine: Arc<ModelEngine>,
    registry: Arc<ConnectionRegistry>,

    /// Remote peer, for the registry entry
    peer: Option<String>,

    last_heartbeat: Instant,
}

impl ChatSession {
    pub fn new(
        engine: Arc<ModelEngine>,
        registry: Arc<ConnectionRegistry>,
        peer: Option<String>,
    ) -> Self {
        Self {
            id: None,
            engine,
            registry,
            peer,
            last_heartbeat: Instant::now(),
        }
    }

    /// Generate and send the bot reply for one inbound message.
    ///
    /// The reply future runs via `ctx.wait`, so the mailbox is paused until
    /// the text reply is out — replies stay in message order. Speech
    /// synthesis, when requested, runs on a detached task and delivers its
    /// bytes through the mailbox whenever it finishes.
    fn handle_chat_message(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let engine = self.engine.clone();
        let want_speech = msg.generate_speech;

        let reply_fut = async move {
            let reply = engine.generate_reply(&msg.message).await;
            (engine, reply)
        };

        ctx.wait(actix::fut::wrap_future(reply_fut).map(
            move |(engine, reply), _act: &mut Self, ctx: &mut ws::WebsocketContext<Self>| {
                ctx.text(ServerMessage::bot(reply.clone()).to_json());

                if want_speech {
                    let addr = ctx.address();
                    tokio::spawn(async move {
                        match engine.synthesize(reply).await {
                            Ok(audio) => {
                                addr.do_send(SendAudio(pcm::encode_pcm16(&audio.samples)));
                            }
                            Err(err) => {
                                warn!("Speech synthesis for chat reply failed: {}", err);
                            }
                        }
                    });
                }
            },
        ));
    }
}

impl Actor for ChatSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        match self.registry.register(self.peer.clone()) {
            Ok(id) => {
                info!("Chat connection {} started", id);
                self.id = Some(id);
                ctx.text(ServerMessage::system(GREETING).to_json());
            }
            Err(err) => {
                warn!("Chat connection refused: {}", err);
                ctx.text(ServerMessage::error(err).to_json());
                ctx.stop();
                return;
            }
        }

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("Chat heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(id) = self.id.take() {
            self.registry.deregister(&id);
            info!("Chat connection {} stopped", id);
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChatSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => {
                        debug!("Chat message received: {} chars", client_msg.message.len());
                        self.handle_chat_message(client_msg, ctx);
                    }
                    Err(err) => {
                        debug!("Malformed chat message: {}", err);
                        ctx.text(ServerMessage::error(INVALID_JSON).to_json());
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                // The chat endpoint is JSON-only.
                ctx.text(ServerMessage::error(INVALID_JSON).to_json());
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Chat connection closed: {:?}", reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame on chat socket");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("Chat WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

impl Handler<SendAudio> for ChatSession {
    type Result = ();

    fn handle(&mut self, msg: SendAudio, ctx: &mut Self::Context) {
        debug!("Pushing {} bytes of synthesized speech", msg.0.len());
        ctx.binary(msg.0);
    }
}

/// HTTP → WebSocket upgrade handler for `/ws/chat`.
pub async fn chat_websocket(
    req: HttpRequest,
    stream: web::Payload,
    engine: web::Data<ModelEngine>,
    registry: web::Data<ConnectionRegistry>,
) -> ActixResult<HttpResponse> {
    let peer = req.connection_info().peer_addr().map(|p| p.to_string());
    info!("New chat WebSocket connection request from: {:?}", peer);

    let session = ChatSession::new(
        engine.into_inner(),
        registry.into_inner(),
        peer,
    );
    ws::start(session, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::loopback::{LoopbackGenerator, LoopbackSynthesizer, LoopbackTranscriber};
    use actix_web::App;
    use awc::error::WsProtocolError;
    use awc::ws::{Frame, Message};
    use futures_util::{SinkExt, Stream, StreamExt};

    fn start_chat_server(registry: Arc<ConnectionRegistry>) -> actix_test::TestServer {
        let engine = Arc::new(ModelEngine::new(
            Arc::new(LoopbackTranscriber),
            Arc::new(LoopbackGenerator),
            Arc::new(LoopbackSynthesizer::default()),
            Duration::from_secs(5),
        ));

        actix_test::start(move || {
            App::new()
                .app_data(web::Data::from(engine.clone()))
                .app_data(web::Data::from(registry.clone()))
                .route("/ws/chat", web::get().to(chat_websocket))
        })
    }

    async fn next_json<S>(framed: &mut S) -> serde_json::Value
    where
        S: Stream<Item = Result<Frame, WsProtocolError>> + Unpin,
    {
        match framed.next().await.unwrap().unwrap() {
            Frame::Text(bytes) => serde_json::from_slice(&bytes).unwrap(),
            other => panic!("Expected text frame, got {:?}", other),
        }
    }

    #[actix_web::test]
    async fn test_malformed_message_keeps_connection_open() {
        let registry = Arc::new(ConnectionRegistry::new(4));
        let mut srv = start_chat_server(registry.clone());
        let mut framed = srv.ws_at("/ws/chat").await.unwrap();

        let greeting = next_json(&mut framed).await;
        assert_eq!(greeting["type"], "system");
        assert_eq!(greeting["message"], GREETING);
        assert_eq!(registry.count(), 1);

        framed
            .send(Message::Text("not json".into()))
            .await
            .unwrap();
        let reply = next_json(&mut framed).await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["message"], INVALID_JSON);
        assert_eq!(registry.count(), 1);

        // The session still answers after the error reply.
        framed
            .send(Message::Text(r#"{"message": "hi"}"#.into()))
            .await
            .unwrap();
        let reply = next_json(&mut framed).await;
        assert_eq!(reply["type"], "bot");
    }

    #[actix_web::test]
    async fn test_text_reply_without_speech_sends_no_audio() {
        let registry = Arc::new(ConnectionRegistry::new(4));
        let mut srv = start_chat_server(registry.clone());
        let mut framed = srv.ws_at("/ws/chat").await.unwrap();

        let greeting = next_json(&mut framed).await;
        assert_eq!(greeting["type"], "system");

        framed
            .send(Message::Text(r#"{"message": "hi"}"#.into()))
            .await
            .unwrap();
        let reply = next_json(&mut framed).await;
        assert_eq!(reply["type"], "bot");
        assert_eq!(reply["message"], "You said: hi");

        // No binary payload follows a text-only request.
        let quiet = tokio::time::timeout(Duration::from_millis(200), framed.next()).await;
        assert!(quiet.is_err());
    }

    #[actix_web::test]
    async fn test_speech_request_pushes_binary_audio() {
        let registry = Arc::new(ConnectionRegistry::new(4));
        let mut srv = start_chat_server(registry.clone());
        let mut framed = srv.ws_at("/ws/chat").await.unwrap();

        let greeting = next_json(&mut framed).await;
        assert_eq!(greeting["type"], "system");

        framed
            .send(Message::Text(
                r#"{"message": "hi", "generate_speech": true}"#.into(),
            ))
            .await
            .unwrap();
        let reply = next_json(&mut framed).await;
        assert_eq!(reply["type"], "bot");

        match framed.next().await.unwrap().unwrap() {
            Frame::Binary(bytes) => {
                assert!(!bytes.is_empty());
                assert_eq!(bytes.len() % 2, 0);
            }
            other => panic!("Expected binary audio frame, got {:?}", other),
        }
    }
}
