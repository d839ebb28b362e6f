//! # Voicebot Bridge - Main Application Entry Point
//!
//! Sets up the Actix-web server that bridges real-time audio transports with
//! the speech pipeline (STT → text generation → TTS) and serves the parallel
//! JSON text-chat endpoint.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML files + environment variables)
//! - **state**: Shared application state and request metrics
//! - **audio**: Frame accumulation, PCM codec, response emission
//! - **pipeline**: Chunk queue, single-flight dispatcher, processing stages
//! - **models**: Collaborator traits and the stage-isolating engine
//! - **chat**: Text-chat WebSocket protocol, registry, and session actor
//! - **websocket**: Voice WebSocket transport
//! - **health / handlers / middleware / error**: HTTP surface

mod audio;
mod chat;
mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod models;
mod pipeline;
mod state;
mod websocket;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::chat::ConnectionRegistry;
use crate::config::AppConfig;
use crate::models::loopback::{LoopbackGenerator, LoopbackSynthesizer, LoopbackTranscriber};
use crate::models::ModelEngine;
use crate::pipeline::PipelineStats;
use crate::state::AppState;

/// Global shutdown flag set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting voicebot-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{}",
        config.server.host, config.server.port
    );

    let app_state = AppState::new(config.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    // Loopback collaborators by default; real model integrations plug in
    // behind the same traits.
    let engine = Arc::new(ModelEngine::new(
        Arc::new(LoopbackTranscriber),
        Arc::new(LoopbackGenerator),
        Arc::new(LoopbackSynthesizer::default()),
        config.stage_timeout(),
    ));
    let registry = Arc::new(ConnectionRegistry::new(config.chat.max_connections));
    let pipeline_stats = Arc::new(PipelineStats::default());

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::from(engine.clone()))
            .app_data(web::Data::from(registry.clone()))
            .app_data(web::Data::from(pipeline_stats.clone()))
            .wrap(cors)
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api/v1")
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config)),
            )
            .route("/health", web::get().to(health::health_check))
            .route("/ws/chat", web::get().to(chat::session::chat_websocket))
            .route("/ws/voice", web::get().to(websocket::voice_websocket))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize structured logging.
///
/// `RUST_LOG` controls verbosity; without it the default filter keeps this
/// crate at debug and actix at info.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voicebot_bridge=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM/SIGINT and flip the shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
