//! slidecast-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Construct the collaborator clients and the pipeline service.
//! 4. Build the Axum router and start the HTTP server with graceful shutdown.

mod config;
mod error;
mod routes;
mod schemas;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use slidecast_core::collab::{
    FfmpegMuxer, HttpSpeechSynthesizer, HttpTranscriber, LlmSceneCoder, LlmStoryboarder,
    ManimRenderer,
};
use slidecast_core::{Collaborators, VideoService};

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: SLIDECAST_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "slidecast-server starting");

    // ── 3. Pipeline service ────────────────────────────────────────────────────
    tokio::fs::create_dir_all(&cfg.work_dir).await?;

    let collaborators = Collaborators {
        storyboarder: Arc::new(LlmStoryboarder::new(cfg.llm_model.clone())),
        coder: Arc::new(LlmSceneCoder::new(cfg.llm_model.clone())),
        speech: Arc::new(HttpSpeechSynthesizer::new(
            cfg.speech_endpoint.clone(),
            cfg.speech_model.clone(),
            cfg.speech_voice.clone(),
        )),
        transcriber: Arc::new(HttpTranscriber::new(
            cfg.transcribe_endpoint.clone(),
            cfg.transcribe_model.clone(),
        )),
        renderer: Arc::new(ManimRenderer::new(cfg.renderer_bin.clone())),
        muxer: Arc::new(FfmpegMuxer::new()),
    };
    let service = VideoService::new(cfg.pipeline_config(), collaborators);
    info!(work_dir = %cfg.work_dir.display(), model = %cfg.llm_model, "pipeline ready");

    // ── 4. Shared application state ────────────────────────────────────────────
    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        service,
    });

    // ── 5. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("slidecast-server stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c   => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
