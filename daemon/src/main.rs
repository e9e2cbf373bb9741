use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use hishod::audio::{CpalInput, EndpointCapturer};
use hishod::backend::GeminiClient;
use hishod::config::load_config;
use hishod::orchestrator::{Orchestrator, OrchestratorSettings};
use hishod::output::Speaker;
use hishod::server::StatusServer;
use hishod::session::CommandDetector;
use hishod::transcription::WhisperEngine;

#[derive(Parser)]
#[command(name = "hishod")]
#[command(about = "Voice-triggered secretary daemon")]
struct Args {
    /// Path to config.toml (defaults to <config dir>/hisho/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .with_target(false)
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .init();

    info!("hisho daemon (hishod) starting...");

    let config = load_config(args.config.as_deref()).context("failed to load configuration")?;

    let api_key = match config.api_key() {
        Ok(key) => key,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    let input = CpalInput::new(&config.audio, &config.endpoint);
    input.probe().context("audio input unavailable")?;

    let interrupt = Arc::new(AtomicBool::new(false));
    let capturer = EndpointCapturer::new(input, &config.audio, &config.endpoint)
        .with_interrupt(Arc::clone(&interrupt));

    let mut engine = WhisperEngine::from_config(
        &config.whisper,
        Duration::from_secs(config.timeouts.model_download_timeout_seconds),
    )?;
    engine.load_model().await?;

    let backend = GeminiClient::new(&config.backend, api_key)?;
    let speaker = Speaker::from_config(&config.speech);
    let detector = CommandDetector::new(
        config.session.wake_phrases.clone(),
        config.session.stop_phrases.clone(),
    );

    let orchestrator = Orchestrator::new(
        capturer,
        engine,
        backend,
        speaker,
        detector,
        OrchestratorSettings::from_config(&config),
    )
    .with_interrupt(Arc::clone(&interrupt));

    let (status_tx, status_rx) = watch::channel(orchestrator.status());
    let mut orchestrator = orchestrator.with_status_channel(status_tx);

    let server = StatusServer::new(
        config.ipc.resolve_socket_path(),
        status_rx,
        Arc::clone(&interrupt),
        Duration::from_secs(config.timeouts.socket_operation_timeout_seconds),
    );
    let listener = server.bind()?;
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.serve(listener).await {
            error!("Socket server stopped: {}", e);
        }
    });

    let signal_flag = Arc::clone(&interrupt);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping after the current step");
            signal_flag.store(true, Ordering::SeqCst);
        }
    });

    info!(
        "Say one of {:?} to start a conversation",
        config.session.wake_phrases
    );

    let result = orchestrator.run().await;

    server_task.abort();
    let _ = server_task.await;

    match result {
        Ok(()) => {
            info!("hishod stopped");
            Ok(())
        }
        Err(e) => {
            error!("Audio capture failed: {}", e);
            Err(e.into())
        }
    }
}
