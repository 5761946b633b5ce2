use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use nota::{
    AnalysisClient, AudioCapture, AudioPlatform, Config, HostPlatform, JsonSessionStore,
    NetworkSessionFactory, OpenAiAnalysis, OrchestratorConfig, SummarySchedule,
    TranscriptionOrchestrator, WavFileCapture,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "nota", version, about = "Meeting transcription with live insights")]
struct Args {
    /// Configuration file, without extension
    #[arg(long, default_value = "config/nota")]
    config: String,

    /// WAV file to transcribe as if it were captured live
    input: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} starting", cfg.service.name);

    let platform = Arc::new(HostPlatform);
    for device in platform.list_input_devices() {
        info!("Input device: {} ({})", device.name, device.id);
    }

    let capture = Arc::new(WavFileCapture::open(&args.input)?);
    let format = capture.format();
    if format.sample_rate != cfg.audio.sample_rate || format.channels != cfg.audio.channels {
        warn!(
            "Input is {}Hz/{}ch; configured target is {}Hz/{}ch - providers may mishear",
            format.sample_rate, format.channels, cfg.audio.sample_rate, cfg.audio.channels
        );
    }

    let store = Arc::new(JsonSessionStore::new(&cfg.storage.sessions_path)?);
    let analysis: Option<Arc<dyn AnalysisClient>> = match &cfg.providers.openai_key {
        Some(key) if !key.trim().is_empty() => Some(Arc::new(OpenAiAnalysis::new(
            key.clone(),
            cfg.analysis.model.clone(),
        )?)),
        _ => None,
    };

    let orchestrator = TranscriptionOrchestrator::new(
        OrchestratorConfig {
            schedule: SummarySchedule::default(),
            reply_language: cfg.analysis.reply_language.clone(),
        },
        capture,
        platform,
        Arc::new(NetworkSessionFactory),
        store,
        analysis,
    );

    // Mirror status transitions the way a status bar would.
    let mut updates = orchestrator.subscribe();
    tokio::spawn(async move {
        let mut last_status = String::new();
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            if snapshot.status != last_status {
                info!("Status: {}", snapshot.status);
                last_status = snapshot.status;
            }
        }
    });

    orchestrator.start(cfg.provider_settings()).await?;
    info!("Recording - press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    if let Some(record) = orchestrator.stop().await {
        info!(
            "Saved session {} ({:.1}s, {} chars)",
            record.id,
            record.duration_secs(),
            record.transcript.chars().count()
        );
        println!("{}", record.transcript);
        if !record.insights.is_empty() {
            println!("\n{}", record.insights);
        }
    }

    Ok(())
}
