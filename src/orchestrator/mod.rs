//! Recording orchestration
//!
//! One `TranscriptionOrchestrator` drives a recording at a time: it resolves
//! the fallback chain, keeps a provider session alive (opening the next chain
//! entry when one fails), reconciles session events into the transcript, and
//! runs the summarization ticks. A single event-loop task owns the
//! `TranscriptState`; provider transports and timers never touch it directly,
//! they hand results to the loop. Observers watch immutable snapshots.

use std::sync::Arc;
use std::time::Duration;
use std::vec::IntoIter;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::analysis::{final_analysis_prompt, live_insight_prompt, AnalysisClient};
use crate::audio::{AudioCapture, AudioFormat, AudioPlatform};
use crate::error::RecordingError;
use crate::provider::{
    select_chain, selector::resolve_language, ProviderConfig, ProviderKind, ProviderSession,
    ProviderSettings, SessionFactory, TranscriptEvent,
};
use crate::scheduler::SummarySchedule;
use crate::session::{SessionRecord, SessionSink};
use crate::transcript::{is_phantom_text, TranscriptState};

/// How often newly captured audio is forwarded to the active session.
const AUDIO_PUMP_INTERVAL: Duration = Duration::from_millis(100);

/// Recording lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Starting,
    Active,
    Stopping,
}

/// Snapshot published to observers on every state change.
#[derive(Debug, Clone)]
pub struct TranscriptSnapshot {
    pub committed: String,
    pub interim: String,
    pub insights: String,
    pub status: String,
    pub recording: bool,
}

impl Default for TranscriptSnapshot {
    fn default() -> Self {
        Self {
            committed: String::new(),
            interim: String::new(),
            insights: String::new(),
            status: "Ready".to_string(),
            recording: false,
        }
    }
}

/// Orchestrator tuning that is not part of the per-session provider snapshot.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub schedule: SummarySchedule,
    /// Language the insight text is written in
    pub reply_language: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            schedule: SummarySchedule::default(),
            reply_language: "English".to_string(),
        }
    }
}

pub struct TranscriptionOrchestrator {
    config: OrchestratorConfig,
    capture: Arc<dyn AudioCapture>,
    platform: Arc<dyn AudioPlatform>,
    sessions: Arc<dyn SessionFactory>,
    sink: Arc<dyn SessionSink>,
    analysis: Option<Arc<dyn AnalysisClient>>,
    state: Arc<Mutex<RunState>>,
    snapshot_tx: Arc<watch::Sender<TranscriptSnapshot>>,
    control: Mutex<Option<ControlHandle>>,
}

struct ControlHandle {
    stop_tx: mpsc::Sender<()>,
    task: JoinHandle<Option<SessionRecord>>,
}

impl TranscriptionOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        capture: Arc<dyn AudioCapture>,
        platform: Arc<dyn AudioPlatform>,
        sessions: Arc<dyn SessionFactory>,
        sink: Arc<dyn SessionSink>,
        analysis: Option<Arc<dyn AnalysisClient>>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(TranscriptSnapshot::default());
        Self {
            config,
            capture,
            platform,
            sessions,
            sink,
            analysis,
            state: Arc::new(Mutex::new(RunState::Stopped)),
            snapshot_tx: Arc::new(snapshot_tx),
            control: Mutex::new(None),
        }
    }

    /// Observe transcript/insight/status snapshots. Any number of observers
    /// may attach; none affects recording behavior.
    pub fn subscribe(&self) -> watch::Receiver<TranscriptSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub async fn run_state(&self) -> RunState {
        *self.state.lock().await
    }

    /// Begin a recording session with an immutable settings snapshot.
    ///
    /// Fails fast, before requesting microphone permission, when no provider
    /// is configured. Settings changes made while recording apply to the
    /// next session.
    pub async fn start(&self, settings: ProviderSettings) -> Result<(), RecordingError> {
        // The control lock serializes start/stop transitions; the run loop
        // itself never takes it.
        let mut control = self.control.lock().await;

        {
            let mut state = self.state.lock().await;
            if *state != RunState::Stopped {
                warn!("Already recording, ignoring start request");
                return Err(RecordingError::AlreadyRecording);
            }
            *state = RunState::Starting;
        }

        match self.start_inner(settings).await {
            Ok(handle) => {
                *control = Some(handle);
                Ok(())
            }
            Err(e) => {
                *self.state.lock().await = RunState::Stopped;
                Err(e)
            }
        }
    }

    async fn start_inner(&self, settings: ProviderSettings) -> Result<ControlHandle, RecordingError> {
        let chain = select_chain(&settings);
        if chain.is_empty() {
            self.publish_status("No transcription provider configured", false);
            return Err(RecordingError::NoProviderConfigured);
        }
        info!(
            "Fallback chain: {}",
            chain
                .iter()
                .map(|entry| entry.kind.label())
                .collect::<Vec<_>>()
                .join(" -> ")
        );

        self.publish_status("Requesting permissions...", false);
        if !self.platform.request_microphone_permission().await {
            warn!("Microphone permission denied");
            self.publish_status("Microphone access denied - enable in System Settings", false);
            return Err(RecordingError::PermissionDenied);
        }

        self.capture
            .start()
            .await
            .map_err(|e| RecordingError::Capture(e.to_string()))?;

        let format = self.capture.format();
        let mut chain = chain.into_iter();
        let Some((session, events, kind)) = open_next(&*self.sessions, &mut chain, &format).await
        else {
            let _ = self.capture.stop().await;
            self.publish_status("No transcription available", false);
            return Err(RecordingError::AllProvidersFailed);
        };

        // Reset observer state for the new session before going live.
        self.snapshot_tx.send_modify(|snapshot| {
            *snapshot = TranscriptSnapshot {
                status: format!("Recording ({})...", kind.label()),
                recording: true,
                ..TranscriptSnapshot::default()
            };
        });

        let ctx = LoopContext {
            capture: Arc::clone(&self.capture),
            sessions: Arc::clone(&self.sessions),
            sink: Arc::clone(&self.sink),
            analysis: self.analysis.clone(),
            schedule: self.config.schedule.clone(),
            reply_language: self.config.reply_language.clone(),
            snapshot_tx: Arc::clone(&self.snapshot_tx),
            state: Arc::clone(&self.state),
            language: resolve_language(&settings.language, &settings.system_language),
            started_at: Utc::now(),
        };

        let (stop_tx, stop_rx) = mpsc::channel(1);
        *self.state.lock().await = RunState::Active;
        let task = tokio::spawn(run_loop(ctx, session, events, chain, stop_rx));

        Ok(ControlHandle { stop_tx, task })
    }

    /// Stop the active recording and return the finished session record.
    ///
    /// A no-op returning `None` when nothing is recording.
    pub async fn stop(&self) -> Option<SessionRecord> {
        let mut control = self.control.lock().await;

        {
            let mut state = self.state.lock().await;
            if *state != RunState::Active {
                // Covers both "never started" and "the loop already wound
                // itself down after exhausting the chain".
                control.take();
                return None;
            }
            *state = RunState::Stopping;
        }

        let record = match control.take() {
            Some(ControlHandle { stop_tx, task }) => {
                let _ = stop_tx.send(()).await;
                match task.await {
                    Ok(record) => record,
                    Err(e) => {
                        error!("Recording task panicked: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        *self.state.lock().await = RunState::Stopped;
        record
    }

    fn publish_status(&self, status: &str, recording: bool) {
        self.snapshot_tx.send_modify(|snapshot| {
            snapshot.status = status.to_string();
            snapshot.recording = recording;
        });
    }
}

struct LoopContext {
    capture: Arc<dyn AudioCapture>,
    sessions: Arc<dyn SessionFactory>,
    sink: Arc<dyn SessionSink>,
    analysis: Option<Arc<dyn AnalysisClient>>,
    schedule: SummarySchedule,
    reply_language: String,
    snapshot_tx: Arc<watch::Sender<TranscriptSnapshot>>,
    state: Arc<Mutex<RunState>>,
    /// Resolved language hint, used for the record when nothing was detected
    language: String,
    started_at: DateTime<Utc>,
}

/// Open chain entries in order until one connects.
async fn open_next(
    factory: &dyn SessionFactory,
    chain: &mut IntoIter<ProviderConfig>,
    format: &AudioFormat,
) -> Option<(
    Box<dyn ProviderSession>,
    mpsc::Receiver<TranscriptEvent>,
    ProviderKind,
)> {
    for config in chain.by_ref() {
        let mut session = factory.create(&config);
        match session.open(format).await {
            Ok(events) => {
                info!("Transcription session opened ({})", config.kind.label());
                return Some((session, events, config.kind));
            }
            Err(e) => warn!("{} session failed to open: {}", config.kind.label(), e),
        }
    }
    None
}

/// Replace a failed session with the next chain entry.
///
/// The capture offset rewinds to zero so the replacement session hears the
/// whole recording; bytes pushed during the failure window are replayed, not
/// dropped. Returns false when the chain is exhausted.
async fn fail_over(
    ctx: &LoopContext,
    chain: &mut IntoIter<ProviderConfig>,
    session: &mut Box<dyn ProviderSession>,
    events: &mut mpsc::Receiver<TranscriptEvent>,
    format: &AudioFormat,
    offset: &mut usize,
) -> bool {
    session.close(false).await;

    match open_next(&*ctx.sessions, chain, format).await {
        Some((next_session, next_events, kind)) => {
            *session = next_session;
            *events = next_events;
            *offset = 0;
            ctx.snapshot_tx.send_modify(|snapshot| {
                snapshot.status = format!("Recording ({})...", kind.label());
            });
            true
        }
        None => {
            error!("All transcription providers failed");
            ctx.snapshot_tx.send_modify(|snapshot| {
                snapshot.status = "No transcription available".to_string();
            });
            false
        }
    }
}

async fn run_loop(
    ctx: LoopContext,
    mut session: Box<dyn ProviderSession>,
    mut events: mpsc::Receiver<TranscriptEvent>,
    mut chain: IntoIter<ProviderConfig>,
    mut stop_rx: mpsc::Receiver<()>,
) -> Option<SessionRecord> {
    let format = ctx.capture.format();
    let mut transcript = TranscriptState::new();
    let mut offset: usize = 0;
    let mut detected_language: Option<String> = None;
    let mut live_insights = String::new();
    let mut last_published = String::new();
    let mut last_insight_len: usize = 0;
    let mut insight_in_flight = false;

    let (insight_tx, mut insight_rx) = mpsc::channel::<(usize, Result<String, String>)>(1);

    let mut audio_tick = interval(AUDIO_PUMP_INTERVAL);
    audio_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut transcript_tick = interval(ctx.schedule.transcript_interval);
    transcript_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut insight_tick = interval(ctx.schedule.insight_interval);
    insight_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let graceful = loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                info!("Stopping recording...");
                break true;
            }

            event = events.recv() => {
                match event {
                    Some(TranscriptEvent::Error { message }) => {
                        warn!("{} reported an error: {}", session.kind().label(), message);
                        if !fail_over(&ctx, &mut chain, &mut session, &mut events, &format, &mut offset).await {
                            break false;
                        }
                    }
                    Some(event) => {
                        apply_event(&ctx, event, &mut transcript, &mut detected_language, &live_insights);
                    }
                    None => {
                        warn!("{} event stream ended unexpectedly", session.kind().label());
                        if !fail_over(&ctx, &mut chain, &mut session, &mut events, &format, &mut offset).await {
                            break false;
                        }
                    }
                }
            }

            _ = audio_tick.tick() => {
                let bytes = ctx.capture.bytes_since(offset);
                if bytes.is_empty() {
                    continue;
                }
                match session.push_audio(&bytes).await {
                    Ok(()) => offset += bytes.len(),
                    Err(e) => {
                        warn!("Audio push to {} failed: {}", session.kind().label(), e);
                        if !fail_over(&ctx, &mut chain, &mut session, &mut events, &format, &mut offset).await {
                            break false;
                        }
                    }
                }
            }

            _ = transcript_tick.tick() => {
                let displayed = transcript.displayed();
                if !displayed.is_empty() && displayed != last_published {
                    debug!("Transcript update: {} chars", displayed.chars().count());
                    last_published = displayed;
                    publish(&ctx, &transcript, &live_insights);
                }
            }

            _ = insight_tick.tick() => {
                if insight_in_flight {
                    continue;
                }
                let Some(analysis) = ctx.analysis.clone() else {
                    continue;
                };
                if !ctx.schedule.should_generate_insights(transcript.committed(), last_insight_len) {
                    debug!(
                        "Skipping insights ({} chars committed)",
                        transcript.committed().chars().count()
                    );
                    continue;
                }

                let committed_len = transcript.committed().trim().chars().count();
                let prompt = live_insight_prompt(
                    &ctx.reply_language,
                    ctx.schedule.insight_tail(transcript.committed()),
                );
                let max_tokens = ctx.schedule.insight_max_tokens;
                let result_tx = insight_tx.clone();
                insight_in_flight = true;
                info!("Generating live insights ({} chars committed)", committed_len);

                tokio::spawn(async move {
                    let outcome = analysis
                        .analyze(&prompt, max_tokens)
                        .await
                        .map_err(|e| e.to_string());
                    let _ = result_tx.send((committed_len, outcome)).await;
                });
            }

            result = insight_rx.recv() => {
                insight_in_flight = false;
                if let Some((committed_len, outcome)) = result {
                    match outcome {
                        Ok(text) => {
                            info!("Live insights updated ({} chars)", text.chars().count());
                            live_insights = text;
                            last_insight_len = committed_len;
                            publish(&ctx, &transcript, &live_insights);
                        }
                        // Best-effort: the previous insight text stays up.
                        Err(e) => warn!("Insight generation failed: {}", e),
                    }
                }
            }
        }
    };

    session.close(graceful).await;
    if let Err(e) = ctx.capture.stop().await {
        warn!("Failed to stop audio capture: {}", e);
    }

    // Fold any outstanding preview into the committed transcript.
    if let Some(tail) = transcript.take_interim() {
        if !is_phantom_text(&tail) {
            transcript.commit(&tail);
        }
    }
    publish(&ctx, &transcript, &live_insights);

    // A graceful stop returns the status bar to idle; an exhausted chain
    // keeps its failure message visible.
    let idle_status = if graceful {
        "Ready"
    } else {
        "No transcription available"
    };

    let final_transcript = transcript.committed().trim().to_string();
    if final_transcript.is_empty() {
        info!("Recording ended with an empty transcript; nothing to save");
        finish(&ctx, idle_status).await;
        return None;
    }

    // The final analysis becomes the session's permanent insights text; on
    // failure the last live insight stands in.
    let mut insights = live_insights.clone();
    if let Some(analysis) = &ctx.analysis {
        ctx.snapshot_tx.send_modify(|snapshot| {
            snapshot.status = "Generating final analysis...".to_string();
        });
        let prompt = final_analysis_prompt(&ctx.reply_language, &final_transcript);
        let max_tokens = ctx.schedule.final_max_tokens(&final_transcript);
        match analysis.analyze(&prompt, max_tokens).await {
            Ok(text) => {
                info!("Final analysis generated ({} chars)", text.chars().count());
                insights = text;
            }
            Err(e) => warn!("Final analysis failed: {}", e),
        }
    }

    let record = SessionRecord {
        id: Uuid::new_v4(),
        started_at: ctx.started_at,
        ended_at: Utc::now(),
        transcript: final_transcript,
        insights: insights.clone(),
        language: detected_language.unwrap_or_else(|| ctx.language.clone()),
    };

    ctx.snapshot_tx.send_modify(|snapshot| {
        snapshot.insights = insights;
    });

    match ctx.sink.persist(&record).await {
        Ok(()) => finish(&ctx, idle_status).await,
        Err(e) => {
            error!("Failed to save session: {}", e);
            finish(&ctx, "Failed to save session").await;
        }
    }

    Some(record)
}

fn apply_event(
    ctx: &LoopContext,
    event: TranscriptEvent,
    transcript: &mut TranscriptState,
    detected_language: &mut Option<String>,
    insights: &str,
) {
    match event {
        TranscriptEvent::Partial { text } => {
            debug!("Interim: {}", preview(&text));
            transcript.set_interim(&text);
            publish(ctx, transcript, insights);
        }
        TranscriptEvent::Final { text, .. } => {
            if is_phantom_text(&text) {
                debug!("Dropping phantom text: {}", preview(&text));
            } else {
                info!("Final: {}", preview(&text));
                transcript.commit(&text);
            }
            // Either way the turn is over; the preview is stale.
            transcript.clear_interim();
            publish(ctx, transcript, insights);
        }
        TranscriptEvent::LanguageDetected {
            language,
            confidence,
        } => {
            match confidence {
                Some(confidence) => info!(
                    "Detected language: {} (confidence {:.0}%)",
                    language,
                    confidence * 100.0
                ),
                None => info!("Detected language: {}", language),
            }
            *detected_language = Some(language);
        }
        TranscriptEvent::SessionMeta { id } => {
            debug!("Transcription session id: {}", id);
        }
        TranscriptEvent::Error { message } => {
            // Routed to fallback by the event loop before this point.
            warn!("Unrouted provider error: {}", message);
        }
    }
}

fn publish(ctx: &LoopContext, transcript: &TranscriptState, insights: &str) {
    ctx.snapshot_tx.send_modify(|snapshot| {
        snapshot.committed = transcript.committed().to_string();
        snapshot.interim = transcript.interim().to_string();
        snapshot.insights = insights.to_string();
    });
}

async fn finish(ctx: &LoopContext, status: &str) {
    ctx.snapshot_tx.send_modify(|snapshot| {
        snapshot.status = status.to_string();
        snapshot.recording = false;
    });
    // The loop may be ending on its own (exhausted chain); make sure the
    // lifecycle reflects it even when no stop() call is in progress.
    *ctx.state.lock().await = RunState::Stopped;
}

fn preview(text: &str) -> String {
    let mut preview: String = text.chars().take(50).collect();
    if preview.chars().count() < text.chars().count() {
        preview.push_str("...");
    }
    preview
}
