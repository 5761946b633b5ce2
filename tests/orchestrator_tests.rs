// Integration tests for the recording orchestrator
//
// Scripted provider sessions drive the fallback state machine without any
// network: each script says whether the session connects, which events it
// emits, and at which audio push it drops the transport.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::sleep;

use nota::{
    AudioFormat, AudioPlatform, BufferedCapture, InputDevice, OrchestratorConfig, ProviderConfig,
    ProviderKind, ProviderSession, ProviderSettings, RecordingError, RunState, SessionError,
    SessionFactory, SessionRecord, SessionSink, SessionState, TranscriptEvent,
    TranscriptionOrchestrator,
};

// ============================================================================
// Test doubles
// ============================================================================

struct FakePlatform {
    grant: bool,
    asked: Arc<AtomicBool>,
}

#[async_trait]
impl AudioPlatform for FakePlatform {
    fn list_input_devices(&self) -> Vec<InputDevice> {
        Vec::new()
    }

    async fn request_microphone_permission(&self) -> bool {
        self.asked.store(true, Ordering::SeqCst);
        self.grant
    }
}

#[derive(Default)]
struct MemorySink {
    records: Mutex<Vec<SessionRecord>>,
}

impl MemorySink {
    fn saved(&self) -> Vec<SessionRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionSink for MemorySink {
    async fn persist(&self, record: &SessionRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Behavior of one scripted session instance.
#[derive(Clone)]
struct Script {
    kind: ProviderKind,
    fail_open: bool,
    /// Events queued onto the stream as soon as the session opens
    events: Vec<TranscriptEvent>,
    /// Zero-based push index at which the transport drops
    fail_push_at: Option<usize>,
    /// Every byte this instance accepted
    received: Arc<Mutex<Vec<u8>>>,
}

impl Script {
    fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            fail_open: false,
            events: Vec::new(),
            fail_push_at: None,
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

struct ScriptedSession {
    script: Script,
    state: SessionState,
    pushes: usize,
    // Kept so the event stream stays open for the session's lifetime.
    _event_tx: Option<mpsc::Sender<TranscriptEvent>>,
}

#[async_trait]
impl ProviderSession for ScriptedSession {
    fn kind(&self) -> ProviderKind {
        self.script.kind
    }

    fn state(&self) -> SessionState {
        self.state
    }

    async fn open(
        &mut self,
        _format: &AudioFormat,
    ) -> Result<mpsc::Receiver<TranscriptEvent>, SessionError> {
        if self.script.fail_open {
            self.state = SessionState::Errored;
            return Err(SessionError::Connect("scripted connect failure".to_string()));
        }

        let (tx, rx) = mpsc::channel(64);
        for event in self.script.events.clone() {
            tx.send(event).await.expect("scripted event queue overflow");
        }
        self._event_tx = Some(tx);
        self.state = SessionState::Streaming;
        Ok(rx)
    }

    async fn push_audio(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        let index = self.pushes;
        self.pushes += 1;
        if self.script.fail_push_at == Some(index) {
            self.state = SessionState::Errored;
            return Err(SessionError::Transport("scripted socket drop".to_string()));
        }
        self.script.received.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }

    async fn close(&mut self, _graceful: bool) {
        self.state = SessionState::Closed;
    }
}

struct ScriptedFactory {
    scripts: Mutex<VecDeque<Script>>,
}

impl ScriptedFactory {
    fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
        }
    }
}

impl SessionFactory for ScriptedFactory {
    fn create(&self, _config: &ProviderConfig) -> Box<dyn ProviderSession> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted session left for this chain entry");
        Box::new(ScriptedSession {
            script,
            state: SessionState::Idle,
            pushes: 0,
            _event_tx: None,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct Fixture {
    orchestrator: TranscriptionOrchestrator,
    capture: Arc<BufferedCapture>,
    sink: Arc<MemorySink>,
    asked_for_permission: Arc<AtomicBool>,
}

fn fixture(scripts: Vec<Script>, grant_permission: bool) -> Fixture {
    let capture = Arc::new(BufferedCapture::new(AudioFormat::default()));
    let sink = Arc::new(MemorySink::default());
    let asked = Arc::new(AtomicBool::new(false));

    let orchestrator = TranscriptionOrchestrator::new(
        OrchestratorConfig::default(),
        capture.clone(),
        Arc::new(FakePlatform {
            grant: grant_permission,
            asked: asked.clone(),
        }),
        Arc::new(ScriptedFactory::new(scripts)),
        sink.clone(),
        None,
    );

    Fixture {
        orchestrator,
        capture,
        sink,
        asked_for_permission: asked,
    }
}

fn both_streaming_keys() -> ProviderSettings {
    ProviderSettings {
        deepgram_key: Some("dg-key".to_string()),
        assemblyai_key: Some("aai-key".to_string()),
        ..ProviderSettings::default()
    }
}

fn deepgram_only() -> ProviderSettings {
    ProviderSettings {
        deepgram_key: Some("dg-key".to_string()),
        ..ProviderSettings::default()
    }
}

fn partial(text: &str) -> TranscriptEvent {
    TranscriptEvent::Partial {
        text: text.to_string(),
    }
}

fn final_turn(text: &str) -> TranscriptEvent {
    TranscriptEvent::Final {
        text: text.to_string(),
        end_of_turn: true,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn partials_preview_then_finals_commit() -> Result<()> {
    let mut script = Script::new(ProviderKind::Deepgram);
    script.events = vec![
        partial("Hello"),
        partial("Hello wor"),
        partial("Hello worl"),
        final_turn("Hello world"),
        final_turn("how are you"),
    ];
    let fx = fixture(vec![script], true);

    fx.orchestrator.start(deepgram_only()).await?;
    fx.capture.push(&[0u8; 3200]);
    sleep(Duration::from_millis(300)).await;

    let snapshot = fx.orchestrator.subscribe().borrow().clone();
    assert_eq!(snapshot.committed, "Hello world how are you");
    assert_eq!(snapshot.interim, "");

    let record = fx
        .orchestrator
        .stop()
        .await
        .expect("a session record should be produced");
    assert_eq!(record.transcript, "Hello world how are you");
    assert_eq!(fx.sink.saved().len(), 1);
    assert_eq!(fx.orchestrator.run_state().await, RunState::Stopped);

    Ok(())
}

#[tokio::test]
async fn transport_failure_falls_over_and_replays_audio() -> Result<()> {
    let mut first = Script::new(ProviderKind::Deepgram);
    first.fail_push_at = Some(0);
    let second = Script::new(ProviderKind::AssemblyAi);
    let second_received = second.received.clone();

    let fx = fixture(vec![first, second], true);
    fx.orchestrator.start(both_streaming_keys()).await?;

    fx.capture.push(b"abcdefgh");
    sleep(Duration::from_millis(400)).await;
    fx.capture.push(b"ijklmnop");
    sleep(Duration::from_millis(400)).await;

    // Every captured byte reached the replacement session, including the
    // window that was in flight when the first transport dropped.
    assert_eq!(second_received.lock().unwrap().as_slice(), b"abcdefghijklmnop");

    let snapshot = fx.orchestrator.subscribe().borrow().clone();
    assert!(snapshot.status.contains("AssemblyAI"), "status was {:?}", snapshot.status);

    fx.orchestrator.stop().await;
    Ok(())
}

#[tokio::test]
async fn connect_failures_advance_the_chain_at_start() -> Result<()> {
    let mut first = Script::new(ProviderKind::Deepgram);
    first.fail_open = true;
    let mut second = Script::new(ProviderKind::AssemblyAi);
    second.events = vec![final_turn("made it through")];

    let fx = fixture(vec![first, second], true);
    fx.orchestrator.start(both_streaming_keys()).await?;
    sleep(Duration::from_millis(200)).await;

    let record = fx.orchestrator.stop().await.expect("record expected");
    assert_eq!(record.transcript, "made it through");
    Ok(())
}

#[tokio::test]
async fn exhausted_chain_fails_start() {
    let mut first = Script::new(ProviderKind::Deepgram);
    first.fail_open = true;
    let mut second = Script::new(ProviderKind::AssemblyAi);
    second.fail_open = true;

    let fx = fixture(vec![first, second], true);
    let err = fx
        .orchestrator
        .start(both_streaming_keys())
        .await
        .expect_err("start should fail");
    assert!(matches!(err, RecordingError::AllProvidersFailed));
    assert_eq!(fx.orchestrator.run_state().await, RunState::Stopped);
}

#[tokio::test]
async fn exhausted_chain_mid_session_returns_to_stopped() -> Result<()> {
    let mut only = Script::new(ProviderKind::Deepgram);
    only.fail_push_at = Some(0);

    let fx = fixture(vec![only], true);
    fx.orchestrator.start(deepgram_only()).await?;

    fx.capture.push(b"some audio");
    sleep(Duration::from_millis(400)).await;

    assert_eq!(fx.orchestrator.run_state().await, RunState::Stopped);
    let snapshot = fx.orchestrator.subscribe().borrow().clone();
    assert_eq!(snapshot.status, "No transcription available");
    assert!(!snapshot.recording);

    // Nothing was transcribed, so nothing was saved.
    assert!(fx.sink.saved().is_empty());
    Ok(())
}

#[tokio::test]
async fn no_configured_provider_fails_before_the_permission_prompt() {
    let fx = fixture(Vec::new(), true);

    let err = fx
        .orchestrator
        .start(ProviderSettings::default())
        .await
        .expect_err("start should fail");
    assert!(matches!(err, RecordingError::NoProviderConfigured));
    assert!(!fx.asked_for_permission.load(Ordering::SeqCst));
    assert_eq!(fx.orchestrator.run_state().await, RunState::Stopped);
}

#[tokio::test]
async fn permission_denial_returns_to_stopped() {
    let fx = fixture(vec![Script::new(ProviderKind::Deepgram)], false);

    let err = fx
        .orchestrator
        .start(deepgram_only())
        .await
        .expect_err("start should fail");
    assert!(matches!(err, RecordingError::PermissionDenied));
    assert!(fx.asked_for_permission.load(Ordering::SeqCst));
    assert_eq!(fx.orchestrator.run_state().await, RunState::Stopped);

    let snapshot = fx.orchestrator.subscribe().borrow().clone();
    assert!(snapshot.status.contains("denied"));
}

#[tokio::test]
async fn starting_twice_is_rejected() -> Result<()> {
    let fx = fixture(vec![Script::new(ProviderKind::Deepgram)], true);

    fx.orchestrator.start(deepgram_only()).await?;
    let err = fx
        .orchestrator
        .start(deepgram_only())
        .await
        .expect_err("second start should fail");
    assert!(matches!(err, RecordingError::AlreadyRecording));

    fx.orchestrator.stop().await;
    Ok(())
}

#[tokio::test]
async fn stop_while_stopped_is_a_noop() {
    let fx = fixture(Vec::new(), true);

    assert!(fx.orchestrator.stop().await.is_none());
    assert_eq!(fx.orchestrator.run_state().await, RunState::Stopped);
    assert!(fx.sink.saved().is_empty());
}

#[tokio::test]
async fn phantom_finals_are_not_committed() -> Result<()> {
    let mut script = Script::new(ProviderKind::Deepgram);
    script.events = vec![
        final_turn("thank you"),
        final_turn("go go go"),
        final_turn("We discussed the roadmap for Q3"),
    ];
    let fx = fixture(vec![script], true);

    fx.orchestrator.start(deepgram_only()).await?;
    sleep(Duration::from_millis(200)).await;

    let record = fx.orchestrator.stop().await.expect("record expected");
    assert_eq!(record.transcript, "We discussed the roadmap for Q3");
    Ok(())
}

#[tokio::test]
async fn outstanding_interim_is_folded_on_stop() -> Result<()> {
    let mut script = Script::new(ProviderKind::Deepgram);
    script.events = vec![final_turn("Hello world"), partial("wrapping up now")];
    let fx = fixture(vec![script], true);

    fx.orchestrator.start(deepgram_only()).await?;
    sleep(Duration::from_millis(200)).await;

    let record = fx.orchestrator.stop().await.expect("record expected");
    assert_eq!(record.transcript, "Hello world wrapping up now");
    Ok(())
}

#[tokio::test]
async fn detected_language_lands_in_the_record() -> Result<()> {
    let mut script = Script::new(ProviderKind::Deepgram);
    script.events = vec![
        TranscriptEvent::LanguageDetected {
            language: "ru".to_string(),
            confidence: Some(0.95),
        },
        final_turn("привет всем коллегам"),
    ];
    let fx = fixture(vec![script], true);

    fx.orchestrator.start(deepgram_only()).await?;
    sleep(Duration::from_millis(200)).await;

    let record = fx.orchestrator.stop().await.expect("record expected");
    assert_eq!(record.language, "ru");
    Ok(())
}
