//! Transcription provider sessions
//!
//! Three backends speak three different wire protocols:
//! - AssemblyAI: WebSocket, base64-in-JSON audio frames, turn-based results
//! - Deepgram: WebSocket, raw binary audio frames, continuous results
//! - Whisper: periodic multipart upload of the accumulated recording
//!
//! The encodings differ because the providers mandate them; they are kept
//! per-provider instead of being abstracted into one framing layer. A session
//! is single-use: once it errors, the orchestrator opens a fresh instance of
//! the next chain entry rather than resuming the failed one.

pub mod assemblyai;
pub mod deepgram;
pub mod selector;
pub mod whisper;

pub use assemblyai::AssemblyAiSession;
pub use deepgram::DeepgramSession;
pub use selector::{resolve_language, select_chain};
pub use whisper::WhisperSession;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::AudioFormat;
use crate::error::SessionError;

/// Transcription backend variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Deepgram,
    AssemblyAi,
    Whisper,
}

impl ProviderKind {
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::Deepgram => "Deepgram",
            ProviderKind::AssemblyAi => "AssemblyAI",
            ProviderKind::Whisper => "Whisper",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "deepgram" => Some(ProviderKind::Deepgram),
            "assemblyai" => Some(ProviderKind::AssemblyAi),
            "whisper" => Some(ProviderKind::Whisper),
            _ => None,
        }
    }
}

/// Lifecycle of one provider session instance.
///
/// `Errored` is terminal for the instance and triggers orchestrator fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Draining,
    Closed,
    Errored,
}

/// One entry of the fallback chain.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: String,
    /// Resolved locale tag, or None to let the provider auto-detect.
    pub language: Option<String>,
}

/// Provider configuration snapshot, read once per recording session.
///
/// Immutable for the duration of a recording; changes made mid-session apply
/// to the next one.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub deepgram_key: Option<String>,
    pub assemblyai_key: Option<String>,
    pub openai_key: Option<String>,
    /// "auto" or a provider name to try first
    pub preference: String,
    /// "auto", a two-letter code, or a locale tag
    pub language: String,
    /// Two-letter system language, used to resolve "auto"
    pub system_language: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            deepgram_key: None,
            assemblyai_key: None,
            openai_key: None,
            preference: "auto".to_string(),
            language: "auto".to_string(),
            system_language: "en".to_string(),
        }
    }
}

/// Events decoded from a provider's wire messages.
#[derive(Debug, Clone)]
pub enum TranscriptEvent {
    /// Non-final text for the current utterance; replaces the preview.
    Partial { text: String },
    /// Finalized text; appended to the committed transcript.
    Final { text: String, end_of_turn: bool },
    /// The provider identified the spoken language.
    LanguageDetected {
        language: String,
        confidence: Option<f64>,
    },
    /// Session-level metadata (connection/session id).
    SessionMeta { id: String },
    /// Fatal provider error; the session is done.
    Error { message: String },
}

/// A single transcription session over one transport.
#[async_trait]
pub trait ProviderSession: Send {
    fn kind(&self) -> ProviderKind;

    fn state(&self) -> SessionState;

    /// Establish the transport and return the event stream.
    async fn open(
        &mut self,
        format: &AudioFormat,
    ) -> Result<mpsc::Receiver<TranscriptEvent>, SessionError>;

    /// Forward newly captured audio. No-op unless streaming.
    async fn push_audio(&mut self, bytes: &[u8]) -> Result<(), SessionError>;

    /// Tear down the transport. A graceful close sends the provider's
    /// termination message and waits a short grace period first.
    async fn close(&mut self, graceful: bool);
}

/// Builds sessions for fallback-chain entries.
pub trait SessionFactory: Send + Sync {
    fn create(&self, config: &ProviderConfig) -> Box<dyn ProviderSession>;
}

/// Factory for the real wire implementations.
pub struct NetworkSessionFactory;

impl SessionFactory for NetworkSessionFactory {
    fn create(&self, config: &ProviderConfig) -> Box<dyn ProviderSession> {
        match config.kind {
            ProviderKind::Deepgram => Box::new(DeepgramSession::new(config.clone())),
            ProviderKind::AssemblyAi => Box::new(AssemblyAiSession::new(config.clone())),
            ProviderKind::Whisper => Box::new(WhisperSession::new(config.clone())),
        }
    }
}

/// Map a WebSocket handshake failure to the session error taxonomy.
///
/// An HTTP 401/403 during the upgrade means the key was rejected, which is
/// terminal for the provider rather than a transient connect failure.
pub(crate) fn connect_error(err: tokio_tungstenite::tungstenite::Error) -> SessionError {
    use tokio_tungstenite::tungstenite::Error;

    match &err {
        Error::Http(response) => {
            let status = response.status();
            if status == 401 || status == 403 {
                SessionError::Auth(format!("handshake rejected with {}", status))
            } else {
                SessionError::Connect(format!("handshake failed with {}", status))
            }
        }
        _ => SessionError::Connect(err.to_string()),
    }
}
