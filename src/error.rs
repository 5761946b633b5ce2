use thiserror::Error;

/// Failures scoped to a single provider session instance.
///
/// Any of these ends the instance; the orchestrator advances the fallback
/// chain with a fresh session instead of retrying the failed one.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Transport handshake failed (DNS, TCP, WebSocket upgrade, timeout).
    #[error("connection failed: {0}")]
    Connect(String),

    /// Provider rejected the API key.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Malformed or unexpected provider message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Established transport dropped or refused a send.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Failures surfaced by the recording state machine.
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("already recording")]
    AlreadyRecording,

    #[error("no transcription provider configured")]
    NoProviderConfigured,

    #[error("microphone access denied")]
    PermissionDenied,

    #[error("all transcription providers failed")]
    AllProvidersFailed,

    #[error("audio capture failed: {0}")]
    Capture(String),
}
