//! Whisper chunked-upload session
//!
//! No live socket. Pushed audio accumulates in a rolling buffer and every few
//! seconds the whole recording so far is re-uploaded as a WAV file. There are
//! no partial events; each upload response yields at most one final span.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::selector::primary_subtag;
use super::{ProviderConfig, ProviderKind, ProviderSession, SessionState, TranscriptEvent};
use crate::audio::AudioFormat;
use crate::error::SessionError;

const ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";
const MODEL: &str = "whisper-1";
const UPLOAD_INTERVAL: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Trailing characters of the previous transcription sent as a continuation
/// prompt, biasing the model to pick up where it left off.
const PROMPT_TAIL_CHARS: usize = 200;

struct UploadState {
    audio: Vec<u8>,
    previous_text: String,
}

pub struct WhisperSession {
    config: ProviderConfig,
    state: SessionState,
    shared: Arc<Mutex<UploadState>>,
    uploader: Option<JoinHandle<()>>,
}

impl WhisperSession {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            shared: Arc::new(Mutex::new(UploadState {
                audio: Vec::new(),
                previous_text: String::new(),
            })),
            uploader: None,
        }
    }
}

#[async_trait]
impl ProviderSession for WhisperSession {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Whisper
    }

    fn state(&self) -> SessionState {
        self.state
    }

    async fn open(
        &mut self,
        format: &AudioFormat,
    ) -> Result<mpsc::Receiver<TranscriptEvent>, SessionError> {
        self.state = SessionState::Connecting;

        if self.config.api_key.trim().is_empty() {
            self.state = SessionState::Errored;
            return Err(SessionError::Auth("no API key configured".to_string()));
        }

        let client = match reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                self.state = SessionState::Errored;
                return Err(SessionError::Connect(e.to_string()));
            }
        };

        let (event_tx, event_rx) = mpsc::channel(16);
        let shared = Arc::clone(&self.shared);
        let api_key = self.config.api_key.clone();
        let language = self
            .config
            .language
            .as_deref()
            .map(|tag| primary_subtag(tag).to_string());
        let format = *format;

        self.uploader = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(UPLOAD_INTERVAL);
            tick.tick().await;
            loop {
                tick.tick().await;
                match upload_once(&client, &api_key, language.as_deref(), &format, &shared).await {
                    Ok(Some(text)) => {
                        if event_tx
                            .send(TranscriptEvent::Final {
                                text,
                                end_of_turn: true,
                            })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(SessionError::Auth(message)) => {
                        let _ = event_tx.send(TranscriptEvent::Error { message }).await;
                        return;
                    }
                    Err(e) => {
                        // Transient; the next tick re-uploads everything anyway.
                        warn!("Whisper upload failed: {}", e);
                    }
                }
            }
        }));

        info!("Whisper chunked transcription started");
        self.state = SessionState::Streaming;
        Ok(event_rx)
    }

    async fn push_audio(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        if self.state != SessionState::Streaming {
            return Ok(());
        }
        self.shared.lock().await.audio.extend_from_slice(bytes);
        Ok(())
    }

    async fn close(&mut self, _graceful: bool) {
        // No termination control message; dropping the upload timer is the
        // whole close.
        if let Some(task) = self.uploader.take() {
            task.abort();
        }
        self.state = SessionState::Closed;
    }
}

/// One upload round trip. Returns the newly transcribed text, if any.
async fn upload_once(
    client: &reqwest::Client,
    api_key: &str,
    language: Option<&str>,
    format: &AudioFormat,
    shared: &Arc<Mutex<UploadState>>,
) -> Result<Option<String>, SessionError> {
    let (wav, prompt) = {
        let state = shared.lock().await;
        if state.audio.is_empty() {
            return Ok(None);
        }
        (
            encode_wav(&state.audio, format)?,
            continuation_prompt(&state.previous_text),
        )
    };

    debug!("Uploading {} bytes of audio to Whisper", wav.len());

    let file = Part::bytes(wav)
        .file_name("audio.wav")
        .mime_str("audio/wav")
        .map_err(|e| SessionError::Protocol(e.to_string()))?;

    let mut form = Form::new().text("model", MODEL).part("file", file);
    if let Some(language) = language {
        form = form.text("language", language.to_string());
    }
    if let Some(prompt) = prompt {
        form = form.text("prompt", prompt);
    }

    let response = client
        .post(ENDPOINT)
        .bearer_auth(api_key)
        .multipart(form)
        .send()
        .await
        .map_err(|e| SessionError::Transport(e.to_string()))?;

    let status = response.status();
    if status == 401 || status == 403 {
        return Err(SessionError::Auth(format!(
            "transcription request rejected with {}",
            status
        )));
    }

    let body: TranscriptionResponse = response
        .json()
        .await
        .map_err(|e| SessionError::Protocol(e.to_string()))?;

    if let Some(error) = body.error {
        return Err(SessionError::Protocol(error.message));
    }
    let Some(text) = body.text else {
        return Ok(None);
    };

    let mut state = shared.lock().await;
    let delta = new_suffix(&state.previous_text, &text);
    if delta.is_none() && !text.trim().is_empty() && !state.previous_text.is_empty() {
        warn!("Whisper response did not extend the previous transcription; dropping");
    }
    state.previous_text = text;
    Ok(delta)
}

/// The portion of `full` beyond what the previous upload already produced.
///
/// Uploads carry the whole recording, so consecutive responses normally share
/// a prefix. A response that does not extend the previous one is dropped so
/// the committed transcript only ever grows.
fn new_suffix(previous: &str, full: &str) -> Option<String> {
    let full = full.trim();
    if full.is_empty() {
        return None;
    }
    let previous = previous.trim();
    if previous.is_empty() {
        return Some(full.to_string());
    }
    let suffix = full.strip_prefix(previous)?.trim();
    if suffix.is_empty() {
        return None;
    }
    Some(suffix.to_string())
}

fn continuation_prompt(previous: &str) -> Option<String> {
    let previous = previous.trim();
    if previous.is_empty() {
        return None;
    }
    let start = previous
        .char_indices()
        .rev()
        .nth(PROMPT_TAIL_CHARS - 1)
        .map(|(index, _)| index)
        .unwrap_or(0);
    Some(previous[start..].to_string())
}

fn encode_wav(pcm: &[u8], format: &AudioFormat) -> Result<Vec<u8>, SessionError> {
    let spec = WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer =
            WavWriter::new(&mut buffer, spec).map_err(|e| SessionError::Protocol(e.to_string()))?;
        for sample in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
                .map_err(|e| SessionError::Protocol(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
    }

    Ok(buffer.into_inner())
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}
