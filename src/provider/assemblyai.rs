//! AssemblyAI streaming session
//!
//! Turn-based results over the v3 streaming WebSocket. Unlike Deepgram, audio
//! goes out as base64 wrapped in a JSON text frame, the envelope this API
//! requires. Turns are immutable: text arrives as interim previews until
//! `end_of_turn`, and a finalized turn never changes afterwards.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{connect_error, ProviderConfig, ProviderKind, ProviderSession, SessionState, TranscriptEvent};
use crate::audio::AudioFormat;
use crate::error::SessionError;

const ENDPOINT: &str = "wss://streaming.assemblyai.com/v3/ws";
const CLOSE_GRACE: Duration = Duration::from_millis(500);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

pub struct AssemblyAiSession {
    config: ProviderConfig,
    state: SessionState,
    sink: Option<Arc<Mutex<WsSink>>>,
    reader: Option<JoinHandle<()>>,
}

impl AssemblyAiSession {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            sink: None,
            reader: None,
        }
    }

    fn endpoint(format: &AudioFormat) -> String {
        // Always the multilingual model with detection on, so mixed-language
        // meetings keep transcribing without a reconnect.
        format!(
            "{ENDPOINT}?sample_rate={}&speech_model=universal-streaming-multilingual\
             &language_detection=true&format_turns=true",
            format.sample_rate
        )
    }
}

#[async_trait]
impl ProviderSession for AssemblyAiSession {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AssemblyAi
    }

    fn state(&self) -> SessionState {
        self.state
    }

    async fn open(
        &mut self,
        format: &AudioFormat,
    ) -> Result<mpsc::Receiver<TranscriptEvent>, SessionError> {
        self.state = SessionState::Connecting;

        let url = Self::endpoint(format);
        info!("Connecting to AssemblyAI: {}", url);

        let mut request = url
            .into_client_request()
            .map_err(|e| SessionError::Connect(e.to_string()))?;
        let auth = HeaderValue::from_str(&self.config.api_key)
            .map_err(|e| SessionError::Connect(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        let (stream, _response) = match connect_async(request).await {
            Ok(connected) => connected,
            Err(e) => {
                self.state = SessionState::Errored;
                return Err(connect_error(e));
            }
        };

        info!("AssemblyAI WebSocket connected");

        let (sink, mut source) = stream.split();
        let sink = Arc::new(Mutex::new(sink));
        let (event_tx, event_rx) = mpsc::channel(64);

        self.reader = Some(tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        for event in decode_message(&text) {
                            if event_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        let _ = event_tx
                            .send(TranscriptEvent::Error {
                                message: e.to_string(),
                            })
                            .await;
                        return;
                    }
                }
            }
        }));

        self.sink = Some(sink);
        self.state = SessionState::Streaming;
        Ok(event_rx)
    }

    async fn push_audio(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        if self.state != SessionState::Streaming {
            return Ok(());
        }
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        // Base64 inside a JSON envelope, per the v3 audio message format.
        let payload = serde_json::json!({
            "audio_data": base64::engine::general_purpose::STANDARD.encode(bytes),
        });
        let result = sink
            .lock()
            .await
            .send(Message::Text(payload.to_string()))
            .await;
        if let Err(e) = result {
            self.state = SessionState::Errored;
            return Err(SessionError::Transport(e.to_string()));
        }
        Ok(())
    }

    async fn close(&mut self, graceful: bool) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(sink) = self.sink.take() {
            if graceful && self.state == SessionState::Streaming {
                self.state = SessionState::Draining;
                let terminate = Message::Text(r#"{"type": "Terminate"}"#.to_string());
                if let Err(e) = sink.lock().await.send(terminate).await {
                    warn!("Failed to send termination to AssemblyAI: {}", e);
                }
                tokio::time::sleep(CLOSE_GRACE).await;
            }
            let _ = sink.lock().await.close().await;
        }
        if let Some(task) = self.reader.take() {
            task.abort();
        }
        self.state = SessionState::Closed;
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AssemblyAiMessage {
    Begin {
        id: Option<String>,
    },
    Turn {
        transcript: String,
        #[serde(default)]
        end_of_turn: bool,
        #[serde(default)]
        turn_is_formatted: bool,
        #[serde(default)]
        language_code: Option<String>,
        #[serde(default)]
        language_confidence: Option<f64>,
    },
    Termination {
        #[serde(default)]
        audio_duration_seconds: Option<f64>,
    },
    Error {
        error: String,
    },
    #[serde(other)]
    Unknown,
}

fn decode_message(text: &str) -> Vec<TranscriptEvent> {
    let message: AssemblyAiMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Undecodable AssemblyAI message: {}", e);
            return Vec::new();
        }
    };

    match message {
        AssemblyAiMessage::Begin { id } => {
            let id = id.unwrap_or_default();
            info!("AssemblyAI session started: {}", id);
            vec![TranscriptEvent::SessionMeta { id }]
        }
        AssemblyAiMessage::Turn {
            transcript,
            end_of_turn,
            turn_is_formatted,
            language_code,
            language_confidence,
        } => {
            let mut events = Vec::new();
            if let Some(language) = language_code {
                events.push(TranscriptEvent::LanguageDetected {
                    language,
                    confidence: language_confidence,
                });
            }
            if transcript.is_empty() {
                return events;
            }
            if end_of_turn {
                debug!(
                    "AssemblyAI turn finalized (formatted={})",
                    turn_is_formatted
                );
                events.push(TranscriptEvent::Final {
                    text: transcript,
                    end_of_turn: true,
                });
            } else {
                events.push(TranscriptEvent::Partial { text: transcript });
            }
            events
        }
        AssemblyAiMessage::Termination {
            audio_duration_seconds,
        } => {
            info!(
                "AssemblyAI session terminated: {:.1}s processed",
                audio_duration_seconds.unwrap_or(0.0)
            );
            Vec::new()
        }
        AssemblyAiMessage::Error { error } => {
            vec![TranscriptEvent::Error { message: error }]
        }
        AssemblyAiMessage::Unknown => {
            debug!("Ignoring unknown AssemblyAI message type");
            Vec::new()
        }
    }
}
