//! Deepgram live-streaming session
//!
//! Continuous results over a WebSocket: raw PCM16 binary frames out, JSON
//! `Results`/`Metadata`/`UtteranceEnd` messages in. The connection is kept
//! alive through silence with a periodic `KeepAlive` control frame, which is
//! a protocol-level liveness signal independent of audio flow.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
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

const ENDPOINT: &str = "wss://api.deepgram.com/v1/listen";
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);
const CLOSE_GRACE: Duration = Duration::from_millis(500);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

pub struct DeepgramSession {
    config: ProviderConfig,
    state: SessionState,
    sink: Option<Arc<Mutex<WsSink>>>,
    reader: Option<JoinHandle<()>>,
    keepalive: Option<JoinHandle<()>>,
}

impl DeepgramSession {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            sink: None,
            reader: None,
            keepalive: None,
        }
    }

    fn endpoint(format: &AudioFormat) -> String {
        // language=multi turns on automatic language detection; endpointing
        // finalizes a turn after 300ms of silence.
        format!(
            "{ENDPOINT}?encoding=linear16&sample_rate={}&channels={}&model=nova-2\
             &language=multi&detect_language=true&punctuate=true&interim_results=true\
             &endpointing=300",
            format.sample_rate, format.channels
        )
    }
}

#[async_trait]
impl ProviderSession for DeepgramSession {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Deepgram
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
        info!("Connecting to Deepgram: {}", url);

        let mut request = url
            .into_client_request()
            .map_err(|e| SessionError::Connect(e.to_string()))?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.config.api_key))
            .map_err(|e| SessionError::Connect(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        let (stream, _response) = match connect_async(request).await {
            Ok(connected) => connected,
            Err(e) => {
                self.state = SessionState::Errored;
                return Err(connect_error(e));
            }
        };

        info!("Deepgram WebSocket connected");

        let (sink, mut source) = stream.split();
        let sink = Arc::new(Mutex::new(sink));
        let (event_tx, event_rx) = mpsc::channel(64);

        // Decode provider messages into transcript events.
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

        // Liveness signal while no audio is flowing.
        let keepalive_sink = Arc::clone(&sink);
        self.keepalive = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(KEEPALIVE_INTERVAL);
            tick.tick().await;
            loop {
                tick.tick().await;
                let frame = Message::Text(r#"{"type": "KeepAlive"}"#.to_string());
                if keepalive_sink.lock().await.send(frame).await.is_err() {
                    warn!("Failed to send KeepAlive to Deepgram");
                    return;
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
        // Raw PCM binary frames, no envelope.
        let result = sink.lock().await.send(Message::Binary(bytes.to_vec())).await;
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
        if let Some(task) = self.keepalive.take() {
            task.abort();
        }
        if let Some(sink) = self.sink.take() {
            if graceful && self.state == SessionState::Streaming {
                self.state = SessionState::Draining;
                let close = Message::Text(r#"{"type": "CloseStream"}"#.to_string());
                if let Err(e) = sink.lock().await.send(close).await {
                    warn!("Failed to send CloseStream to Deepgram: {}", e);
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
enum DeepgramMessage {
    Results {
        channel: Channel,
        #[serde(default)]
        is_final: bool,
        #[serde(default)]
        speech_final: bool,
    },
    Metadata {
        request_id: Option<String>,
    },
    UtteranceEnd {},
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct Channel {
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    transcript: String,
    #[serde(default)]
    detected_language: Option<String>,
}

fn decode_message(text: &str) -> Vec<TranscriptEvent> {
    let message: DeepgramMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Undecodable Deepgram message: {}", e);
            return Vec::new();
        }
    };

    match message {
        DeepgramMessage::Results {
            channel,
            is_final,
            speech_final,
        } => {
            let Some(alternative) = channel.alternatives.into_iter().next() else {
                return Vec::new();
            };

            let mut events = Vec::new();
            if let Some(language) = alternative.detected_language {
                events.push(TranscriptEvent::LanguageDetected {
                    language,
                    confidence: None,
                });
            }

            let transcript = alternative.transcript;
            if transcript.is_empty() {
                return events;
            }

            // speech_final marks the end of a spoken turn; is_final alone
            // means the text is stable but speech continues. Both commit.
            if speech_final || is_final {
                events.push(TranscriptEvent::Final {
                    text: transcript,
                    end_of_turn: speech_final,
                });
            } else {
                events.push(TranscriptEvent::Partial { text: transcript });
            }
            events
        }
        DeepgramMessage::Metadata { request_id } => {
            let id = request_id.unwrap_or_default();
            info!("Deepgram connection established: {}", id);
            vec![TranscriptEvent::SessionMeta { id }]
        }
        DeepgramMessage::UtteranceEnd {} => {
            debug!("Deepgram utterance ended");
            Vec::new()
        }
        DeepgramMessage::Unknown => {
            debug!("Ignoring unknown Deepgram message type");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interim_results_decode_as_partial() {
        let events = decode_message(
            r#"{"type":"Results","channel":{"alternatives":[{"transcript":"hello wor"}]},"is_final":false,"speech_final":false}"#,
        );
        assert!(matches!(
            events.as_slice(),
            [TranscriptEvent::Partial { text }] if text == "hello wor"
        ));
    }

    #[test]
    fn is_final_commits_without_ending_the_turn() {
        let events = decode_message(
            r#"{"type":"Results","channel":{"alternatives":[{"transcript":"hello world"}]},"is_final":true,"speech_final":false}"#,
        );
        assert!(matches!(
            events.as_slice(),
            [TranscriptEvent::Final { text, end_of_turn: false }] if text == "hello world"
        ));
    }

    #[test]
    fn speech_final_ends_the_turn() {
        let events = decode_message(
            r#"{"type":"Results","channel":{"alternatives":[{"transcript":"hello world"}]},"is_final":true,"speech_final":true}"#,
        );
        assert!(matches!(
            events.as_slice(),
            [TranscriptEvent::Final { end_of_turn: true, .. }]
        ));
    }

    #[test]
    fn detected_language_is_surfaced() {
        let events = decode_message(
            r#"{"type":"Results","channel":{"alternatives":[{"transcript":"привет","detected_language":"ru"}]},"is_final":true,"speech_final":true}"#,
        );
        assert!(matches!(
            events.first(),
            Some(TranscriptEvent::LanguageDetected { language, .. }) if language == "ru"
        ));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn empty_transcript_produces_no_text_events() {
        let events = decode_message(
            r#"{"type":"Results","channel":{"alternatives":[{"transcript":""}]},"is_final":true,"speech_final":false}"#,
        );
        assert!(events.is_empty());
    }

    #[test]
    fn metadata_becomes_session_meta() {
        let events = decode_message(r#"{"type":"Metadata","request_id":"req-1"}"#);
        assert!(matches!(
            events.as_slice(),
            [TranscriptEvent::SessionMeta { id }] if id == "req-1"
        ));
    }

    #[test]
    fn unknown_message_types_are_ignored() {
        assert!(decode_message(r#"{"type":"SpeechStarted"}"#).is_empty());
        assert!(decode_message("not json").is_empty());
    }
}
