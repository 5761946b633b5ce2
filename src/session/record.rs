use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A finished recording session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,

    /// When the recording started
    pub started_at: DateTime<Utc>,

    /// When the recording stopped
    pub ended_at: DateTime<Utc>,

    /// Committed transcript, final
    pub transcript: String,

    /// Insight text from the final analysis (or the last live insight)
    pub insights: String,

    /// Language the session was transcribed in
    pub language: String,
}

impl SessionRecord {
    pub fn duration_secs(&self) -> f64 {
        self.ended_at
            .signed_duration_since(self.started_at)
            .num_milliseconds() as f64
            / 1000.0
    }
}

/// Destination for finished sessions.
#[async_trait]
pub trait SessionSink: Send + Sync {
    async fn persist(&self, record: &SessionRecord) -> Result<()>;
}
