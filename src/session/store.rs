use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{SessionRecord, SessionSink};

/// Stores one JSON file per session under a directory.
pub struct JsonSessionStore {
    dir: PathBuf,
}

impl JsonSessionStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).context("Failed to create sessions directory")?;
        Ok(Self { dir })
    }

    /// All stored sessions, newest first.
    pub fn list(&self) -> Result<Vec<SessionRecord>> {
        let mut records = Vec::new();

        for entry in std::fs::read_dir(&self.dir).context("Failed to read sessions directory")? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let data = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read session file {}", path.display()))?;
            match serde_json::from_str::<SessionRecord>(&data) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable session file {}: {}", path.display(), e),
            }
        }

        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(records)
    }
}

#[async_trait]
impl SessionSink for JsonSessionStore {
    async fn persist(&self, record: &SessionRecord) -> Result<()> {
        let path = self.dir.join(format!("{}.json", record.id));
        let data = serde_json::to_vec_pretty(record)?;

        tokio::fs::write(&path, data)
            .await
            .with_context(|| format!("Failed to write session file {}", path.display()))?;

        info!(
            "Session saved: {} ({:.1}s, {} chars)",
            record.id,
            record.duration_secs(),
            record.transcript.chars().count()
        );

        Ok(())
    }
}
