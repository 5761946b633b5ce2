use anyhow::{Context, Result};
use async_trait::async_trait;
use hound::WavReader;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;
use tracing::info;

use super::capture::{AudioCapture, AudioFormat};

/// Capture source backed by a WAV file, released at wall-clock pace.
///
/// Reads the whole file up front, then exposes bytes as if a microphone were
/// producing them live, so sessions see the same cadence they would get from
/// real capture hardware.
pub struct WavFileCapture {
    format: AudioFormat,
    bytes: Vec<u8>,
    duration_seconds: f64,
    started: Mutex<Option<Instant>>,
}

impl WavFileCapture {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        let bytes = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        Ok(Self {
            format: AudioFormat {
                sample_rate: spec.sample_rate,
                channels: spec.channels,
            },
            bytes,
            duration_seconds,
            started: Mutex::new(None),
        })
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    /// Bytes available at the current wall-clock position, sample-aligned.
    fn available(&self) -> usize {
        let Some(started) = *self.started.lock().unwrap() else {
            return 0;
        };
        let bytes_per_sec = self.format.sample_rate as usize * self.format.channels as usize * 2;
        let elapsed_ms = started.elapsed().as_millis() as usize;
        let mut available = elapsed_ms * bytes_per_sec / 1000;
        available -= available % 2;
        available.min(self.bytes.len())
    }
}

#[async_trait]
impl AudioCapture for WavFileCapture {
    async fn start(&self) -> Result<()> {
        let mut started = self.started.lock().unwrap();
        if started.is_none() {
            *started = Some(Instant::now());
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    fn bytes_since(&self, offset: usize) -> Vec<u8> {
        let available = self.available();
        if offset >= available {
            return Vec::new();
        }
        self.bytes[offset..available].to_vec()
    }

    fn captured_len(&self) -> usize {
        self.available()
    }

    fn format(&self) -> AudioFormat {
        self.format
    }
}
