use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Audio format produced by a capture source (PCM16 little-endian).
#[derive(Debug, Clone, Copy)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz, what the transcription providers expect
            channels: 1,        // Mono
        }
    }
}

/// Offset-addressed audio source.
///
/// The capture side appends continuously on its own thread; readers only ever
/// ask for "bytes since offset N" and never mutate the stream. This is what
/// makes provider fallback lossless: a replacement session replays from an
/// earlier offset instead of missing whatever was said during the switch.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Start capturing audio
    async fn start(&self) -> Result<()>;

    /// Stop capturing audio
    async fn stop(&self) -> Result<()>;

    /// Bytes captured past `offset`; empty when nothing new. Never blocks.
    fn bytes_since(&self, offset: usize) -> Vec<u8>;

    /// Total bytes captured so far
    fn captured_len(&self) -> usize;

    /// Format of the captured stream
    fn format(&self) -> AudioFormat;
}

/// In-memory capture buffer fed by the embedding application (or a test).
pub struct BufferedCapture {
    format: AudioFormat,
    buffer: Mutex<Vec<u8>>,
    capturing: AtomicBool,
}

impl BufferedCapture {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            buffer: Mutex::new(Vec::new()),
            capturing: AtomicBool::new(false),
        }
    }

    /// Append captured bytes. Only the capture side writes.
    pub fn push(&self, bytes: &[u8]) {
        self.buffer.lock().unwrap().extend_from_slice(bytes);
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioCapture for BufferedCapture {
    async fn start(&self) -> Result<()> {
        self.capturing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn bytes_since(&self, offset: usize) -> Vec<u8> {
        let buffer = self.buffer.lock().unwrap();
        if offset >= buffer.len() {
            return Vec::new();
        }
        buffer[offset..].to_vec()
    }

    fn captured_len(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    fn format(&self) -> AudioFormat {
        self.format
    }
}
