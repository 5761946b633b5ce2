/// Reconciled transcript for one recording session.
///
/// `committed` is append-only: once a span of text is accepted it is never
/// edited or removed. Only the interim preview is mutable.
#[derive(Debug, Clone, Default)]
pub struct TranscriptState {
    committed: String,
    interim: String,
}

impl TranscriptState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn committed(&self) -> &str {
        &self.committed
    }

    pub fn interim(&self) -> &str {
        &self.interim
    }

    /// Replace the in-flight preview with the latest partial result.
    pub fn set_interim(&mut self, text: &str) {
        self.interim.clear();
        self.interim.push_str(text.trim());
    }

    pub fn clear_interim(&mut self) {
        self.interim.clear();
    }

    /// Take the outstanding preview, leaving it empty.
    pub fn take_interim(&mut self) -> Option<String> {
        if self.interim.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.interim))
    }

    /// Append a finalized span, separated by a single space.
    pub fn commit(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.committed.is_empty() {
            self.committed.push(' ');
        }
        self.committed.push_str(text);
    }

    /// What an observer sees: the committed text plus the current preview.
    pub fn displayed(&self) -> String {
        if self.interim.is_empty() {
            self.committed.clone()
        } else if self.committed.is_empty() {
            self.interim.clone()
        } else {
            format!("{} {}", self.committed, self.interim)
        }
    }
}
