use std::collections::HashSet;

/// Phrases speech recognizers hallucinate during silence, usually learned
/// from video captions. Checked as substrings of the lowercased text.
const PHANTOM_PHRASES: &[&str] = &[
    "thank you",
    "thanks for watching",
    "subscribe",
    "subtitles",
    "спасибо за просмотр",
    "подписывайтесь",
    "субтитры",
];

/// Word-repetition ratio (total words / distinct words) above which text is
/// considered a recognizer loop.
const MAX_REPETITION_RATIO: f64 = 3.0;

/// Returns true when `text` must not be committed to the transcript.
///
/// Drops empty/very short fragments, known caption-style phantom phrases,
/// runs of one repeated word, and text dominated by a looping clause.
pub fn is_phantom_text(text: &str) -> bool {
    let trimmed = text.trim().to_lowercase();

    if trimmed.chars().count() < 3 {
        return true;
    }

    if PHANTOM_PHRASES.iter().any(|p| trimmed.contains(p)) {
        return true;
    }

    let words: Vec<&str> = trimmed.split_whitespace().collect();

    // Repetitive single words ("go go go")
    if words.len() >= 3 && words.iter().collect::<HashSet<_>>().len() == 1 {
        return true;
    }

    // Very repetitive content overall
    if words.len() > 1 {
        let unique = words.iter().collect::<HashSet<_>>().len();
        if words.len() as f64 / unique as f64 > MAX_REPETITION_RATIO {
            return true;
        }
    }

    // Looping clause: the same three-word sequence showing up again is a
    // recognizer stutter, not speech.
    if words.len() >= 6 {
        let mut seen = HashSet::new();
        for window in words.windows(3) {
            if !seen.insert(window) {
                return true;
            }
        }
    }

    false
}
