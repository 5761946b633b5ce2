//! Summarization cadence
//!
//! Two independent ticks run while a recording is active: a transcript tick
//! that republishes the reconciled text when it changed, and an insight tick
//! that decides whether enough new material justifies another analysis call.
//! Both are best-effort; neither may interrupt recording.

use std::time::Duration;

/// Tick periods and gating thresholds for live publishing and insight
/// generation.
#[derive(Debug, Clone)]
pub struct SummarySchedule {
    /// How often the reconciled transcript is republished to observers
    pub transcript_interval: Duration,
    /// How often insight generation is considered
    pub insight_interval: Duration,
    /// Committed length below which insight generation is skipped
    pub min_transcript_chars: usize,
    /// Minimum committed growth since the last successful generation
    pub min_new_chars: usize,
    /// Tail window of committed text sent with each insight request
    pub insight_tail_chars: usize,
    /// Token budget for live insight requests
    pub insight_max_tokens: u32,
}

impl Default for SummarySchedule {
    fn default() -> Self {
        Self {
            transcript_interval: Duration::from_secs(6),
            insight_interval: Duration::from_secs(45),
            min_transcript_chars: 120,
            min_new_chars: 50,
            insight_tail_chars: 1600,
            insight_max_tokens: 150,
        }
    }
}

impl SummarySchedule {
    /// Whether the insight tick should fire, given the committed text and the
    /// length at the last successful generation. A skipped tick is not
    /// retried early.
    pub fn should_generate_insights(&self, committed: &str, last_generated_len: usize) -> bool {
        let len = committed.trim().chars().count();
        if len < self.min_transcript_chars {
            return false;
        }
        len.saturating_sub(last_generated_len) >= self.min_new_chars
    }

    /// Bounded tail of the committed text used as insight context.
    pub fn insight_tail<'a>(&self, committed: &'a str) -> &'a str {
        tail_chars(committed, self.insight_tail_chars)
    }

    /// Token ceiling for the final analysis, scaled to transcript size.
    pub fn final_max_tokens(&self, transcript: &str) -> u32 {
        if transcript.chars().count() < 1000 {
            300
        } else {
            500
        }
    }
}

fn tail_chars(text: &str, count: usize) -> &str {
    if count == 0 {
        return "";
    }
    match text.char_indices().rev().nth(count - 1) {
        Some((index, _)) => &text[index..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_transcripts_skip_insights() {
        let schedule = SummarySchedule::default();
        assert!(!schedule.should_generate_insights("too short", 0));
    }

    #[test]
    fn insights_need_enough_growth() {
        let schedule = SummarySchedule::default();
        let committed = "x".repeat(200);
        assert!(schedule.should_generate_insights(&committed, 0));
        // Only 20 new chars since the last run.
        assert!(!schedule.should_generate_insights(&committed, 180));
        assert!(schedule.should_generate_insights(&committed, 150));
    }

    #[test]
    fn insight_tail_is_bounded() {
        let schedule = SummarySchedule::default();
        let committed = "y".repeat(5000);
        assert_eq!(schedule.insight_tail(&committed).chars().count(), 1600);

        let short = "a short transcript";
        assert_eq!(schedule.insight_tail(short), short);
    }

    #[test]
    fn final_budget_scales_with_length() {
        let schedule = SummarySchedule::default();
        assert_eq!(schedule.final_max_tokens("short"), 300);
        assert_eq!(schedule.final_max_tokens(&"z".repeat(2000)), 500);
    }
}
