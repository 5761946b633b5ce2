//! Prompt builders for live and final meeting analysis.
//!
//! Transcripts are often mixed-language; both prompts instruct the model to
//! analyze whatever languages are present and answer in one configured reply
//! language.

/// Compact JSON prompt used on the live insight tick.
pub fn live_insight_prompt(reply_language: &str, transcript_tail: &str) -> String {
    format!(
        r#"Meeting analysis (JSON only, respond in {lang}):
{{
  "topic": "main topic (3 words in {lang})",
  "points": ["key1", "key2"],
  "actions": ["action1", "action2"],
  "mood": "positive/neutral/negative",
  "keywords": ["keyword1", "keyword2", "keyword3"]
}}

Note: Text may contain multiple languages. Analyze and respond in {lang}.

Text: {text}"#,
        lang = reply_language,
        text = transcript_tail
    )
}

/// Comprehensive prompt used once over the full transcript when a session
/// ends.
pub fn final_analysis_prompt(reply_language: &str, transcript: &str) -> String {
    format!(
        r#"Analyze this meeting/conversation and provide structured insights in JSON format.

IMPORTANT: The transcript may contain multiple languages.
- Analyze the content in whatever languages are present
- Provide ALL responses in {lang}
- Translate any non-{lang} content to {lang} in your analysis
- Preserve the original meaning and context when translating

{{
  "summary": "1-2 paragraph comprehensive summary of the main discussion (in {lang})",
  "action_items": [
    {{
      "task": "Specific action to take (in {lang})",
      "assignee": "Person responsible (if mentioned)",
      "deadline": "Timeframe (if mentioned)",
      "priority": "high/medium/low",
      "specific": "Is it specific? true/false",
      "measurable": "Is it measurable? true/false",
      "achievable": "Is it achievable? true/false",
      "relevant": "Is it relevant? true/false",
      "timebound": "Is it time-bound? true/false"
    }}
  ],
  "key_insights": [
    "Important insight or observation from the conversation (in {lang})"
  ],
  "topics_discussed": ["topic1", "topic2", "topic3"],
  "decisions_made": ["decision1", "decision2"],
  "questions_raised": ["question1", "question2"],
  "sentiment": "overall mood: positive/neutral/negative/mixed",
  "keywords": ["keyword1", "keyword2", "keyword3", "keyword4", "keyword5"],
  "languages_detected": ["list of languages spoken in the meeting"],
  "company_mentioned": "Company name if mentioned, otherwise null",
  "meeting_type": "Type of meeting: standup/planning/review/sales/support/interview/other"
}}

Transcript (may contain multiple languages):
{text}"#,
        lang = reply_language,
        text = transcript
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_prompt_embeds_language_and_text() {
        let prompt = live_insight_prompt("Russian", "we talked about the roadmap");
        assert!(prompt.contains("respond in Russian"));
        assert!(prompt.contains("we talked about the roadmap"));
    }

    #[test]
    fn final_prompt_embeds_the_full_transcript() {
        let prompt = final_analysis_prompt("English", "full transcript here");
        assert!(prompt.contains("full transcript here"));
        assert!(prompt.contains("action_items"));
    }
}
