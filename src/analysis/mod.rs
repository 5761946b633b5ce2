//! Meeting-insight generation
//!
//! The recording loop treats analysis as an opaque capability: hand it a
//! prompt and a token budget, get text back or an error. The concrete client
//! talks to an OpenAI-compatible Chat Completions endpoint.

mod client;
mod prompt;

pub use client::{AnalysisClient, OpenAiAnalysis};
pub use prompt::{final_analysis_prompt, live_insight_prompt};
