//! Transcript reconciliation
//!
//! All three providers, whatever their wire protocol, reduce to the same two
//! buffers: a committed transcript that only ever grows, and an interim
//! preview that is replaced on every partial result and folded in (or
//! discarded) when a turn finalizes.

mod filter;
mod state;

pub use filter::is_phantom_text;
pub use state::TranscriptState;
