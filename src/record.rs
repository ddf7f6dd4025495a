//! Parsing of individual streamed records.
//!
//! Each record is one JSON object; the field of interest is `reply`, an
//! incremental text delta. Anything else the backend includes is business
//! context the pipeline does not interpret. Parsing **never fails the
//! stream**: a malformed record yields `Fragment::Skip` and the loop moves
//! on.

use serde::Deserialize;
use tracing::debug;

/// One streamed record, with any extra fields ignored.
#[derive(Debug, Deserialize)]
struct ReplyRecord {
    reply: String,
}

/// Outcome of parsing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Text to append to the in-progress assistant message.
    Delta(String),
    /// Malformed record; skip and continue.
    Skip,
}

/// Parse one trimmed record. Returns `Skip` for anything that is not a
/// JSON object with a string `reply` field.
pub fn parse_record(record: &str) -> Fragment {
    match serde_json::from_str::<ReplyRecord>(record) {
        Ok(parsed) => Fragment::Delta(parsed.reply),
        Err(e) => {
            debug!("Skipping malformed stream record: {e}");
            Fragment::Skip
        }
    }
}
