//! Watch-history parser
//!
//! Turns a Google Takeout `watch-history.json` export into an ordered list of
//! [`WatchEvent`]s inside a date window. Only a top-level value that is not a
//! list is fatal; individual bad records are counted and dropped.

use crate::error::{CalcError, CalcResult};
use crate::models::{DateWindow, VideoId, WatchEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use url::Url;

/// Per-run counters from the parsing stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySummary {
    /// Top-level entries seen
    pub records: usize,
    /// Dropped: no usable video id or timestamp
    pub malformed: usize,
    /// Valid but outside the date window
    pub out_of_window: usize,
    /// Watch events emitted
    pub events: usize,
}

/// Parser output
#[derive(Debug, Clone, Default)]
pub struct ParsedHistory {
    pub events: Vec<WatchEvent>,
    pub summary: HistorySummary,
}

impl ParsedHistory {
    pub fn video_ids(&self) -> Vec<VideoId> {
        self.events.iter().map(|e| e.video_id.clone()).collect()
    }
}

/// Read and decode a history file
///
/// Undecodable JSON is an input-format error; a missing file is an I/O error.
pub fn load_history_file(path: &Path) -> CalcResult<Value> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        CalcError::InputFormat(format!("{} is not valid JSON: {}", path.display(), e))
    })
}

/// Filter and normalize raw history records
pub fn parse_history(raw: &Value, window: &DateWindow) -> CalcResult<ParsedHistory> {
    let records = raw.as_array().ok_or_else(|| {
        CalcError::InputFormat(format!(
            "expected a list of watch-history records, found {}",
            json_kind(raw)
        ))
    })?;

    let mut parsed = ParsedHistory {
        events: Vec::with_capacity(records.len()),
        summary: HistorySummary {
            records: records.len(),
            ..Default::default()
        },
    };

    for (index, record) in records.iter().enumerate() {
        match parse_record(record) {
            Ok(event) if window.contains(event.watched_at) => parsed.events.push(event),
            Ok(_) => parsed.summary.out_of_window += 1,
            Err(e) => {
                tracing::debug!(index, error = %e, "Dropping history record");
                parsed.summary.malformed += 1;
            }
        }
    }
    parsed.summary.events = parsed.events.len();

    tracing::info!(
        records = parsed.summary.records,
        events = parsed.summary.events,
        malformed = parsed.summary.malformed,
        out_of_window = parsed.summary.out_of_window,
        "Parsed watch history"
    );

    Ok(parsed)
}

fn parse_record(record: &Value) -> CalcResult<WatchEvent> {
    let url = record
        .get("titleUrl")
        .and_then(Value::as_str)
        .ok_or_else(|| CalcError::MalformedRecord("missing titleUrl".to_string()))?;
    let video_id = extract_video_id(url)
        .ok_or_else(|| CalcError::MalformedRecord(format!("no video id in {:?}", url)))?;

    let time = record
        .get("time")
        .and_then(Value::as_str)
        .ok_or_else(|| CalcError::MalformedRecord("missing time".to_string()))?;
    let watched_at = ytwt_common::time::parse_timestamp(time)
        .map_err(|e| CalcError::MalformedRecord(e.to_string()))?;

    Ok(WatchEvent {
        video_id,
        watched_at,
    })
}

/// Pull the video id out of a YouTube URL
///
/// Handles `watch?v=`, `youtu.be/<id>` and `/shorts/`, `/live/`, `/embed/`
/// paths. Returns `None` for anything that does not yield a valid id.
pub fn extract_video_id(raw_url: &str) -> Option<VideoId> {
    let url = Url::parse(raw_url.trim()).ok()?;

    if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
        return VideoId::parse(&v);
    }

    let mut segments = url.path_segments()?;
    let first = segments.next()?;
    if url.host_str() == Some("youtu.be") {
        return VideoId::parse(first);
    }
    match first {
        "shorts" | "live" | "embed" => segments.next().and_then(VideoId::parse),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
