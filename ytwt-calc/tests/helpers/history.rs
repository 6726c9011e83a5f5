//! Takeout watch-history builders

use serde_json::{json, Value};

/// 11-character video id for index `n`
pub fn vid(n: usize) -> String {
    format!("vid{:08}", n)
}

pub fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

/// One Takeout record
pub fn entry(id: &str, time: &str) -> Value {
    json!({
        "header": "YouTube",
        "title": format!("Watched video {}", id),
        "titleUrl": watch_url(id),
        "time": time,
        "products": ["YouTube"]
    })
}

/// History where every id was watched on 2023-06-01, in order
pub fn history_of<S: AsRef<str>>(ids: &[S]) -> Value {
    Value::Array(
        ids.iter()
            .enumerate()
            .map(|(i, id)| entry(id.as_ref(), &format!("2023-06-01T12:{:02}:00Z", i % 60)))
            .collect(),
    )
}
