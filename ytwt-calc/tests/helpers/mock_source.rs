//! In-memory metadata source
//!
//! Serves durations from a fixed catalog and can be scripted to fail.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use ytwt_calc::models::VideoId;
use ytwt_calc::services::{ApiToken, ServiceError, VideoMetadataSource, VideoRecord};

#[derive(Default)]
pub struct MockSource {
    catalog: HashMap<String, VideoRecord>,
    /// Returned by the next calls, in order, before normal behavior
    scripted: Mutex<VecDeque<ServiceError>>,
    always: Option<ServiceError>,
    latency: Duration,
    calls: AtomicU32,
    requests: Mutex<Vec<Vec<String>>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a processed video with an ISO-8601 duration
    pub fn with_video(mut self, id: &str, duration: &str) -> Self {
        self.catalog
            .insert(id.to_string(), VideoRecord::new(id, duration));
        self
    }

    pub fn with_record(mut self, record: VideoRecord) -> Self {
        self.catalog.insert(record.id.clone(), record);
        self
    }

    pub fn failing_always(mut self, error: ServiceError) -> Self {
        self.always = Some(error);
        self
    }

    /// Fail the next `n` calls with `error`
    pub fn failing_first(self, n: usize, error: ServiceError) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .extend(std::iter::repeat(error).take(n));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoMetadataSource for MockSource {
    fn source_name(&self) -> &'static str {
        "mock"
    }

    async fn fetch_videos(
        &self,
        ids: &[VideoId],
        _token: &ApiToken,
    ) -> Result<Vec<VideoRecord>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push(ids.iter().map(|id| id.as_str().to_string()).collect());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(error) = &self.always {
            return Err(error.clone());
        }
        let scripted = self.scripted.lock().unwrap().pop_front();
        if let Some(error) = scripted {
            return Err(error);
        }

        // The real service returns each unique id once
        let mut seen = HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| self.catalog.get(id.as_str()).cloned())
            .collect())
    }
}
