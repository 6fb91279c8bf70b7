use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<Mutex<MetricsInner>>,
}

#[derive(Default)]
struct MetricsInner {
    start_time: Option<Instant>,
    end_time: Option<Instant>,
    records_per_stream: BTreeMap<String, u64>,
    state_messages: u64,
    errors: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start_job(&self) {
        let mut inner = self.inner.lock().await;
        inner.start_time = Some(Instant::now());
        info!("Read started");
    }

    pub async fn end_job(&self) {
        let mut inner = self.inner.lock().await;
        inner.end_time = Some(Instant::now());
        info!("Read finished");
    }

    pub async fn record_stream(&self, stream: &str, records: u64) {
        let mut inner = self.inner.lock().await;
        *inner.records_per_stream.entry(stream.to_string()).or_default() += records;
        info!(stream, records, "Stream read");
    }

    pub async fn record_state(&self) {
        let mut inner = self.inner.lock().await;
        inner.state_messages += 1;
    }

    pub async fn record_error(&self, stream: &str) {
        let mut inner = self.inner.lock().await;
        inner.errors += 1;
        warn!(stream, errors = inner.errors, "Error occurred");
    }

    pub async fn records_read(&self, stream: &str) -> u64 {
        let inner = self.inner.lock().await;
        inner.records_per_stream.get(stream).copied().unwrap_or(0)
    }

    pub async fn total_records(&self) -> u64 {
        let inner = self.inner.lock().await;
        inner.records_per_stream.values().sum()
    }

    pub async fn print_summary(&self) {
        let total = self.total_records().await;
        let inner = self.inner.lock().await;
        let duration = match (inner.start_time, inner.end_time) {
            (Some(start), Some(end)) => end.duration_since(start),
            _ => Duration::ZERO,
        };
        let throughput = if duration.is_zero() {
            0.0
        } else {
            total as f64 / duration.as_secs_f64()
        };

        info!(
            duration = ?duration,
            streams = inner.records_per_stream.len(),
            records = total,
            state_messages = inner.state_messages,
            errors = inner.errors,
            throughput,
            "Read Summary"
        );
    }
}
