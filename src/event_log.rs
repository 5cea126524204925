// src/event_log.rs
//
// Append-only HTTP event store adapter. The scoring loop hands records to a
// bounded queue and never waits on the network; the worker retries with
// backoff and drops the record if the store stays unreachable. Losing an
// event is acceptable, stalling or crashing the pipeline is not.

use crate::types::{EventConfig, LogEvent};
use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

pub struct EventLogger {
    url: String,
    http_client: reqwest::Client,
}

impl EventLogger {
    pub fn new(url: &str) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            url: url.to_string(),
            http_client,
        }
    }

    async fn append_once(&self, event: &LogEvent) -> Result<()> {
        let resp = self.http_client.post(&self.url).json(event).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Event store returned {}: {}", status, body));
        }

        debug!(
            "🌐 Event stored: {} ({})",
            event.risk_score, event.risk_level
        );
        Ok(())
    }

    /// Append with bounded retries and exponential backoff.
    pub async fn append(&self, event: &LogEvent) -> Result<()> {
        let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MS);

        for attempt in 1..=MAX_ATTEMPTS {
            match self.append_once(event).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!(
                        "Event append failed (attempt {}/{}): {}",
                        attempt, MAX_ATTEMPTS, e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }

        unreachable!("retry loop always returns")
    }
}

/// Spawn the sink worker. Producers use `try_send` on the returned sender, so
/// a full queue drops the event instead of applying backpressure upstream.
pub fn spawn_sink_worker(cfg: &EventConfig) -> (mpsc::Sender<LogEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<LogEvent>(cfg.queue_capacity.max(1));
    let logger = EventLogger::new(&cfg.url);

    let handle = tokio::spawn(async move {
        let mut stored = 0u64;
        let mut dropped = 0u64;

        while let Some(event) = rx.recv().await {
            match logger.append(&event).await {
                Ok(()) => stored += 1,
                Err(e) => {
                    dropped += 1;
                    error!("Dropping event after {} attempts: {}", MAX_ATTEMPTS, e);
                }
            }
        }

        info!("Event sink drained: {} stored, {} dropped", stored, dropped);
    });

    (tx, handle)
}
