//! Publish controller
//!
//! Issues guarded single publishes, timed publish sequences, and a periodic
//! repeating publish driven by a live-editable payload buffer. Manual
//! publishes are recorded into a bounded per-topic history.

pub mod history;

pub use history::PublishHistory;

use crate::session::{Session, SessionError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of a publish sequence. Partial execution after a mid-sequence
/// disconnect is a result, not a failure of the whole operation.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceReport {
    pub attempted: usize,
    pub published: usize,
    pub errors: Vec<String>,
}

struct ContinuousJob {
    topic: String,
    handle: JoinHandle<()>,
}

/// Publish side of the client: single sends, sequences, continuous job
pub struct PublishController {
    session: Arc<dyn Session>,
    history: Mutex<PublishHistory>,
    payload_buffer: Arc<Mutex<String>>,
    job: Mutex<Option<ContinuousJob>>,
    min_interval_ms: u64,
}

impl PublishController {
    pub fn new(session: Arc<dyn Session>, history_limit: usize, min_interval_ms: u64) -> Self {
        Self {
            session,
            history: Mutex::new(PublishHistory::new(history_limit)),
            payload_buffer: Arc::new(Mutex::new(String::new())),
            job: Mutex::new(None),
            min_interval_ms,
        }
    }

    /// Fire-and-forget publish; requires the Connected state. Recorded to
    /// history only on success.
    pub async fn publish(&self, topic: &str, payload: &str) -> Result<(), SessionError> {
        self.session.publish(topic, payload, false).await?;
        self.history.lock().await.record(topic, payload);
        debug!(target: "publish", topic = %topic, "Published message");
        Ok(())
    }

    /// Publish `payloads[i]`, then wait `delays_secs[i]`, for every i. Runs
    /// to completion even when individual steps fail; already-elapsed
    /// delays are never rolled back.
    pub async fn publish_sequence(
        &self,
        topic: &str,
        payloads: &[String],
        delays_secs: &[f64],
    ) -> SequenceReport {
        let mut report = SequenceReport {
            attempted: payloads.len(),
            published: 0,
            errors: Vec::new(),
        };

        for (i, payload) in payloads.iter().enumerate() {
            match self.publish(topic, payload).await {
                Ok(()) => report.published += 1,
                Err(e) => report.errors.push(format!("step {i}: {e}")),
            }

            if let Some(&delay) = delays_secs.get(i) {
                if delay > 0.0 {
                    // Unrepresentable delays are a step error, not a panic
                    match Duration::try_from_secs_f64(delay) {
                        Ok(d) => tokio::time::sleep(d).await,
                        Err(_) => report.errors.push(format!("step {i}: invalid delay {delay}s")),
                    }
                }
            }
        }

        report
    }

    /// Replace the editable payload buffer the continuous job reads each tick
    pub async fn set_payload(&self, payload: String) {
        *self.payload_buffer.lock().await = payload;
    }

    pub async fn payload(&self) -> String {
        self.payload_buffer.lock().await.clone()
    }

    /// Start a periodic publish of the current payload buffer. The interval
    /// is clamped to the configured floor; starting a new job stops any
    /// prior one, so at most one job runs at a time.
    pub async fn start_continuous(
        &self,
        topic: &str,
        frequency_hz: f64,
    ) -> Result<(), SessionError> {
        if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
            return Err(SessionError::PublishFailed(format!(
                "invalid continuous publish frequency: {frequency_hz}"
            )));
        }

        self.stop_continuous().await;

        let interval_ms = ((1000.0 / frequency_hz) as u64).max(self.min_interval_ms);
        let session = self.session.clone();
        let buffer = self.payload_buffer.clone();
        let job_topic = topic.to_string();

        info!(
            "Starting continuous publish on {} every {}ms",
            topic, interval_ms
        );

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                // The buffer is read at the tick, not snapshotted at start
                let payload = buffer.lock().await.clone();
                if let Err(e) = session.publish(&job_topic, &payload, false).await {
                    debug!(target: "publish", "Continuous publish tick failed: {}", e);
                }
            }
        });

        *self.job.lock().await = Some(ContinuousJob {
            topic: topic.to_string(),
            handle,
        });
        Ok(())
    }

    /// Stop the continuous job. Always safe; idempotent.
    pub async fn stop_continuous(&self) {
        if let Some(job) = self.job.lock().await.take() {
            job.handle.abort();
            info!("Stopped continuous publish on {}", job.topic);
        }
    }

    /// Topic of the active continuous job, if any
    pub async fn continuous_topic(&self) -> Option<String> {
        self.job.lock().await.as_ref().map(|j| j.topic.clone())
    }

    pub async fn history_for(&self, topic: &str) -> Vec<String> {
        self.history.lock().await.for_topic(topic)
    }

    pub async fn history_snapshot(&self) -> HashMap<String, Vec<String>> {
        self.history.lock().await.snapshot()
    }

    pub async fn restore_history(&self, snapshot: HashMap<String, Vec<String>>) {
        self.history.lock().await.restore(snapshot);
    }
}

impl Drop for PublishController {
    fn drop(&mut self) {
        if let Ok(mut job) = self.job.try_lock() {
            if let Some(job) = job.take() {
                job.handle.abort();
            }
        } else {
            warn!("Continuous publish job may outlive its controller");
        }
    }
}
