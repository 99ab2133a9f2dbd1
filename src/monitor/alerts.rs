//! Threshold alerting with best-effort webhook delivery
//!
//! Alerts are logged through tracing and pushed onto an unbounded channel
//! drained by a background task. A slow or failing alert sink can therefore
//! never add latency or failure to the operation being measured.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::constants::RATE_ALERT_COOLDOWN_SECS;
use crate::metrics;
use crate::monitor::window::{RateSample, WindowStore};

/// Alert severity for the outbound channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// One name/value pair in an alert payload
#[derive(Debug, Clone, Serialize)]
pub struct AlertField {
    pub name: String,
    pub value: String,
}

/// Outbound alert message
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub title: String,
    pub severity: AlertSeverity,
    pub fields: Vec<AlertField>,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(title: impl Into<String>, severity: AlertSeverity) -> Self {
        Self {
            title: title.into(),
            severity,
            fields: Vec::new(),
            raised_at: Utc::now(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push(AlertField {
            name: name.into(),
            value: value.to_string(),
        });
        self
    }
}

/// Evaluates thresholds and emits notifications (log + webhook channel)
///
/// Shared across the vision client, embedding client, search engine, and the
/// pipeline. All methods are non-blocking; webhook delivery happens on a
/// detached task.
pub struct AlertDispatcher {
    windows: Arc<WindowStore>,
    tx: mpsc::UnboundedSender<Alert>,
    rate_threshold: f64,
    /// Last rate-alert time per metric family, to avoid alert storms
    last_rate_alert: DashMap<String, DateTime<Utc>>,
}

impl AlertDispatcher {
    /// Create a dispatcher and spawn its delivery task
    ///
    /// `webhook_url = None` keeps alerts log-only. Must be called from within
    /// a tokio runtime.
    pub fn new(windows: Arc<WindowStore>, webhook_url: Option<String>, rate_threshold: f64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(deliver_loop(rx, webhook_url));

        Self {
            windows,
            tx,
            rate_threshold,
            last_rate_alert: DashMap::new(),
        }
    }

    /// Raise an alert: log it and enqueue it for webhook delivery
    pub fn raise(&self, alert: Alert) {
        metrics::ALERTS_TOTAL
            .with_label_values(&[alert.severity.as_str()])
            .inc();
        tracing::warn!(
            severity = alert.severity.as_str(),
            fields = ?alert.fields,
            "ALERT: {}",
            alert.title
        );
        // Receiver only drops at shutdown; a failed send is not worth surfacing
        let _ = self.tx.send(alert);
    }

    /// Record a classified metric emission and fire a rate alert if the
    /// family's failure rate crossed the threshold
    pub fn record(&self, name: &str, tags: &HashMap<String, String>) {
        if let Some(sample) = self.windows.record(name, tags) {
            if sample.rate >= self.rate_threshold && self.cooldown_elapsed(&sample.family) {
                self.raise_rate_alert(&sample);
            }
        }
    }

    /// Record with only a status tag, the common case
    pub fn record_outcome(&self, name: &str, status: &str) {
        let tags = HashMap::from([("status".to_string(), status.to_string())]);
        self.record(name, &tags);
    }

    fn cooldown_elapsed(&self, family: &str) -> bool {
        let now = Utc::now();
        let mut entry = self
            .last_rate_alert
            .entry(family.to_string())
            .or_insert(DateTime::<Utc>::MIN_UTC);
        if now - *entry >= Duration::seconds(RATE_ALERT_COOLDOWN_SECS) {
            *entry = now;
            true
        } else {
            false
        }
    }

    fn raise_rate_alert(&self, sample: &RateSample) {
        self.raise(
            Alert::new(
                format!("High failure rate for '{}'", sample.family),
                AlertSeverity::Critical,
            )
            .field("family", &sample.family)
            .field("total_events", sample.total)
            .field("failures", sample.failures)
            .field("failure_rate", format!("{:.2}", sample.rate))
            .field("window_secs", sample.window.num_seconds()),
        );
    }

    /// Latency alert for a slow upstream call
    pub fn raise_latency_alert(&self, operation: &str, elapsed_ms: u128) {
        self.raise(
            Alert::new(
                format!("Slow {operation} call"),
                AlertSeverity::Warning,
            )
            .field("operation", operation)
            .field("latency_ms", elapsed_ms),
        );
    }

    /// Low-accuracy alert with damage/image counts for triage
    pub fn raise_low_accuracy_alert(&self, confidence: f32, damage_count: usize, image_count: usize) {
        self.raise(
            Alert::new("Low assessment confidence", AlertSeverity::Warning)
                .field("confidence", format!("{confidence:.2}"))
                .field("damage_count", damage_count)
                .field("image_count", image_count),
        );
    }
}

/// Drain the alert channel, delivering each alert to the webhook if configured
///
/// Delivery failures are logged at debug level and dropped.
async fn deliver_loop(mut rx: mpsc::UnboundedReceiver<Alert>, webhook_url: Option<String>) {
    let client = reqwest::Client::new();

    while let Some(alert) = rx.recv().await {
        let Some(url) = webhook_url.as_deref() else {
            continue;
        };

        match client.post(url).json(&alert).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "alert webhook rejected delivery");
            }
            Err(e) => {
                tracing::debug!("alert webhook delivery failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_alert_requires_floor_and_threshold() {
        let windows = Arc::new(WindowStore::new());
        let dispatcher = AlertDispatcher::new(windows.clone(), None, 0.5);

        // 9 failures are below the 10-event floor: rate exists only after
        // the floor is met, and by then it is 9/10
        for _ in 0..9 {
            dispatcher.record_outcome("workflow.step", "failure");
        }
        assert!(windows.current_rate("workflow").is_none());

        dispatcher.record_outcome("workflow.step", "success");
        let rate = windows.current_rate("workflow").expect("rate after floor");
        assert!((rate - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_record_outcome_neutral_status_ignored() {
        let windows = Arc::new(WindowStore::new());
        let dispatcher = AlertDispatcher::new(windows.clone(), None, 0.5);

        dispatcher.record_outcome("vision.latency", "observed");
        assert_eq!(windows.family_count(), 0);
    }

    #[tokio::test]
    async fn test_raise_does_not_block_without_webhook() {
        let windows = Arc::new(WindowStore::new());
        let dispatcher = AlertDispatcher::new(windows, None, 0.5);

        dispatcher.raise(Alert::new("test alert", AlertSeverity::Info).field("k", "v"));
        // Nothing to assert beyond "returns immediately"; delivery is detached
    }
}
