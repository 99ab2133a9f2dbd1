//! Remote embedding client over an OpenAI-compatible `/v1/embeddings` API
//!
//! The whole batch fails if the response is short, long, mis-dimensioned, or
//! contains non-finite values; there are no partial embedding arrays.
//! Latency is tracked the same way as the vision client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::constants::{
    EMBEDDING_DIMENSION, LATENCY_ALERT_MS, RETRY_BASE_DELAY_MS, UPSTREAM_MAX_ATTEMPTS,
};
use crate::embeddings::Embedder;
use crate::metrics;
use crate::monitor::AlertDispatcher;

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// Embedder backed by a remote OpenAI-compatible endpoint
pub struct RemoteEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    monitor: Arc<AlertDispatcher>,
    max_attempts: u32,
}

impl RemoteEmbedder {
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: Option<String>,
        monitor: Arc<AlertDispatcher>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            monitor,
            max_attempts: UPSTREAM_MAX_ATTEMPTS,
        }
    }

    async fn call_once(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };

        let url = format!("{}/v1/embeddings", self.endpoint);
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("embedding request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "embedding API returned status: {}",
                response.status()
            ));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("failed to parse embedding response: {e}"))?;

        decode_embeddings(parsed, texts.len(), EMBEDDING_DIMENSION)
    }

    fn record_latency(&self, elapsed_ms: u128) {
        let tags = HashMap::from([("elapsed_ms".to_string(), elapsed_ms.to_string())]);
        self.monitor.record("embedding.latency", &tags);
        if elapsed_ms > LATENCY_ALERT_MS {
            self.monitor.raise_latency_alert("embedding batch", elapsed_ms);
        }
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let delay = RETRY_BASE_DELAY_MS * (1u64 << (attempt - 2).min(4));
                tracing::debug!(attempt, delay_ms = delay, "retrying embedding batch");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let start = Instant::now();
            let outcome = self.call_once(texts).await;
            let elapsed = start.elapsed();

            metrics::EMBEDDING_BATCH_DURATION.observe(elapsed.as_secs_f64());
            self.record_latency(elapsed.as_millis());

            match outcome {
                Ok(vectors) => {
                    metrics::EMBEDDING_BATCHES_TOTAL
                        .with_label_values(&["success"])
                        .inc();
                    self.monitor
                        .record_outcome("embedding.batch_complete", "success");
                    return Ok(vectors);
                }
                Err(e) => {
                    metrics::EMBEDDING_BATCHES_TOTAL
                        .with_label_values(&["failure"])
                        .inc();
                    last_error = e.to_string();
                    tracing::warn!("embedding batch attempt failed: {last_error}");
                    self.monitor
                        .record_outcome("embedding.batch_failure", "failure");
                }
            }
        }

        Err(anyhow::anyhow!(
            "embedding batch failed after {} attempts: {last_error}",
            self.max_attempts
        ))
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }
}

/// Validate and order a decoded embedding response
///
/// Returns vectors ordered by the response's index field so output[i]
/// corresponds to input[i] regardless of response ordering.
fn decode_embeddings(
    response: EmbeddingResponse,
    expected_len: usize,
    dimension: usize,
) -> anyhow::Result<Vec<Vec<f32>>> {
    if response.data.len() != expected_len {
        return Err(anyhow::anyhow!(
            "embedding batch size mismatch: sent {expected_len}, received {}",
            response.data.len()
        ));
    }

    let mut ordered: Vec<Option<Vec<f32>>> = vec![None; expected_len];
    for datum in response.data {
        if datum.index >= expected_len {
            return Err(anyhow::anyhow!(
                "embedding index {} out of range for batch of {expected_len}",
                datum.index
            ));
        }
        if datum.embedding.len() != dimension {
            return Err(anyhow::anyhow!(
                "embedding dimension mismatch: expected {dimension}, got {}",
                datum.embedding.len()
            ));
        }
        if datum.embedding.iter().any(|v| !v.is_finite()) {
            return Err(anyhow::anyhow!("embedding contains non-finite values"));
        }
        if ordered[datum.index].replace(datum.embedding).is_some() {
            return Err(anyhow::anyhow!("duplicate embedding index {}", datum.index));
        }
    }

    ordered
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| anyhow::anyhow!("embedding response is missing batch indices"))
}
