//! Inspection processing pipeline
//!
//! Owns the lifecycle state machine. Within one inspection the steps run
//! strictly in order: validate → assess → normalize → embed → finalize.
//! Across inspections there is no ordering guarantee and none is needed.
//!
//! Two operating modes:
//! - synchronous: the caller blocks on the background task up to a hard
//!   timeout; the timeout cancels only the wait, the task keeps running and
//!   writes its terminal status
//! - asynchronous/streaming: the caller gets an immediate acknowledgment plus
//!   an SSE stream url and a heuristic completion estimate; completion is
//!   delivered over the stream and an optional webhook

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::assessment::AssessmentClient;
use crate::constants::{
    ESTIMATED_COMPLETION_SECS, SYNC_PROCESSING_TIMEOUT_SECS,
};
use crate::embeddings::Embedder;
use crate::errors::AppError;
use crate::inspection::{
    round_cents, AssessmentOutcome, Damage, EstimateItem, FailureInfo, Inspection,
    InspectionMetadata, InspectionStatus, InspectionStore, MediaItem, ProcessingOptions,
};
use crate::metrics;
use crate::monitor::AlertDispatcher;
use crate::search::{EmbeddingVector, ReferenceType, VectorStore};
use crate::validation;

/// Lifecycle event broadcast to SSE subscribers
#[derive(Debug, Clone, Serialize)]
pub struct InspectionEvent {
    pub inspection_id: Uuid,
    pub event_type: String, // ACCEPTED, PROCESSING, COMPLETE, FAILED
    pub status: InspectionStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl InspectionEvent {
    fn new(inspection_id: Uuid, event_type: &str, status: InspectionStatus) -> Self {
        Self {
            inspection_id,
            event_type: event_type.to_string(),
            status,
            timestamp: Utc::now(),
            detail: None,
        }
    }
}

/// Acknowledgment returned by the asynchronous mode
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncAck {
    pub inspection_id: Uuid,
    pub status: InspectionStatus,
    pub stream_url: String,
    pub estimated_completion: DateTime<Utc>,
}

/// Pipeline tunables, sourced from server config
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub labor_rate: f64,
    pub sync_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            labor_rate: crate::constants::DEFAULT_LABOR_RATE,
            sync_timeout: Duration::from_secs(SYNC_PROCESSING_TIMEOUT_SECS),
        }
    }
}

/// Payload POSTed to the inspection's webhook on completion
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    inspection_id: Uuid,
    status: InspectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a AssessmentOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a FailureInfo>,
}

/// The inspection state machine
pub struct InspectionPipeline {
    store: Arc<dyn InspectionStore>,
    assessor: Arc<AssessmentClient>,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    monitor: Arc<AlertDispatcher>,
    events: broadcast::Sender<InspectionEvent>,
    webhook_client: reqwest::Client,
    config: PipelineConfig,
}

impl InspectionPipeline {
    pub fn new(
        store: Arc<dyn InspectionStore>,
        assessor: Arc<AssessmentClient>,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        monitor: Arc<AlertDispatcher>,
        config: PipelineConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            store,
            assessor,
            embedder,
            vectors,
            monitor,
            events,
            webhook_client: reqwest::Client::new(),
            config,
        }
    }

    /// Subscribe to lifecycle events (SSE fan-out)
    pub fn subscribe(&self) -> broadcast::Receiver<InspectionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: InspectionEvent) {
        // No subscribers is fine; events are advisory
        let _ = self.events.send(event);
    }

    /// Validate and persist a new pending inspection
    ///
    /// Validation here covers only count and format; everything heavier
    /// happens inside the processing run.
    pub async fn submit(
        &self,
        vin: String,
        media: Vec<MediaItem>,
        options: ProcessingOptions,
        metadata: InspectionMetadata,
    ) -> Result<Inspection, AppError> {
        validation::validate_vin(&vin).map_err(|e| AppError::InvalidVin(e.to_string()))?;
        validation::validate_media(&media).map_err(|e| AppError::InvalidInput {
            field: "media".to_string(),
            reason: e.to_string(),
        })?;
        validation::validate_confidence_threshold(options.confidence_threshold).map_err(|e| {
            AppError::InvalidInput {
                field: "options.confidenceThreshold".to_string(),
                reason: e.to_string(),
            }
        })?;

        let inspection = Inspection::new(vin, media, options, metadata);
        self.store
            .create(inspection.clone())
            .await
            .map_err(|e| AppError::StorageError(e.to_string()))?;

        tracing::info!(
            inspection_id = %inspection.id,
            vin = %inspection.vin,
            media_count = inspection.media.len(),
            "inspection submitted"
        );
        self.emit(InspectionEvent::new(
            inspection.id,
            "ACCEPTED",
            InspectionStatus::Pending,
        ));

        Ok(inspection)
    }

    /// Spawn the background processing task for an inspection
    pub fn spawn_processing(self: Arc<Self>, id: Uuid) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(id).await;
        })
    }

    /// Synchronous mode: block until terminal status or the hard timeout
    ///
    /// On timeout the caller gets a processing-timeout error while the
    /// background task keeps going; the inspection's eventual status is
    /// whatever that task produces (dropping the join handle detaches the
    /// task, it does not cancel it).
    pub async fn process_sync(self: Arc<Self>, id: Uuid) -> Result<Inspection, AppError> {
        let handle = self.clone().spawn_processing(id);

        match tokio::time::timeout(self.config.sync_timeout, handle).await {
            Ok(Ok(())) => self
                .store
                .get(id)
                .await
                .map_err(|e| AppError::StorageError(e.to_string()))?
                .ok_or_else(|| AppError::InspectionNotFound(id.to_string())),
            Ok(Err(join_err)) => Err(AppError::Internal(anyhow::anyhow!(
                "processing task panicked: {join_err}"
            ))),
            Err(_) => {
                tracing::warn!(inspection_id = %id, "synchronous wait timed out; processing continues");
                Err(AppError::ProcessingTimeout)
            }
        }
    }

    /// Asynchronous-mode acknowledgment for a submitted inspection
    pub fn async_ack(&self, inspection: &Inspection) -> AsyncAck {
        AsyncAck {
            inspection_id: inspection.id,
            status: InspectionStatus::Processing,
            stream_url: format!("/api/inspections/{}/events", inspection.id),
            estimated_completion: inspection.created_at
                + ChronoDuration::seconds(ESTIMATED_COMPLETION_SECS),
        }
    }

    /// Reset a failed inspection to pending and report the refreshed record
    ///
    /// Retry is an explicit external operation, never automatic.
    pub async fn retry(&self, id: Uuid) -> Result<Inspection, AppError> {
        let current = self
            .store
            .get(id)
            .await
            .map_err(|e| AppError::StorageError(e.to_string()))?
            .ok_or_else(|| AppError::InspectionNotFound(id.to_string()))?;

        let reset = self
            .store
            .reset_for_retry(id)
            .await
            .map_err(|e| AppError::StorageError(e.to_string()))?;
        if !reset {
            return Err(AppError::InvalidTransition {
                from: current.status.as_str().to_string(),
                reason: "retry requires a failed inspection".to_string(),
            });
        }

        tracing::info!(inspection_id = %id, "inspection reset for retry");
        self.emit(InspectionEvent::new(id, "ACCEPTED", InspectionStatus::Pending));

        self.store
            .get(id)
            .await
            .map_err(|e| AppError::StorageError(e.to_string()))?
            .ok_or_else(|| AppError::InspectionNotFound(id.to_string()))
    }

    /// One full processing run
    ///
    /// Exactly one concurrent run per inspection id wins the pending →
    /// processing CAS; losers return without side effects.
    async fn run(&self, id: Uuid) {
        let won = match self
            .store
            .transition(id, InspectionStatus::Pending, InspectionStatus::Processing)
            .await
        {
            Ok(won) => won,
            Err(e) => {
                tracing::error!(inspection_id = %id, "status transition failed: {e}");
                return;
            }
        };

        if !won {
            tracing::info!(
                inspection_id = %id,
                "skipping processing: another run already owns this inspection"
            );
            return;
        }

        metrics::ACTIVE_INSPECTIONS.inc();
        self.emit(InspectionEvent::new(id, "PROCESSING", InspectionStatus::Processing));

        let inspection = match self.store.get(id).await {
            Ok(Some(inspection)) => inspection,
            Ok(None) => {
                tracing::error!(inspection_id = %id, "inspection vanished after transition");
                metrics::ACTIVE_INSPECTIONS.dec();
                return;
            }
            Err(e) => {
                tracing::error!(inspection_id = %id, "failed to load inspection: {e}");
                metrics::ACTIVE_INSPECTIONS.dec();
                return;
            }
        };

        let started = Instant::now();
        let outcome = self.execute(&inspection).await;
        metrics::INSPECTION_PROCESSING_DURATION.observe(started.elapsed().as_secs_f64());
        metrics::ACTIVE_INSPECTIONS.dec();

        match outcome {
            Ok((result, embedding_id)) => {
                if let Err(e) = self
                    .store
                    .finish_complete(id, result.clone(), embedding_id)
                    .await
                {
                    tracing::error!(inspection_id = %id, "failed to persist completion: {e}");
                    return;
                }

                metrics::INSPECTIONS_TOTAL.with_label_values(&["complete"]).inc();
                self.monitor
                    .record_outcome("workflow.inspection_complete", "success");
                tracing::info!(
                    inspection_id = %id,
                    damages = result.damages.len(),
                    total_cost = result.total_estimated_cost,
                    confidence = result.confidence,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "inspection complete"
                );

                self.emit(InspectionEvent::new(id, "COMPLETE", InspectionStatus::Complete));
                self.notify_webhook(&inspection, InspectionStatus::Complete, Some(&result), None)
                    .await;
            }
            Err(err) => {
                let failure = FailureInfo {
                    category: err.category().to_string(),
                    message: err.message(),
                };
                if let Err(e) = self.store.finish_failed(id, failure.clone()).await {
                    tracing::error!(inspection_id = %id, "failed to persist failure: {e}");
                    return;
                }

                metrics::INSPECTIONS_TOTAL.with_label_values(&["failed"]).inc();
                self.monitor
                    .record_outcome("workflow.inspection_failure", "failure");
                tracing::warn!(
                    inspection_id = %id,
                    category = failure.category,
                    "inspection failed: {}",
                    failure.message
                );

                self.emit(InspectionEvent::new(id, "FAILED", InspectionStatus::Failed));
                self.notify_webhook(&inspection, InspectionStatus::Failed, None, Some(&failure))
                    .await;
            }
        }
    }

    /// Steps 1-4: validate, assess, normalize, embed
    async fn execute(
        &self,
        inspection: &Inspection,
    ) -> Result<(AssessmentOutcome, Option<Uuid>), AppError> {
        // Step 1: re-validate; records can predate rule changes
        validation::validate_vin(&inspection.vin)
            .map_err(|e| AppError::InvalidVin(e.to_string()))?;
        validation::validate_media(&inspection.media).map_err(|e| AppError::InvalidInput {
            field: "media".to_string(),
            reason: e.to_string(),
        })?;

        // Step 2: vision assessment (retries live inside the client)
        let assessment = self
            .assessor
            .assess(&inspection.vin, &inspection.media)
            .await?;

        // Step 3: normalize into damage + estimate records
        let confidence = assessment.effective_confidence();
        let damages: Vec<Damage> = assessment
            .damages
            .iter()
            .map(|d| Damage {
                id: Uuid::new_v4(),
                inspection_id: inspection.id,
                damage_type: d.damage_type.clone(),
                location: d.location.clone(),
                severity: d.severity.into(),
                description: d.description.clone(),
                confidence: d.confidence.unwrap_or(confidence).clamp(0.0, 1.0),
                estimated_cost: d.estimated_cost,
                source_image: d.source_image.clone(),
                bounding_box: d.bounding_box,
            })
            .collect();

        let estimate_items: Vec<EstimateItem> = damages
            .iter()
            .map(|d| EstimateItem::from_damage(d, self.config.labor_rate))
            .collect();

        if confidence < inspection.options.confidence_threshold {
            tracing::warn!(
                inspection_id = %inspection.id,
                confidence,
                threshold = inspection.options.confidence_threshold,
                "assessment confidence below the requested threshold"
            );
        }

        if inspection.options.enable_partial_results {
            let mut partial =
                InspectionEvent::new(inspection.id, "PARTIAL", InspectionStatus::Processing);
            partial.detail = Some(format!(
                "{} damages normalized, embedding pending",
                damages.len()
            ));
            self.emit(partial);
        }

        let total_estimated_cost = if damages.is_empty() {
            round_cents(assessment.total_estimated_cost)
        } else {
            round_cents(damages.iter().map(|d| d.estimated_cost).sum())
        };

        // Step 4: embed the concatenated damage descriptions
        let summary = summarize_for_embedding(&inspection.vin, &damages, &assessment.recommendations);
        let values = self
            .embedder
            .embed(&summary)
            .await
            .map_err(|e| AppError::UpstreamAi(format!("inspection embedding failed: {e}")))?;

        let vector = EmbeddingVector {
            id: Uuid::new_v4(),
            shop_id: inspection.shop_id().to_string(),
            reference_type: ReferenceType::Inspection,
            reference_id: inspection.id.to_string(),
            values,
            metadata: std::collections::HashMap::from([(
                "vin".to_string(),
                inspection.vin.clone(),
            )]),
            created_at: Utc::now(),
        };
        let vector_id = vector.id;
        self.vectors
            .insert(vector)
            .await
            .map_err(|e| AppError::StorageError(format!("vector insert failed: {e}")))?;

        Ok((
            AssessmentOutcome {
                damages,
                estimate_items,
                overall_condition: assessment.overall_condition,
                recommendations: assessment.recommendations,
                total_estimated_cost,
                confidence,
            },
            Some(vector_id),
        ))
    }

    /// Best-effort completion callback: one attempt plus one retry, failures
    /// logged and dropped
    async fn notify_webhook(
        &self,
        inspection: &Inspection,
        status: InspectionStatus,
        result: Option<&AssessmentOutcome>,
        error: Option<&FailureInfo>,
    ) {
        let Some(url) = inspection.options.webhook_url.as_deref() else {
            return;
        };

        let payload = WebhookPayload {
            inspection_id: inspection.id,
            status,
            result,
            error,
        };

        for attempt in 1..=2u32 {
            match self.webhook_client.post(url).json(&payload).send().await {
                Ok(resp) if resp.status().is_success() => return,
                Ok(resp) => {
                    tracing::debug!(
                        inspection_id = %inspection.id,
                        attempt,
                        status = %resp.status(),
                        "completion webhook rejected"
                    );
                }
                Err(e) => {
                    tracing::debug!(
                        inspection_id = %inspection.id,
                        attempt,
                        "completion webhook failed: {e}"
                    );
                }
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}

/// Text embedded for an inspection: its damage descriptions in order
fn summarize_for_embedding(vin: &str, damages: &[Damage], recommendations: &[String]) -> String {
    if damages.is_empty() {
        return format!("Vehicle {vin}: no damage detected. {}", recommendations.join(" "));
    }

    let descriptions: Vec<String> = damages
        .iter()
        .map(|d| {
            format!(
                "{} on {}: {}",
                d.damage_type, d.location, d.description
            )
        })
        .collect();
    format!("Vehicle {vin}: {}", descriptions.join(". "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspection::DamageSeverity;

    fn damage(damage_type: &str, location: &str, description: &str) -> Damage {
        Damage {
            id: Uuid::new_v4(),
            inspection_id: Uuid::new_v4(),
            damage_type: damage_type.into(),
            location: location.into(),
            severity: DamageSeverity::Minor,
            description: description.into(),
            confidence: 0.9,
            estimated_cost: 100.0,
            source_image: None,
            bounding_box: None,
        }
    }

    #[test]
    fn test_summary_concatenates_descriptions_in_order() {
        let damages = vec![
            damage("dent", "front bumper", "shallow dent"),
            damage("scratch", "driver door", "deep scratch"),
        ];
        let summary = summarize_for_embedding("1HGBH41JXMN109186", &damages, &[]);
        let dent_pos = summary.find("shallow dent").unwrap();
        let scratch_pos = summary.find("deep scratch").unwrap();
        assert!(dent_pos < scratch_pos);
    }

    #[test]
    fn test_summary_without_damages_mentions_clean_state() {
        let summary = summarize_for_embedding("1HGBH41JXMN109186", &[], &["wax it".into()]);
        assert!(summary.contains("no damage detected"));
    }
}
