//! Inspection Handlers - submission, projection, retry
//!
//! `POST /api/inspect` is the v1 form-upload surface (≥3 images, stored to
//! external file storage, processed in the background). `POST /api/v2/inspect`
//! takes a JSON body and chooses between the streaming acknowledgment and the
//! bounded synchronous wait.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

use super::state::AppState;
use crate::constants::MIN_V1_IMAGES;
use crate::errors::AppError;
use crate::inspection::{
    AssessmentOutcome, AsyncAck, FailureInfo, Inspection, InspectionMetadata, InspectionStatus,
    MediaItem, ProcessingOptions,
};

// =============================================================================
// REQUEST/RESPONSE TYPES
// =============================================================================

/// v1 submission response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct V1InspectResponse {
    pub inspection_id: Uuid,
    pub status: InspectionStatus,
}

/// v2 submission request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V2InspectRequest {
    pub vin: String,
    pub media: Vec<MediaItem>,
    #[serde(default)]
    pub options: ProcessingOptions,
    #[serde(default)]
    pub metadata: InspectionMetadata,
}

/// v2 synchronous completion response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct V2InspectResponse {
    pub success: bool,
    pub inspection_id: Uuid,
    pub status: InspectionStatus,
    /// Wall-clock processing time in milliseconds
    pub processing_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AssessmentOutcome>,
}

/// Query parameters for the projection endpoint
#[derive(Debug, Deserialize)]
pub struct InspectionQuery {
    pub id: Uuid,
}

/// Client-facing projection of an inspection record
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionView {
    pub inspection_id: Uuid,
    pub vin: String,
    pub status: InspectionStatus,
    pub media_count: usize,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AssessmentOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_id: Option<Uuid>,
}

impl From<Inspection> for InspectionView {
    fn from(i: Inspection) -> Self {
        Self {
            inspection_id: i.id,
            vin: i.vin,
            status: i.status,
            media_count: i.media.len(),
            created_at: i.created_at,
            completed_at: i.completed_at,
            error: i.error,
            result: i.result,
            embedding_id: i.embedding_id,
        }
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// POST /api/inspect - v1 form upload
///
/// Accepts a multipart form with a `vin` field and at least three `images`
/// parts. Media is written to external file storage before the inspection is
/// created; processing always runs in the background.
pub async fn submit_inspection_v1(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<V1InspectResponse>, AppError> {
    let mut vin: Option<String> = None;
    let mut uploads: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::InvalidInput {
            field: "multipart".to_string(),
            reason: e.to_string(),
        }
    })? {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("vin") => {
                let text = field.text().await.map_err(|e| AppError::InvalidInput {
                    field: "vin".to_string(),
                    reason: e.to_string(),
                })?;
                vin = Some(text.trim().to_string());
            }
            Some("images") | Some("media") => {
                let file_name = field
                    .file_name()
                    .map(sanitize_file_name)
                    .unwrap_or_else(|| format!("upload-{}.jpg", uploads.len()));
                let bytes = field.bytes().await.map_err(|e| AppError::InvalidInput {
                    field: "images".to_string(),
                    reason: e.to_string(),
                })?;
                uploads.push((file_name, bytes.to_vec()));
            }
            _ => {} // Unknown parts are ignored
        }
    }

    let vin = vin.ok_or_else(|| AppError::InvalidInput {
        field: "vin".to_string(),
        reason: "missing form field".to_string(),
    })?;

    if uploads.len() < MIN_V1_IMAGES {
        return Err(AppError::InvalidInput {
            field: "images".to_string(),
            reason: format!(
                "at least {MIN_V1_IMAGES} images are required, got {}",
                uploads.len()
            ),
        });
    }

    let upload_batch = Uuid::new_v4();
    let mut media = Vec::with_capacity(uploads.len());
    for (idx, (file_name, bytes)) in uploads.into_iter().enumerate() {
        let stored_name = format!("{upload_batch}-{idx}-{file_name}");
        let url = state
            .media
            .store(&stored_name, bytes)
            .await
            .map_err(|e| AppError::StorageError(format!("media upload failed: {e}")))?;
        media.push(MediaItem::image(url));
    }

    let inspection = state
        .pipeline
        .submit(
            vin,
            media,
            ProcessingOptions::default(),
            InspectionMetadata::default(),
        )
        .await?;

    state.pipeline.clone().spawn_processing(inspection.id);

    Ok(Json(V1InspectResponse {
        inspection_id: inspection.id,
        status: inspection.status,
    }))
}

/// POST /api/v2/inspect - JSON submission
///
/// `options.enableStreaming = true` returns 202 with a stream url and an
/// estimated completion time; otherwise the caller blocks against the
/// synchronous timeout and gets the full result (or a categorized error).
pub async fn submit_inspection_v2(
    State(state): State<AppState>,
    Json(req): Json<V2InspectRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let inspection = state
        .pipeline
        .submit(req.vin, req.media, req.options, req.metadata)
        .await?;

    if inspection.options.enable_streaming {
        let ack: AsyncAck = state.pipeline.async_ack(&inspection);
        state.pipeline.clone().spawn_processing(inspection.id);
        let body = serde_json::to_value(&ack)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("ack serialization failed: {e}")))?;
        return Ok((StatusCode::ACCEPTED, Json(body)));
    }

    let started = Instant::now();
    let finished = state.pipeline.clone().process_sync(inspection.id).await?;
    let processing_time = started.elapsed().as_millis() as u64;

    match finished.status {
        InspectionStatus::Failed => {
            let failure = finished.error.unwrap_or(FailureInfo {
                category: "processing".to_string(),
                message: "inspection failed without an error summary".to_string(),
            });
            Err(AppError::ProcessingFailed {
                category: failure.category,
                message: failure.message,
            })
        }
        status => {
            let response = V2InspectResponse {
                success: status == InspectionStatus::Complete,
                inspection_id: finished.id,
                status,
                processing_time,
                result: finished.result,
            };
            let body = serde_json::to_value(&response).map_err(|e| {
                AppError::Internal(anyhow::anyhow!("response serialization failed: {e}"))
            })?;
            Ok((StatusCode::OK, Json(body)))
        }
    }
}

/// GET /api/inspect?id= - current inspection projection
pub async fn get_inspection(
    State(state): State<AppState>,
    Query(params): Query<InspectionQuery>,
) -> Result<Json<InspectionView>, AppError> {
    load_view(&state, params.id).await.map(Json)
}

/// GET /api/inspections/{id} - path-parameter form of the projection
pub async fn get_inspection_by_path(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InspectionView>, AppError> {
    load_view(&state, id).await.map(Json)
}

/// POST /api/inspections/{id}/retry - reset a failed inspection and re-enqueue
pub async fn retry_inspection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<V1InspectResponse>, AppError> {
    let inspection = state.pipeline.retry(id).await?;
    state.pipeline.clone().spawn_processing(inspection.id);

    Ok(Json(V1InspectResponse {
        inspection_id: inspection.id,
        status: inspection.status,
    }))
}

async fn load_view(state: &AppState, id: Uuid) -> Result<InspectionView, AppError> {
    state
        .inspections
        .get(id)
        .await
        .map_err(|e| AppError::StorageError(e.to_string()))?
        .map(InspectionView::from)
        .ok_or_else(|| AppError::InspectionNotFound(id.to_string()))
}

/// Strip path separators from an uploaded file name
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("front.jpg"), "front.jpg");
        assert_eq!(sanitize_file_name("../etc/passwd"), ".._etc_passwd");
        assert_eq!(sanitize_file_name("a b/c.png"), "a_b_c.png");
    }
}
