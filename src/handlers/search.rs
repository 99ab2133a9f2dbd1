//! Search and Knowledge-Base Handlers
//!
//! Similarity queries are best-effort: a degraded search returns an empty
//! result list rather than an error. Knowledge ingestion is a write path and
//! does propagate failures.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::state::AppState;
use crate::constants::DEFAULT_SEARCH_LIMIT;
use crate::errors::{AppError, ValidationErrorExt};
use crate::search::{IngestOutcome, ReferenceType, SearchHit};
use crate::validation;

// =============================================================================
// REQUEST/RESPONSE TYPES
// =============================================================================

fn default_reference_type() -> ReferenceType {
    ReferenceType::KnowledgeBase
}

/// Similarity search request
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub shop_id: String,
    pub query: String,
    #[serde(default = "default_reference_type")]
    pub reference_type: ReferenceType,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Similarity search response
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub count: usize,
}

/// Knowledge-base ingestion request
#[derive(Debug, Deserialize)]
pub struct IngestChunkRequest {
    pub shop_id: String,
    /// Re-using an id replaces the chunk and its vector
    #[serde(default)]
    pub chunk_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Summary of a stored knowledge chunk
#[derive(Debug, Serialize)]
pub struct ChunkSummary {
    pub chunk_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub preview: String,
}

/// Knowledge listing response
#[derive(Debug, Serialize)]
pub struct ListChunksResponse {
    pub namespace: String,
    pub chunks: Vec<ChunkSummary>,
    pub count: usize,
}

// =============================================================================
// HANDLERS
// =============================================================================

/// POST /api/search - similarity search scoped to one shop
pub async fn similarity_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    validation::validate_shop_id(&req.shop_id).map_validation_err("shop_id")?;
    if req.query.trim().is_empty() {
        return Err(AppError::InvalidInput {
            field: "query".to_string(),
            reason: "query cannot be empty".to_string(),
        });
    }
    let limit = req.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    validation::validate_search_limit(limit).map_validation_err("limit")?;

    let results = state
        .search
        .search(&req.shop_id, &req.query, req.reference_type, Some(limit))
        .await;

    let count = results.len();
    Ok(Json(SearchResponse { results, count }))
}

/// POST /api/knowledge - ingest (or replace) a knowledge-base chunk
pub async fn ingest_chunk(
    State(state): State<AppState>,
    Json(req): Json<IngestChunkRequest>,
) -> Result<Json<IngestOutcome>, AppError> {
    validation::validate_shop_id(&req.shop_id).map_validation_err("shop_id")?;
    validation::validate_chunk_content(&req.content).map_validation_err("content")?;

    let chunk_id = req
        .chunk_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let outcome = state
        .search
        .ingest_chunk(&req.shop_id, &chunk_id, &req.content, req.metadata)
        .await?;

    Ok(Json(outcome))
}

/// GET /api/knowledge/{shop_id} - list a shop's knowledge chunks
pub async fn list_chunks(
    State(state): State<AppState>,
    Path(shop_id): Path<String>,
) -> Result<Json<ListChunksResponse>, AppError> {
    validation::validate_shop_id(&shop_id).map_validation_err("shop_id")?;

    let chunks = state.search.list_chunks(&shop_id).await?;
    let summaries: Vec<ChunkSummary> = chunks
        .into_iter()
        .map(|c| ChunkSummary {
            chunk_id: c.chunk_id,
            created_at: c.created_at,
            preview: c.content.chars().take(120).collect(),
        })
        .collect();

    let count = summaries.len();
    Ok(Json(ListChunksResponse {
        namespace: crate::search::SimilarityEngine::kb_namespace(&shop_id),
        chunks: summaries,
        count,
    }))
}
