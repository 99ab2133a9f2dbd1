//! Service state - central wiring for the server
//!
//! Builds and owns the pipeline, the similarity engine, the monitor, and the
//! persistence boundaries. Tests construct the same state with injected mock
//! collaborators via `with_components`.

use std::sync::Arc;

use crate::assessment::{AssessmentClient, HttpVisionModel};
use crate::config::ServerConfig;
use crate::embeddings::{Embedder, RemoteEmbedder};
use crate::inspection::{
    InspectionPipeline, InspectionStore, LocalMediaStorage, MediaStorage, MemoryInspectionStore,
    PipelineConfig,
};
use crate::monitor::{AlertDispatcher, WindowStore};
use crate::search::{
    ChunkStore, MemoryChunkStore, MemoryVectorStore, SimilarityEngine, VectorStore,
};

/// Application state type alias
pub type AppState = Arc<ServiceState>;

/// Central state for the server
pub struct ServiceState {
    pub config: ServerConfig,
    pub windows: Arc<WindowStore>,
    pub monitor: Arc<AlertDispatcher>,
    pub pipeline: Arc<InspectionPipeline>,
    pub search: Arc<SimilarityEngine>,
    pub inspections: Arc<dyn InspectionStore>,
    pub media: Arc<dyn MediaStorage>,
}

impl ServiceState {
    /// Build production wiring from configuration
    ///
    /// Vision and embedding clients talk to the configured endpoints; stores
    /// are the in-memory implementations until an external store is plugged
    /// in at the trait boundaries. Must be called from within a tokio
    /// runtime (the alert dispatcher spawns its delivery task).
    pub fn from_config(config: ServerConfig) -> Self {
        let windows = Arc::new(WindowStore::new());
        let monitor = Arc::new(AlertDispatcher::new(
            windows.clone(),
            config.alert_webhook.clone(),
            config.failure_rate_threshold,
        ));

        let vision = Arc::new(HttpVisionModel::new(
            &config.vision_endpoint,
            &config.vision_model,
            config.vision_api_key.clone(),
        ));
        let assessor = Arc::new(AssessmentClient::new(vision, monitor.clone()));

        let embedder: Arc<dyn Embedder> = Arc::new(RemoteEmbedder::new(
            &config.embedding_endpoint,
            &config.embedding_model,
            config.embedding_api_key.clone(),
            monitor.clone(),
        ));

        let inspections: Arc<dyn InspectionStore> = Arc::new(MemoryInspectionStore::new());
        let vectors: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
        let chunks: Arc<dyn ChunkStore> = Arc::new(MemoryChunkStore::new());
        let media: Arc<dyn MediaStorage> = Arc::new(LocalMediaStorage::new(&config.media_path));

        let pipeline_config = PipelineConfig {
            labor_rate: config.labor_rate,
            ..PipelineConfig::default()
        };

        Self::with_components(
            config,
            windows,
            monitor,
            assessor,
            embedder,
            inspections,
            vectors,
            chunks,
            media,
            pipeline_config,
        )
    }

    /// Build state from explicit components (test injection point)
    #[allow(clippy::too_many_arguments)]
    pub fn with_components(
        config: ServerConfig,
        windows: Arc<WindowStore>,
        monitor: Arc<AlertDispatcher>,
        assessor: Arc<AssessmentClient>,
        embedder: Arc<dyn Embedder>,
        inspections: Arc<dyn InspectionStore>,
        vectors: Arc<dyn VectorStore>,
        chunks: Arc<dyn ChunkStore>,
        media: Arc<dyn MediaStorage>,
        pipeline_config: PipelineConfig,
    ) -> Self {
        let pipeline = Arc::new(InspectionPipeline::new(
            inspections.clone(),
            assessor,
            embedder.clone(),
            vectors.clone(),
            monitor.clone(),
            pipeline_config,
        ));

        let search = Arc::new(SimilarityEngine::new(
            embedder,
            vectors,
            chunks,
            monitor.clone(),
        ));

        Self {
            config,
            windows,
            monitor,
            pipeline,
            search,
            inspections,
            media,
        }
    }
}
