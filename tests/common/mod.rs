//! Shared test fixtures: scripted vision model, deterministic embedder,
//! and pipeline/state builders wired with in-memory stores.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use drishti_inspect::assessment::{AssessmentClient, VisionModel};
use drishti_inspect::config::ServerConfig;
use drishti_inspect::constants::EMBEDDING_DIMENSION;
use drishti_inspect::embeddings::Embedder;
use drishti_inspect::handlers::ServiceState;
use drishti_inspect::inspection::{
    InspectionPipeline, LocalMediaStorage, MemoryInspectionStore, PipelineConfig,
};
use drishti_inspect::monitor::{AlertDispatcher, WindowStore};
use drishti_inspect::search::{MemoryChunkStore, MemoryVectorStore};

/// A valid single-damage assessment reply (dent / front bumper / medium / 300)
pub const DENT_REPLY: &str = r#"{
    "damages": [{
        "type": "dent",
        "location": "front bumper",
        "severity": "medium",
        "description": "shallow dent near the grille",
        "estimated_cost": 300.0,
        "confidence": 0.92
    }],
    "overall_condition": "fair",
    "recommendations": ["repair before resale"],
    "total_estimated_cost": 300.0,
    "confidence": 0.92
}"#;

/// Reply with a severity outside the closed vocabulary
pub const BAD_SEVERITY_REPLY: &str = r#"{
    "damages": [{
        "type": "dent",
        "location": "hood",
        "severity": "catastrophic",
        "description": "big dent",
        "estimated_cost": 100.0
    }],
    "overall_condition": "poor"
}"#;

/// One scripted reply from the mock vision model
#[derive(Clone)]
pub enum MockReply {
    Ok(String),
    Err(String),
}

/// Scripted vision model: pops replies from a queue, falling back to a
/// default reply once the script is exhausted. Counts calls and optionally
/// delays each one.
pub struct MockVision {
    script: Mutex<VecDeque<MockReply>>,
    fallback: MockReply,
    pub calls: AtomicUsize,
    delay: Duration,
}

impl MockVision {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: MockReply::Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: MockReply::Err(message.to_string()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        })
    }

    pub fn scripted(script: Vec<MockReply>, fallback: MockReply) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        })
    }

    pub fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: MockReply::Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionModel for MockVision {
    async fn generate(&self, _prompt: &str, _image_urls: &[String]) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match reply {
            MockReply::Ok(s) => Ok(s),
            MockReply::Err(e) => Err(anyhow::anyhow!(e)),
        }
    }
}

/// Deterministic in-process embedder: same text, same vector
pub struct StubEmbedder;

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; EMBEDDING_DIMENSION];
                for (i, b) in text.bytes().enumerate() {
                    vector[i % EMBEDDING_DIMENSION] += b as f32 / 255.0;
                }
                vector
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }
}

/// Embedder that always fails the whole batch
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Err(anyhow::anyhow!("embedding backend unreachable"))
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }
}

/// Everything a pipeline test needs to observe side effects
pub struct PipelineHarness {
    pub pipeline: Arc<InspectionPipeline>,
    pub store: Arc<MemoryInspectionStore>,
    pub vectors: Arc<MemoryVectorStore>,
    pub windows: Arc<WindowStore>,
}

/// Build a pipeline around the given mock vision model and embedder
pub fn build_pipeline(
    vision: Arc<dyn VisionModel>,
    embedder: Arc<dyn Embedder>,
    config: PipelineConfig,
) -> PipelineHarness {
    let windows = Arc::new(WindowStore::new());
    let monitor = Arc::new(AlertDispatcher::new(windows.clone(), None, 0.5));
    let assessor = Arc::new(AssessmentClient::new(vision, monitor.clone()));
    let store = Arc::new(MemoryInspectionStore::new());
    let vectors = Arc::new(MemoryVectorStore::new());

    let pipeline = Arc::new(InspectionPipeline::new(
        store.clone(),
        assessor,
        embedder,
        vectors.clone(),
        monitor,
        config,
    ));

    PipelineHarness {
        pipeline,
        store,
        vectors,
        windows,
    }
}

/// Build full service state for handler tests, wired with mocks
pub fn build_state(
    vision: Arc<dyn VisionModel>,
    embedder: Arc<dyn Embedder>,
    media_dir: &std::path::Path,
) -> Arc<ServiceState> {
    let config = ServerConfig::default();
    let windows = Arc::new(WindowStore::new());
    let monitor = Arc::new(AlertDispatcher::new(
        windows.clone(),
        None,
        config.failure_rate_threshold,
    ));
    let assessor = Arc::new(AssessmentClient::new(vision, monitor.clone()));

    Arc::new(ServiceState::with_components(
        config,
        windows,
        monitor,
        assessor,
        embedder,
        Arc::new(MemoryInspectionStore::new()),
        Arc::new(MemoryVectorStore::new()),
        Arc::new(MemoryChunkStore::new()),
        Arc::new(LocalMediaStorage::new(media_dir)),
        PipelineConfig::default(),
    ))
}
