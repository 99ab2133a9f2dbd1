//! Persistence boundary for inspections and uploaded media
//!
//! The production deployment supplies a transactional document store behind
//! `InspectionStore`; the in-memory implementation here backs tests and
//! single-node development. Status updates go through `transition`, a
//! store-level conditional update, so two racing processors cannot both win
//! the pending → processing edge.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::path::PathBuf;
use uuid::Uuid;

use crate::inspection::{
    AssessmentOutcome, FailureInfo, Inspection, InspectionStatus,
};

/// Inspection persistence interface (external collaborator)
#[async_trait]
pub trait InspectionStore: Send + Sync {
    async fn create(&self, inspection: Inspection) -> anyhow::Result<()>;

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Inspection>>;

    /// Atomic compare-and-set on the status field
    ///
    /// Returns true iff the stored status equaled `from` and was updated to
    /// `to`. A caller that observes false lost the race and must not proceed.
    async fn transition(
        &self,
        id: Uuid,
        from: InspectionStatus,
        to: InspectionStatus,
    ) -> anyhow::Result<bool>;

    /// Mark complete with the normalized result
    async fn finish_complete(
        &self,
        id: Uuid,
        outcome: AssessmentOutcome,
        embedding_id: Option<Uuid>,
    ) -> anyhow::Result<()>;

    /// Mark failed with a categorized error summary
    async fn finish_failed(&self, id: Uuid, failure: FailureInfo) -> anyhow::Result<()>;

    /// Reset a failed inspection back to pending with its original media
    ///
    /// Returns true iff the inspection was in the failed state.
    async fn reset_for_retry(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn count(&self) -> anyhow::Result<usize>;
}

/// In-memory inspection store for tests and single-node development
#[derive(Default)]
pub struct MemoryInspectionStore {
    inner: DashMap<Uuid, Inspection>,
}

impl MemoryInspectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InspectionStore for MemoryInspectionStore {
    async fn create(&self, inspection: Inspection) -> anyhow::Result<()> {
        self.inner.insert(inspection.id, inspection);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Inspection>> {
        Ok(self.inner.get(&id).map(|e| e.clone()))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: InspectionStatus,
        to: InspectionStatus,
    ) -> anyhow::Result<bool> {
        // The dashmap shard lock makes the read-compare-write atomic
        let Some(mut entry) = self.inner.get_mut(&id) else {
            return Ok(false);
        };
        if entry.status != from {
            return Ok(false);
        }
        entry.status = to;
        Ok(true)
    }

    async fn finish_complete(
        &self,
        id: Uuid,
        outcome: AssessmentOutcome,
        embedding_id: Option<Uuid>,
    ) -> anyhow::Result<()> {
        let Some(mut entry) = self.inner.get_mut(&id) else {
            return Err(anyhow::anyhow!("inspection {id} not found"));
        };
        entry.status = InspectionStatus::Complete;
        entry.completed_at = Some(Utc::now());
        entry.result = Some(outcome);
        entry.embedding_id = embedding_id;
        entry.error = None;
        Ok(())
    }

    async fn finish_failed(&self, id: Uuid, failure: FailureInfo) -> anyhow::Result<()> {
        let Some(mut entry) = self.inner.get_mut(&id) else {
            return Err(anyhow::anyhow!("inspection {id} not found"));
        };
        entry.status = InspectionStatus::Failed;
        entry.completed_at = Some(Utc::now());
        entry.error = Some(failure);
        Ok(())
    }

    async fn reset_for_retry(&self, id: Uuid) -> anyhow::Result<bool> {
        let Some(mut entry) = self.inner.get_mut(&id) else {
            return Ok(false);
        };
        if entry.status != InspectionStatus::Failed {
            return Ok(false);
        }
        entry.status = InspectionStatus::Pending;
        entry.completed_at = None;
        entry.error = None;
        entry.result = None;
        entry.embedding_id = None;
        Ok(true)
    }

    async fn count(&self) -> anyhow::Result<usize> {
        Ok(self.inner.len())
    }
}

// =============================================================================
// MEDIA STORAGE
// =============================================================================

/// External file storage boundary for uploaded media
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Store a media blob, returning the URL to reference it by
    async fn store(&self, file_name: &str, bytes: Vec<u8>) -> anyhow::Result<String>;
}

/// Filesystem-backed media storage for development
pub struct LocalMediaStorage {
    base_path: PathBuf,
}

impl LocalMediaStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

#[async_trait]
impl MediaStorage for LocalMediaStorage {
    async fn store(&self, file_name: &str, bytes: Vec<u8>) -> anyhow::Result<String> {
        tokio::fs::create_dir_all(&self.base_path).await?;
        let path = self.base_path.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        Ok(format!("file://{}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspection::{InspectionMetadata, MediaItem, ProcessingOptions};

    fn pending_inspection() -> Inspection {
        Inspection::new(
            "1HGBH41JXMN109186".into(),
            vec![MediaItem::image("https://cdn.example/1.jpg")],
            ProcessingOptions::default(),
            InspectionMetadata::default(),
        )
    }

    #[tokio::test]
    async fn test_transition_cas_single_winner() {
        let store = MemoryInspectionStore::new();
        let inspection = pending_inspection();
        let id = inspection.id;
        store.create(inspection).await.unwrap();

        let first = store
            .transition(id, InspectionStatus::Pending, InspectionStatus::Processing)
            .await
            .unwrap();
        let second = store
            .transition(id, InspectionStatus::Pending, InspectionStatus::Processing)
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn test_transition_unknown_id_loses() {
        let store = MemoryInspectionStore::new();
        let won = store
            .transition(
                Uuid::new_v4(),
                InspectionStatus::Pending,
                InspectionStatus::Processing,
            )
            .await
            .unwrap();
        assert!(!won);
    }

    #[tokio::test]
    async fn test_retry_only_from_failed() {
        let store = MemoryInspectionStore::new();
        let inspection = pending_inspection();
        let id = inspection.id;
        store.create(inspection).await.unwrap();

        // Pending inspection cannot be retried
        assert!(!store.reset_for_retry(id).await.unwrap());

        store
            .finish_failed(
                id,
                FailureInfo {
                    category: "upstream_ai".into(),
                    message: "model unreachable".into(),
                },
            )
            .await
            .unwrap();
        assert!(store.reset_for_retry(id).await.unwrap());

        let reset = store.get(id).await.unwrap().unwrap();
        assert_eq!(reset.status, InspectionStatus::Pending);
        assert!(reset.error.is_none());
        assert!(reset.completed_at.is_none());
        assert_eq!(reset.media.len(), 1); // original media kept
    }

    #[tokio::test]
    async fn test_local_media_storage_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = LocalMediaStorage::new(dir.path());
        let url = storage
            .store("front.jpg", b"jpegbytes".to_vec())
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("front.jpg"));
    }
}
