//! Inspection domain types
//!
//! The inspection record is mutated only by the pipeline; damages are
//! immutable once written (corrections create new records rather than
//! editing in place, preserving audit-trail parity with the rest of the
//! system).

pub mod pipeline;
pub mod store;

pub use pipeline::{AsyncAck, InspectionEvent, InspectionPipeline, PipelineConfig};
pub use store::{
    InspectionStore, LocalMediaStorage, MediaStorage, MemoryInspectionStore,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assessment::{AssessedSeverity, BoundingBox, OverallCondition};
use crate::constants::{LABOR_HOURS_MINOR, LABOR_HOURS_MODERATE, LABOR_HOURS_SEVERE};

/// Inspection lifecycle states
///
/// Transitions are monotonic: Pending → Processing → {Complete | Failed}.
/// The only backward edge is the external retry operation, which resets a
/// Failed inspection to Pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InspectionStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl InspectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

/// One media reference attached to an inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl MediaItem {
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            media_type: MediaType::Image,
            url: url.into(),
            width: None,
            height: None,
            duration_secs: None,
            format: None,
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

fn default_confidence_threshold() -> f32 {
    crate::constants::CONFIDENCE_ALERT_FLOOR
}

/// Processing options supplied at submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingOptions {
    #[serde(default)]
    pub enable_streaming: bool,
    #[serde(default)]
    pub enable_partial_results: bool,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            enable_streaming: false,
            enable_partial_results: false,
            confidence_threshold: default_confidence_threshold(),
            priority: Priority::Normal,
            webhook_url: None,
        }
    }
}

/// Free-form context captured with a submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InspectionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
}

/// Categorized error carried by a failed inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureInfo {
    pub category: String,
    pub message: String,
}

/// Severity vocabulary used by persisted damage records
///
/// The assessment schema speaks low/medium/high; persisted records speak
/// minor/moderate/severe. The mapping is explicit and bidirectional —
/// string equality between the two vocabularies is never assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageSeverity {
    Minor,
    Moderate,
    Severe,
}

impl From<AssessedSeverity> for DamageSeverity {
    fn from(s: AssessedSeverity) -> Self {
        match s {
            AssessedSeverity::Low => Self::Minor,
            AssessedSeverity::Medium => Self::Moderate,
            AssessedSeverity::High => Self::Severe,
        }
    }
}

impl From<DamageSeverity> for AssessedSeverity {
    fn from(s: DamageSeverity) -> Self {
        match s {
            DamageSeverity::Minor => Self::Low,
            DamageSeverity::Moderate => Self::Medium,
            DamageSeverity::Severe => Self::High,
        }
    }
}

impl DamageSeverity {
    /// Labor-hour estimate for this severity class
    pub fn labor_hours(&self) -> f64 {
        match self {
            Self::Minor => LABOR_HOURS_MINOR,
            Self::Moderate => LABOR_HOURS_MODERATE,
            Self::Severe => LABOR_HOURS_SEVERE,
        }
    }
}

/// Persisted damage record, immutable once written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Damage {
    pub id: Uuid,
    pub inspection_id: Uuid,
    pub damage_type: String,
    pub location: String,
    pub severity: DamageSeverity,
    pub description: String,
    pub confidence: f32,
    pub estimated_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

/// Repair estimate line derived from one damage record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateItem {
    pub damage_id: Uuid,
    pub category: String,
    pub labor_hours: f64,
    pub labor_rate: f64,
    pub parts_cost: f64,
    pub total_cost: f64,
}

impl EstimateItem {
    /// Derive an estimate line from a damage record
    ///
    /// Labor comes from the severity table; parts cost is the remainder of
    /// the assessed damage cost after labor. The total is rounded to the
    /// nearest cent at the point of computation, not per subterm.
    pub fn from_damage(damage: &Damage, labor_rate: f64) -> Self {
        let labor_hours = damage.severity.labor_hours();
        let labor_cost = labor_hours * labor_rate;
        let parts_cost = (damage.estimated_cost - labor_cost).max(0.0);

        Self {
            damage_id: damage.id,
            category: damage.damage_type.clone(),
            labor_hours,
            labor_rate,
            parts_cost,
            total_cost: round_cents(labor_hours * labor_rate + parts_cost),
        }
    }
}

/// Round a currency amount to the nearest cent
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Normalized result carried by a complete inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentOutcome {
    pub damages: Vec<Damage>,
    pub estimate_items: Vec<EstimateItem>,
    pub overall_condition: OverallCondition,
    pub recommendations: Vec<String>,
    pub total_estimated_cost: f64,
    pub confidence: f32,
}

/// The inspection record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inspection {
    pub id: Uuid,
    pub vin: String,
    pub media: Vec<MediaItem>,
    pub options: ProcessingOptions,
    pub metadata: InspectionMetadata,
    pub status: InspectionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AssessmentOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_id: Option<Uuid>,
}

impl Inspection {
    pub fn new(
        vin: String,
        media: Vec<MediaItem>,
        options: ProcessingOptions,
        metadata: InspectionMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            vin,
            media,
            options,
            metadata,
            status: InspectionStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
            result: None,
            embedding_id: None,
        }
    }

    /// Shop scope for embeddings; submissions without a shop share a default
    pub fn shop_id(&self) -> &str {
        self.metadata.shop_id.as_deref().unwrap_or("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping_is_bidirectional() {
        let pairs = [
            (AssessedSeverity::Low, DamageSeverity::Minor),
            (AssessedSeverity::Medium, DamageSeverity::Moderate),
            (AssessedSeverity::High, DamageSeverity::Severe),
        ];
        for (assessed, persisted) in pairs {
            assert_eq!(DamageSeverity::from(assessed), persisted);
            assert_eq!(AssessedSeverity::from(persisted), assessed);
        }
    }

    #[test]
    fn test_severity_vocabularies_serialize_distinctly() {
        assert_eq!(
            serde_json::to_string(&AssessedSeverity::Medium).unwrap(),
            "\"medium\""
        );
        assert_eq!(
            serde_json::to_string(&DamageSeverity::Moderate).unwrap(),
            "\"moderate\""
        );
    }

    #[test]
    fn test_round_cents() {
        assert_eq!(round_cents(10.004), 10.0);
        assert_eq!(round_cents(10.005), 10.01);
        assert_eq!(round_cents(299.999), 300.0);
    }

    #[test]
    fn test_estimate_totals_cover_assessed_cost() {
        let damage = Damage {
            id: Uuid::new_v4(),
            inspection_id: Uuid::new_v4(),
            damage_type: "dent".into(),
            location: "front bumper".into(),
            severity: DamageSeverity::Moderate,
            description: "shallow dent".into(),
            confidence: 0.9,
            estimated_cost: 300.0,
            source_image: None,
            bounding_box: None,
        };

        let item = EstimateItem::from_damage(&damage, 85.0);
        assert_eq!(item.labor_hours, 3.0);
        assert_eq!(item.parts_cost, 45.0); // 300 - 3h * 85
        assert_eq!(item.total_cost, 300.0);
        assert_eq!(item.category, "dent");
    }

    #[test]
    fn test_estimate_labor_floor_when_cost_is_low() {
        let damage = Damage {
            id: Uuid::new_v4(),
            inspection_id: Uuid::new_v4(),
            damage_type: "scratch".into(),
            location: "door".into(),
            severity: DamageSeverity::Minor,
            description: "light scratch".into(),
            confidence: 0.8,
            estimated_cost: 20.0,
            source_image: None,
            bounding_box: None,
        };

        // Labor alone exceeds the assessed cost; parts clamp to zero
        let item = EstimateItem::from_damage(&damage, 85.0);
        assert_eq!(item.parts_cost, 0.0);
        assert_eq!(item.total_cost, 85.0);
    }

    #[test]
    fn test_new_inspection_is_pending() {
        let inspection = Inspection::new(
            "1HGBH41JXMN109186".into(),
            vec![MediaItem::image("https://cdn.example/1.jpg")],
            ProcessingOptions::default(),
            InspectionMetadata::default(),
        );
        assert_eq!(inspection.status, InspectionStatus::Pending);
        assert!(!inspection.status.is_terminal());
        assert!(inspection.completed_at.is_none());
    }
}
