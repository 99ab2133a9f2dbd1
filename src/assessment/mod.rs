//! Vision assessment schema and normalization helpers
//!
//! The vision model returns free text that must decode into this fixed
//! schema. Enumerations are closed sets: a severity or condition outside the
//! vocabulary is a processing error, never coerced to a default.

pub mod client;

pub use client::{AssessmentClient, HttpVisionModel, VisionModel};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::constants::FALLBACK_CONFIDENCE_BASE;

/// Severity vocabulary used by the assessment schema
///
/// Maps onto the persisted `DamageSeverity` vocabulary (minor/moderate/
/// severe); the mapping lives next to the persisted type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessedSeverity {
    /// Minor cosmetic, no structural impact
    Low,
    /// Noticeable damage needing professional repair
    Medium,
    /// Damage affecting appearance or function, including structural issues
    High,
}

/// Overall vehicle condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallCondition {
    Excellent,
    Good,
    Fair,
    Poor,
}

/// Bounding box in image-relative units
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    fn validate(&self) -> Result<()> {
        let vals = [self.x, self.y, self.width, self.height];
        if vals.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(anyhow!("bounding box values must be finite and non-negative"));
        }
        Ok(())
    }
}

/// One detected damage in a vision assessment response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessedDamage {
    #[serde(rename = "type")]
    pub damage_type: String,
    pub location: String,
    pub severity: AssessedSeverity,
    pub description: String,
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub source_image: Option<String>,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
}

/// Structured vision assessment response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleAssessment {
    pub damages: Vec<AssessedDamage>,
    pub overall_condition: OverallCondition,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub total_estimated_cost: f64,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl VehicleAssessment {
    /// Validate numeric invariants the enum decode cannot express
    ///
    /// Enum membership is enforced by serde; this checks finiteness and
    /// non-negativity of every numeric field.
    pub fn validate(&self) -> Result<()> {
        if !self.total_estimated_cost.is_finite() || self.total_estimated_cost < 0.0 {
            return Err(anyhow!(
                "total_estimated_cost must be finite and non-negative, got {}",
                self.total_estimated_cost
            ));
        }

        for (idx, damage) in self.damages.iter().enumerate() {
            if damage.damage_type.trim().is_empty() {
                return Err(anyhow!("damages[{idx}] has an empty type"));
            }
            if !damage.estimated_cost.is_finite() || damage.estimated_cost < 0.0 {
                return Err(anyhow!(
                    "damages[{idx}] estimated_cost must be finite and non-negative, got {}",
                    damage.estimated_cost
                ));
            }
            if let Some(c) = damage.confidence {
                if !c.is_finite() || !(0.0..=1.0).contains(&c) {
                    return Err(anyhow!(
                        "damages[{idx}] confidence must be within [0,1], got {c}"
                    ));
                }
            }
            if let Some(bb) = &damage.bounding_box {
                bb.validate()
                    .map_err(|e| anyhow!("damages[{idx}]: {e}"))?;
            }
        }

        if let Some(c) = self.confidence {
            if !c.is_finite() || !(0.0..=1.0).contains(&c) {
                return Err(anyhow!("confidence must be within [0,1], got {c}"));
            }
        }

        Ok(())
    }

    /// Aggregate confidence with a conservative fallback
    ///
    /// The model's own confidence wins when present. Otherwise the value is
    /// derived from the per-damage confidences: their mean, discounted by
    /// their spread (inconsistent detections deserve less trust). With no
    /// confidence signal at all, a baseline below the alerting threshold is
    /// returned so the gap shows up in triage.
    pub fn effective_confidence(&self) -> f32 {
        if let Some(c) = self.confidence {
            return c.clamp(0.0, 1.0);
        }

        let per_damage: Vec<f32> = self
            .damages
            .iter()
            .filter_map(|d| d.confidence)
            .collect();

        if per_damage.is_empty() {
            return FALLBACK_CONFIDENCE_BASE;
        }

        let mean = per_damage.iter().sum::<f32>() / per_damage.len() as f32;
        let min = per_damage.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = per_damage.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let spread = (max - min).clamp(0.0, 1.0);

        (mean * (1.0 - spread / 2.0)).clamp(0.0, 1.0)
    }
}
