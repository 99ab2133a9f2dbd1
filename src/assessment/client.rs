//! Vision assessment client
//!
//! Sends a structured damage-assessment prompt plus the ordered media list to
//! an OpenAI-compatible vision endpoint and decodes the reply against the
//! fixed schema in this module's parent. Transport failures and schema
//! mismatches are retried with exponential backoff; responses that still fail
//! validation surface as upstream-AI errors, never partial successes.
//!
//! Monitoring side effects per call: a latency metric, a health metric on
//! failure, a confidence metric on success. Slow calls and low-confidence
//! assessments raise alerts. None of this changes the processing outcome.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::assessment::VehicleAssessment;
use crate::constants::{
    CONFIDENCE_ALERT_FLOOR, LATENCY_ALERT_MS, RETRY_BASE_DELAY_MS, UPSTREAM_MAX_ATTEMPTS,
};
use crate::errors::AppError;
use crate::inspection::{MediaItem, MediaType};
use crate::metrics;
use crate::monitor::AlertDispatcher;

/// Boundary to the external vision model
///
/// Implementations return the model's raw text; prompt construction,
/// extraction, and schema validation belong to `AssessmentClient`.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn generate(&self, prompt: &str, image_urls: &[String]) -> anyhow::Result<String>;
}

// =============================================================================
// OPENAI-COMPATIBLE HTTP BACKEND
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: i32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// Vision model reached over an OpenAI-compatible `/v1/chat/completions` API
pub struct HttpVisionModel {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpVisionModel {
    pub fn new(endpoint: &str, model: &str, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl VisionModel for HttpVisionModel {
    async fn generate(&self, prompt: &str, image_urls: &[String]) -> anyhow::Result<String> {
        let mut content = vec![ContentPart::Text {
            text: prompt.to_string(),
        }];
        for url in image_urls {
            content.push(ContentPart::ImageUrl {
                image_url: ImageUrl { url: url.clone() },
            });
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content,
            }],
            temperature: 0.1,
            max_tokens: 2048,
        };

        let url = format!("{}/v1/chat/completions", self.endpoint);
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("vision request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "vision API returned status: {}",
                response.status()
            ));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("failed to parse vision response envelope: {e}"))?;

        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("vision API returned no choices"))
    }
}

// =============================================================================
// ASSESSMENT CLIENT
// =============================================================================

/// Validating, retrying wrapper around a `VisionModel`
pub struct AssessmentClient {
    model: Arc<dyn VisionModel>,
    monitor: Arc<AlertDispatcher>,
    max_attempts: u32,
}

impl AssessmentClient {
    pub fn new(model: Arc<dyn VisionModel>, monitor: Arc<AlertDispatcher>) -> Self {
        Self {
            model,
            monitor,
            max_attempts: UPSTREAM_MAX_ATTEMPTS,
        }
    }

    /// Assess the given media set for the VIN
    ///
    /// Retries transport failures and schema mismatches up to the bounded
    /// attempt count, then surfaces an upstream-AI error.
    pub async fn assess(
        &self,
        vin: &str,
        media: &[MediaItem],
    ) -> Result<VehicleAssessment, AppError> {
        let prompt = build_prompt(vin, media);
        let urls: Vec<String> = media.iter().map(|m| m.url.clone()).collect();
        let image_count = media
            .iter()
            .filter(|m| m.media_type == MediaType::Image)
            .count();

        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let delay = RETRY_BASE_DELAY_MS * (1u64 << (attempt - 2).min(4));
                tracing::debug!(attempt, delay_ms = delay, "retrying vision assessment");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let start = Instant::now();
            let outcome = self.model.generate(&prompt, &urls).await;
            let elapsed = start.elapsed();

            metrics::VISION_CALL_DURATION.observe(elapsed.as_secs_f64());
            self.record_latency(elapsed.as_millis());

            match outcome {
                Ok(raw) => match parse_assessment(&raw) {
                    Ok(assessment) => {
                        self.record_success(&assessment, image_count);
                        return Ok(assessment);
                    }
                    Err(e) => {
                        last_error = format!("schema validation failed: {e}");
                        self.record_failure(&last_error);
                    }
                },
                Err(e) => {
                    last_error = e.to_string();
                    self.record_failure(&last_error);
                }
            }
        }

        Err(AppError::UpstreamAi(format!(
            "vision assessment failed after {} attempts: {last_error}",
            self.max_attempts
        )))
    }

    fn record_latency(&self, elapsed_ms: u128) {
        let tags = HashMap::from([("elapsed_ms".to_string(), elapsed_ms.to_string())]);
        // Latency is neutral for rate computation; emitted for completeness
        self.monitor.record("vision.latency", &tags);
        if elapsed_ms > LATENCY_ALERT_MS {
            self.monitor.raise_latency_alert("vision assessment", elapsed_ms);
        }
    }

    fn record_failure(&self, reason: &str) {
        metrics::VISION_CALLS_TOTAL
            .with_label_values(&["failure"])
            .inc();
        tracing::warn!("vision assessment attempt failed: {reason}");
        self.monitor
            .record_outcome("vision.health_check_failed", "failure");
    }

    fn record_success(&self, assessment: &VehicleAssessment, image_count: usize) {
        metrics::VISION_CALLS_TOTAL
            .with_label_values(&["success"])
            .inc();

        let confidence = assessment.effective_confidence();
        let tags = HashMap::from([
            ("status".to_string(), "success".to_string()),
            ("confidence".to_string(), format!("{confidence:.2}")),
        ]);
        self.monitor.record("vision.assessment_complete", &tags);

        if confidence < CONFIDENCE_ALERT_FLOOR {
            self.monitor.raise_low_accuracy_alert(
                confidence,
                assessment.damages.len(),
                image_count,
            );
        }
    }
}

/// Build the assessment prompt with the severity/cost rubric
fn build_prompt(vin: &str, media: &[MediaItem]) -> String {
    format!(
        r#"You are a vehicle damage assessor. Examine the {count} attached media items for vehicle VIN {vin}.
Output ONLY valid JSON, no explanation or markdown.

Severity rubric:
- "low": minor cosmetic, no structural impact
- "medium": noticeable damage needing professional repair
- "high": damage affecting appearance or function, including structural issues

Output this exact JSON structure:
{{"damages":[{{"type":"dent","location":"front bumper","severity":"low|medium|high","description":"...","estimated_cost":0.0,"confidence":0.9,"source_image":"url","bounding_box":{{"x":0.0,"y":0.0,"width":0.0,"height":0.0}}}}],"overall_condition":"excellent|good|fair|poor","recommendations":["..."],"total_estimated_cost":0.0,"confidence":0.9}}"#,
        count = media.len(),
    )
}

/// Extract and strictly decode an assessment from raw model output
///
/// Any response failing schema validation is an error, not a coercion.
pub fn parse_assessment(raw: &str) -> anyhow::Result<VehicleAssessment> {
    let json = extract_json(raw);
    let assessment: VehicleAssessment = serde_json::from_str(&json)
        .map_err(|e| anyhow::anyhow!("response does not conform to assessment schema: {e}"))?;
    assessment.validate()?;
    Ok(assessment)
}

/// Extract JSON from potentially messy model output
fn extract_json(output: &str) -> String {
    // Remove markdown code blocks if present
    let cleaned = output
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    // Find the first { and matching }
    if let Some(start) = cleaned.find('{') {
        let mut depth = 0;
        let mut end = start;
        for (i, c) in cleaned[start..].chars().enumerate() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = start + i + 1;
                        break;
                    }
                }
                _ => {}
            }
        }
        cleaned[start..end].to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json() {
        let output = r#"Here is the assessment: {"damages": [], "overall_condition": "good"} done"#;
        let json = extract_json(output);
        assert!(json.starts_with('{'));
        assert!(json.ends_with('}'));
    }

    #[test]
    fn test_extract_json_with_markdown() {
        let output = "```json\n{\"damages\": [], \"overall_condition\": \"good\"}\n```";
        let json = extract_json(output);
        assert_eq!(json, r#"{"damages": [], "overall_condition": "good"}"#);
    }

    #[test]
    fn test_parse_valid_assessment() {
        let raw = r#"{
            "damages": [{
                "type": "dent",
                "location": "front bumper",
                "severity": "medium",
                "description": "shallow dent",
                "estimated_cost": 300.0
            }],
            "overall_condition": "fair",
            "recommendations": ["repair before resale"],
            "total_estimated_cost": 300.0
        }"#;
        let assessment = parse_assessment(raw).expect("valid assessment");
        assert_eq!(assessment.damages.len(), 1);
        assert_eq!(assessment.total_estimated_cost, 300.0);
    }

    #[test]
    fn test_parse_rejects_unknown_severity() {
        let raw = r#"{
            "damages": [{"type": "dent", "location": "hood", "severity": "extreme",
                         "description": "x", "estimated_cost": 1.0}],
            "overall_condition": "fair"
        }"#;
        assert!(parse_assessment(raw).is_err());
    }

    #[test]
    fn test_parse_rejects_negative_cost() {
        let raw = r#"{
            "damages": [{"type": "dent", "location": "hood", "severity": "low",
                         "description": "x", "estimated_cost": -5.0}],
            "overall_condition": "good"
        }"#;
        assert!(parse_assessment(raw).is_err());
    }

    #[test]
    fn test_prompt_carries_rubric_and_vin() {
        let media = vec![MediaItem {
            media_type: MediaType::Image,
            url: "https://cdn.example/1.jpg".into(),
            width: None,
            height: None,
            duration_secs: None,
            format: None,
            timestamp: None,
        }];
        let prompt = build_prompt("1HGBH41JXMN109186", &media);
        assert!(prompt.contains("1HGBH41JXMN109186"));
        assert!(prompt.contains("minor cosmetic"));
        assert!(prompt.contains("structural issues"));
    }
}
