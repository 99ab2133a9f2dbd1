//! Documented constants for the inspection pipeline
//!
//! This module contains all tunable parameters with justification for their values.
//! Centralizing constants prevents magic numbers and makes tuning easier.

// =============================================================================
// PIPELINE TIMING
// =============================================================================

/// Hard ceiling on the synchronous caller's wait (seconds)
///
/// The timeout cancels only the caller's wait. The background processing task
/// keeps running and writes its terminal status when it finishes, so a client
/// that timed out can poll `GET /api/inspect?id=` for the eventual outcome.
///
/// Justification:
/// - 30s covers a vision call (typically 3-8s) plus 3 retries with backoff
/// - Longer waits tie up client connections for work that can be polled
pub const SYNC_PROCESSING_TIMEOUT_SECS: u64 = 30;

/// Heuristic completion estimate returned by the streaming acknowledgment (seconds)
///
/// Submission time + 120s. Intentionally pessimistic: a vision round plus
/// embedding plus persistence completes well under this on a healthy system,
/// and clients treat the value as a polling hint, not a deadline.
pub const ESTIMATED_COMPLETION_SECS: i64 = 120;

/// Bounded attempts for upstream AI calls (vision + embedding)
///
/// Justification:
/// - 3 attempts rides out transient model-server hiccups
/// - More attempts push the sync path past its 30s budget
pub const UPSTREAM_MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff between upstream retries (milliseconds)
///
/// Attempt n sleeps base * 2^(n-1): 100ms, 200ms, 400ms...
pub const RETRY_BASE_DELAY_MS: u64 = 100;

// =============================================================================
// METRICS WINDOW & ALERTING
// =============================================================================

/// Sliding-window horizon for failure-rate computation (seconds)
///
/// Events older than 5 minutes are evicted lazily on every append and read.
/// The horizon bounds per-family memory without a background sweeper.
pub const METRIC_WINDOW_SECS: i64 = 300;

/// Minimum events in a window before a failure rate is reported
///
/// Justification:
/// - Below 10 events a rate is statistically meaningless (1 failure = 100%)
pub const METRIC_RATE_FLOOR: usize = 10;

/// Hard cap on events retained per metric family
///
/// Backstop against a pathological emitter outrunning the time horizon.
pub const METRIC_WINDOW_MAX_EVENTS: usize = 4096;

/// Failure rate that triggers a rate alert (fraction of window)
pub const DEFAULT_FAILURE_RATE_THRESHOLD: f64 = 0.5;

/// Minimum spacing between rate alerts for the same metric family (seconds)
///
/// Without a cooldown every append past the threshold would fire an alert.
pub const RATE_ALERT_COOLDOWN_SECS: i64 = 60;

/// Vision/embedding call latency that triggers a latency alert (milliseconds)
pub const LATENCY_ALERT_MS: u128 = 2000;

/// Assessment confidence below this value triggers a low-accuracy alert
pub const CONFIDENCE_ALERT_FLOOR: f32 = 0.6;

/// Fallback confidence when the model returns none
///
/// Deliberately below CONFIDENCE_ALERT_FLOOR so unreported confidence
/// surfaces in triage instead of passing silently.
pub const FALLBACK_CONFIDENCE_BASE: f32 = 0.5;

// =============================================================================
// EMBEDDINGS & SEARCH
// =============================================================================

/// Fixed embedding dimension
///
/// Every vector in the index is exactly this long; a batch returning any
/// other dimension fails whole.
pub const EMBEDDING_DIMENSION: usize = 1024;

/// Default k for similarity queries
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Upper bound on a caller-supplied search limit
pub const MAX_SEARCH_LIMIT: usize = 100;

// =============================================================================
// VALIDATION LIMITS
// =============================================================================

/// VIN length (fixed by ISO 3779)
pub const VIN_LENGTH: usize = 17;

/// Minimum images for the v1 form-upload endpoint
pub const MIN_V1_IMAGES: usize = 3;

/// Maximum media items per inspection
pub const MAX_MEDIA_ITEMS: usize = 50;

/// Maximum knowledge-base chunk content size (bytes)
pub const MAX_CHUNK_CONTENT_LENGTH: usize = 50_000;

/// Maximum shop identifier length
pub const MAX_SHOP_ID_LENGTH: usize = 128;

// =============================================================================
// ESTIMATE DERIVATION
// Labor-hour table keyed by persisted severity. Parts cost is derived as the
// remainder of the assessed damage cost after labor.
// =============================================================================

/// Labor hours for a minor (cosmetic) damage
pub const LABOR_HOURS_MINOR: f64 = 1.0;

/// Labor hours for a moderate damage needing professional repair
pub const LABOR_HOURS_MODERATE: f64 = 3.0;

/// Labor hours for a severe damage affecting function or structure
pub const LABOR_HOURS_SEVERE: f64 = 8.0;

/// Default shop labor rate (currency units per hour), overridable via config
pub const DEFAULT_LABOR_RATE: f64 = 85.0;
