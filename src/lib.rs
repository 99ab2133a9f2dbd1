//! Drishti-Inspect Library
//!
//! AI vehicle inspection server for repair shops.
//!
//! # Key Features
//! - Inspection lifecycle state machine (pending → processing → complete/failed)
//! - Vision-model damage assessment with strict schema validation
//! - Semantic similarity search over per-shop knowledge bases and prior inspections
//! - Sliding-window failure-rate alerting that never blocks the request path
//!
//! # Deployment Notes
//! - Single process, all external calls are async HTTP
//! - Persistence is pluggable behind store traits (in-memory stores ship for dev/test)
//! - Vision and embedding models are reached through OpenAI-compatible endpoints

pub mod assessment;
pub mod auth;
pub mod config;
pub mod constants;
pub mod embeddings;
pub mod errors;
pub mod handlers;
pub mod inspection;
pub mod metrics;
pub mod middleware;
pub mod monitor;
pub mod search;
pub mod validation;

// Re-export dependencies to ensure tests use the same version
pub use chrono;
pub use uuid;
