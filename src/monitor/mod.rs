//! Observability core: sliding-window failure rates and threshold alerting
//!
//! `WindowStore` keeps a bounded, per-family log of recent success/failure
//! events and computes approximate failure rates. `AlertDispatcher` evaluates
//! thresholds and pushes notifications to the log and an optional webhook.
//! Both are injectable; neither blocks the call path being measured.

pub mod alerts;
pub mod window;

pub use alerts::{Alert, AlertDispatcher, AlertField, AlertSeverity};
pub use window::{RateSample, WindowStore};
