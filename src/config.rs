//! Configuration management for drishti-inspect
//!
//! All configurable parameters in one place with environment variable
//! overrides. Sensible defaults, configurable in production.

use std::env;
use std::path::PathBuf;
use tracing::info;

use crate::constants::{DEFAULT_FAILURE_RATE_THRESHOLD, DEFAULT_LABOR_RATE};

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins (empty = allow all)
    pub allowed_origins: Vec<String>,
    /// Allowed HTTP methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Max age for preflight cache (seconds)
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(), // Empty = allow all origins
            allowed_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "DELETE".to_string(),
                "OPTIONS".to_string(),
            ],
            allowed_headers: vec![
                "Content-Type".to_string(),
                "X-API-Key".to_string(),
            ],
            max_age_seconds: 86400,
        }
    }
}

impl CorsConfig {
    /// Load from environment variables with production safety checks
    pub fn from_env(is_production: bool) -> Self {
        let mut config = Self::default();

        if let Ok(origins) = env::var("DRISHTI_CORS_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(methods) = env::var("DRISHTI_CORS_METHODS") {
            config.allowed_methods = methods
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(headers) = env::var("DRISHTI_CORS_HEADERS") {
            config.allowed_headers = headers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(val) = env::var("DRISHTI_CORS_MAX_AGE") {
            if let Ok(n) = val.parse() {
                config.max_age_seconds = n;
            }
        }

        if is_production && config.allowed_origins.is_empty() {
            tracing::warn!(
                "PRODUCTION WARNING: CORS allows all origins. Set DRISHTI_CORS_ORIGINS."
            );
        }

        config
    }

    /// Convert to tower-http CorsLayer
    pub fn to_layer(&self) -> tower_http::cors::CorsLayer {
        use tower_http::cors::{AllowOrigin, Any, CorsLayer};

        let mut layer = CorsLayer::new();

        if self.allowed_origins.is_empty() {
            layer = layer.allow_origin(Any);
        } else {
            let mut valid_origins = Vec::new();
            for origin_str in &self.allowed_origins {
                match origin_str.parse::<axum::http::HeaderValue>() {
                    Ok(origin) => valid_origins.push(origin),
                    Err(_) => tracing::warn!("CORS: Invalid origin '{}' - skipping", origin_str),
                }
            }

            if valid_origins.is_empty() {
                // Misconfigured origins must not fall back to permissive
                tracing::error!(
                    "CORS: All configured origins failed to parse. Rejecting cross-origin requests. Fix DRISHTI_CORS_ORIGINS."
                );
                layer = layer.allow_origin(AllowOrigin::list(Vec::<axum::http::HeaderValue>::new()));
            } else {
                layer = layer.allow_origin(AllowOrigin::list(valid_origins));
            }
        }

        let methods: Vec<axum::http::Method> = self
            .allowed_methods
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();
        if methods.is_empty() {
            layer = layer.allow_methods(Any);
        } else {
            layer = layer.allow_methods(methods);
        }

        let headers: Vec<axum::http::HeaderName> = self
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        if headers.is_empty() {
            layer = layer.allow_headers(Any);
        } else {
            layer = layer.allow_headers(headers);
        }

        layer.max_age(std::time::Duration::from_secs(self.max_age_seconds))
    }
}

/// Server configuration loaded from environment with defaults
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host address (default: 127.0.0.1)
    /// Set to 0.0.0.0 for Docker or network-accessible deployments
    pub host: String,

    /// Server port (default: 3050)
    pub port: u16,

    /// Vision model endpoint (OpenAI-compatible base URL)
    pub vision_endpoint: String,

    /// Vision model name
    pub vision_model: String,

    /// Vision API key (optional for local model servers)
    pub vision_api_key: Option<String>,

    /// Embedding model endpoint (OpenAI-compatible base URL)
    pub embedding_endpoint: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Embedding API key (optional for local model servers)
    pub embedding_api_key: Option<String>,

    /// Alert webhook URL; unset keeps alerts log-only
    pub alert_webhook: Option<String>,

    /// Failure rate that trips a rate alert
    pub failure_rate_threshold: f64,

    /// Shop labor rate for estimate derivation (currency per hour)
    pub labor_rate: f64,

    /// Local path for v1 media uploads
    pub media_path: PathBuf,

    /// Rate limit: requests per second
    pub rate_limit_per_second: u64,

    /// Rate limit: burst size
    pub rate_limit_burst: u32,

    /// Maximum concurrent requests
    pub max_concurrent_requests: usize,

    /// Whether running in production mode
    pub is_production: bool,

    /// CORS configuration
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3050,
            vision_endpoint: "http://localhost:11434".to_string(),
            vision_model: "qwen2.5-vl:7b".to_string(),
            vision_api_key: None,
            embedding_endpoint: "http://localhost:11434".to_string(),
            embedding_model: "mxbai-embed-large".to_string(),
            embedding_api_key: None,
            alert_webhook: None,
            failure_rate_threshold: DEFAULT_FAILURE_RATE_THRESHOLD,
            labor_rate: DEFAULT_LABOR_RATE,
            media_path: PathBuf::from("./drishti_media"),
            rate_limit_per_second: 100,
            rate_limit_burst: 200,
            max_concurrent_requests: 200,
            is_production: false,
            cors: CorsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    #[allow(clippy::field_reassign_with_default)] // Environment overrides require mutable config
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.is_production = env::var("DRISHTI_ENV")
            .map(|v| {
                let v = v.to_lowercase();
                v == "production" || v == "prod"
            })
            .unwrap_or(false);

        if let Ok(val) = env::var("DRISHTI_HOST") {
            config.host = val;
        }

        if let Ok(val) = env::var("DRISHTI_PORT") {
            if let Ok(port) = val.parse() {
                config.port = port;
            }
        }

        if let Ok(val) = env::var("DRISHTI_VISION_ENDPOINT") {
            config.vision_endpoint = val;
        }
        if let Ok(val) = env::var("DRISHTI_VISION_MODEL") {
            config.vision_model = val;
        }
        if let Ok(val) = env::var("DRISHTI_VISION_API_KEY") {
            if !val.trim().is_empty() {
                config.vision_api_key = Some(val);
            }
        }

        if let Ok(val) = env::var("DRISHTI_EMBEDDING_ENDPOINT") {
            config.embedding_endpoint = val;
        }
        if let Ok(val) = env::var("DRISHTI_EMBEDDING_MODEL") {
            config.embedding_model = val;
        }
        if let Ok(val) = env::var("DRISHTI_EMBEDDING_API_KEY") {
            if !val.trim().is_empty() {
                config.embedding_api_key = Some(val);
            }
        }

        if let Ok(val) = env::var("DRISHTI_ALERT_WEBHOOK") {
            if !val.trim().is_empty() {
                config.alert_webhook = Some(val);
            }
        }

        if let Ok(val) = env::var("DRISHTI_FAILURE_RATE_THRESHOLD") {
            if let Ok(n) = val.parse::<f64>() {
                config.failure_rate_threshold = n.clamp(0.05, 1.0);
            }
        }

        if let Ok(val) = env::var("DRISHTI_LABOR_RATE") {
            if let Ok(n) = val.parse::<f64>() {
                if n > 0.0 {
                    config.labor_rate = n;
                }
            }
        }

        if let Ok(val) = env::var("DRISHTI_MEDIA_PATH") {
            config.media_path = PathBuf::from(val);
        }

        if let Ok(val) = env::var("DRISHTI_RATE_LIMIT") {
            if let Ok(n) = val.parse() {
                config.rate_limit_per_second = n;
            }
        }

        if let Ok(val) = env::var("DRISHTI_RATE_BURST") {
            if let Ok(n) = val.parse() {
                config.rate_limit_burst = n;
            }
        }

        if let Ok(val) = env::var("DRISHTI_MAX_CONCURRENT") {
            if let Ok(n) = val.parse() {
                config.max_concurrent_requests = n;
            }
        }

        config.cors = CorsConfig::from_env(config.is_production);

        config
    }

    /// Log effective configuration at startup (secrets elided)
    pub fn log(&self) {
        info!("Configuration:");
        info!("  host: {}:{}", self.host, self.port);
        info!("  vision: {} ({})", self.vision_endpoint, self.vision_model);
        info!(
            "  embeddings: {} ({})",
            self.embedding_endpoint, self.embedding_model
        );
        info!(
            "  alert webhook: {}",
            if self.alert_webhook.is_some() { "configured" } else { "log-only" }
        );
        info!("  failure rate threshold: {}", self.failure_rate_threshold);
        info!("  labor rate: {}/h", self.labor_rate);
        info!("  media path: {:?}", self.media_path);
        info!(
            "  rate limit: {}/s burst {}",
            self.rate_limit_per_second, self.rate_limit_burst
        );
        info!("  max concurrent: {}", self.max_concurrent_requests);
        info!("  production: {}", self.is_production);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_development_safe() {
        let config = ServerConfig::default();
        assert!(!config.is_production);
        assert_eq!(config.host, "127.0.0.1");
        assert!(config.alert_webhook.is_none());
        assert!(config.failure_rate_threshold > 0.0);
    }

    #[test]
    fn test_cors_default_allows_all() {
        let cors = CorsConfig::default();
        assert!(cors.allowed_origins.is_empty());
        // Building the layer must not panic with defaults
        let _ = cors.to_layer();
    }
}
