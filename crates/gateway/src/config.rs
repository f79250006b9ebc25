//! Gateway configuration.

use std::env;

use common::{env_or, RateLimitConfig};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Redis URL for shared rate limiting; unset keeps counters in process
    pub redis_url: Option<String>,
    /// Limits for authenticated routes
    pub rate_limit: RateLimitConfig,
    /// Stricter limits for the public auth routes
    pub auth_rate_limit: RateLimitConfig,
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("GATEWAY_HOST").unwrap_or(defaults.host),
            port: env_or("GATEWAY_PORT", defaults.port),
            redis_url: env::var("GATEWAY_REDIS_URL")
                .or_else(|_| env::var("REDIS_URL"))
                .ok()
                .filter(|v| !v.is_empty()),
            rate_limit: RateLimitConfig {
                max_requests: env_or("RATE_LIMIT_REQUESTS", defaults.rate_limit.max_requests),
                window_seconds: env_or(
                    "RATE_LIMIT_WINDOW_SECONDS",
                    defaults.rate_limit.window_seconds,
                ),
            },
            auth_rate_limit: RateLimitConfig {
                max_requests: env_or(
                    "RATE_LIMIT_AUTH_REQUESTS",
                    defaults.auth_rate_limit.max_requests,
                ),
                window_seconds: env_or(
                    "RATE_LIMIT_AUTH_WINDOW_SECONDS",
                    defaults.auth_rate_limit.window_seconds,
                ),
            },
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            redis_url: None,
            rate_limit: RateLimitConfig::default(),
            auth_rate_limit: RateLimitConfig {
                max_requests: 10,
                window_seconds: 60,
            },
        }
    }
}
