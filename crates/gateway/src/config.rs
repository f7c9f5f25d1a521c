//! Gateway configuration loaded from environment variables.

use std::time::Duration;

/// HTTP gateway configuration.
///
/// All fields have defaults suitable for local development; override
/// via environment variables in production builds.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the duel backend (default: `http://localhost:3000`).
    pub api_base_url: String,
    /// Per-request timeout (default: `15s`).
    pub request_timeout: Duration,
}

impl GatewayConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                 |
    /// |--------------------------------|-------------------------|
    /// | `PINDUEL_API_BASE_URL`         | `http://localhost:3000` |
    /// | `PINDUEL_REQUEST_TIMEOUT_SECS` | `15`                    |
    pub fn from_env() -> Self {
        let api_base_url = std::env::var("PINDUEL_API_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into());

        let request_timeout_secs: u64 = std::env::var("PINDUEL_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "15".into())
            .parse()
            .expect("PINDUEL_REQUEST_TIMEOUT_SECS must be a valid u64");

        Self {
            api_base_url,
            request_timeout: Duration::from_secs(request_timeout_secs),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".into(),
            request_timeout: Duration::from_secs(15),
        }
    }
}
