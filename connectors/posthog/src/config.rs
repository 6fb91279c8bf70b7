use airsync_core::config::require_str;
use airsync_core::protocol::ConnectorSpecification;
use airsync_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://app.posthog.com";

lazy_static::lazy_static! {
    static ref SPEC: Value = {
        let spec = include_str!("../schema/spec.json");
        serde_json::from_str(spec).unwrap()
    };
}

pub fn spec() -> Result<ConnectorSpecification> {
    serde_json::from_value(SPEC.clone())
        .map_err(|e| Error::Protocol(format!("Invalid PostHog spec: {}", e)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosthogConfig {
    pub api_key: String,
    pub start_date: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl PosthogConfig {
    pub fn from_json(value: &Value) -> Result<Self> {
        // surface the missing key by name before serde's generic message
        require_str(value, "api_key")?;
        require_str(value, "start_date")?;

        let mut config: PosthogConfig = serde_json::from_value(value.clone())
            .map_err(|e| Error::InvalidConfiguration(format!("Invalid PostHog config: {}", e)))?;
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(config)
    }
}
