//! Target service configuration

use crate::error::ConfigResult;
use crate::validation::{validate_http_url, Validatable};
use serde::{Deserialize, Serialize};

/// The web service under test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Base URL every action path is resolved against
    #[serde(default = "default_url")]
    pub url: String,

    /// Accept self-signed certificates on the target
    #[serde(default = "crate::domains::utils::default_false")]
    pub accept_invalid_certs: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            accept_invalid_certs: false,
        }
    }
}

impl Validatable for TargetConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_http_url(&self.url, "url", self.domain_name())
    }

    fn domain_name(&self) -> &'static str {
        "target"
    }
}

fn default_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_validation() {
        let mut config = TargetConfig::default();
        assert!(config.validate().is_ok());

        config.url = "127.0.0.1:8080".to_string();
        assert!(config.validate().is_err());
    }
}
