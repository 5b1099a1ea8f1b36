//! Forwarder configuration

use anyhow::Result;
use forwarder_lib::client::fallback_customer_id;
use serde::Deserialize;

/// Forwarder configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ForwarderConfig {
    /// Log file to follow
    #[serde(default = "default_log_file")]
    pub log_file: String,

    /// Collector API base URL
    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,

    /// API key identifying this customer
    #[serde(default = "default_api_key")]
    pub api_key: String,

    /// Customer display name, derived from the API key when unset
    #[serde(default)]
    pub customer_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_log_file() -> String {
    "/var/log/app.log".to_string()
}

fn default_dashboard_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_api_key() -> String {
    "dev-api-key".to_string()
}

fn default_api_port() -> u16 {
    9100
}

impl ForwarderConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("FORWARDER"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|_| ForwarderConfig {
            log_file: default_log_file(),
            dashboard_url: default_dashboard_url(),
            api_key: default_api_key(),
            customer_name: String::new(),
            api_port: default_api_port(),
        }))
    }

    /// Customer name to register with, falling back to an identifier
    /// derived from the API key so unnamed deployments stay stable
    pub fn effective_customer_name(&self) -> String {
        if self.customer_name.is_empty() {
            let digest = fallback_customer_id(&self.api_key);
            format!("Customer-{}", &digest[..8])
        } else {
            self.customer_name.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_without_any_env() {
        let config: ForwarderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.log_file, "/var/log/app.log");
        assert_eq!(config.dashboard_url, "http://localhost:8000");
        assert_eq!(config.api_key, "dev-api-key");
        assert!(config.customer_name.is_empty());
        assert_eq!(config.api_port, 9100);
    }

    #[test]
    fn test_explicit_customer_name_wins() {
        let config = ForwarderConfig {
            log_file: default_log_file(),
            dashboard_url: default_dashboard_url(),
            api_key: "key".to_string(),
            customer_name: "Acme".to_string(),
            api_port: default_api_port(),
        };
        assert_eq!(config.effective_customer_name(), "Acme");
    }

    #[test]
    fn test_customer_name_derived_from_api_key() {
        let config = ForwarderConfig {
            log_file: default_log_file(),
            dashboard_url: default_dashboard_url(),
            api_key: "dev-api-key".to_string(),
            customer_name: String::new(),
            api_port: default_api_port(),
        };
        let name = config.effective_customer_name();
        assert!(name.starts_with("Customer-"));
        assert_eq!(name.len(), "Customer-".len() + 8);
        // Stable across calls for the same key
        assert_eq!(name, config.effective_customer_name());
    }
}
