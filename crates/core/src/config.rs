//! Configuration schema and loader
//!
//! Both the registry and the campus nodes read an optional TOML file.
//! Every field has a default, so an empty file is a valid configuration.
//!
//! ```toml
//! [registry]
//! port = 1024
//!
//! [node]
//! campus = "dvl"
//! peer_timeout_ms = 1000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::Campus;

/// Well-known registry port
pub const DEFAULT_REGISTRY_PORT: u16 = 1024;

/// Bookings allowed per student per week across all campuses
pub const DEFAULT_WEEKLY_QUOTA: u32 = 3;

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub node: NodeConfig,
}

/// Registry section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Interface the registry binds to
    pub bind_host: String,
    /// Fixed registry port
    pub port: u16,
    /// Lowest port handed out by GetAvailablePort
    pub port_range_min: u16,
    /// Highest port (exclusive) handed out by GetAvailablePort
    pub port_range_max: u16,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: DEFAULT_REGISTRY_PORT,
            port_range_min: 1025,
            port_range_max: 65000,
        }
    }
}

/// Campus node section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Campus served by this node
    pub campus: Option<Campus>,
    /// Host published in the registry and used for binding
    pub host: String,
    /// Path published for the client-facing endpoint
    pub client_path: String,
    /// Path published for the inter-node endpoint
    pub inter_node_path: String,
    pub registry_host: String,
    pub registry_port: u16,
    /// Per-call timeout for registry and peer requests
    pub peer_timeout_ms: u64,
    pub weekly_quota: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            campus: None,
            host: "127.0.0.1".to_string(),
            client_path: "/roomreservation".to_string(),
            inter_node_path: "server".to_string(),
            registry_host: "127.0.0.1".to_string(),
            registry_port: DEFAULT_REGISTRY_PORT,
            peer_timeout_ms: 1000,
            weekly_quota: DEFAULT_WEEKLY_QUOTA,
        }
    }
}

impl NodeConfig {
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    pub fn registry_addr(&self) -> String {
        format!("{}:{}", self.registry_host, self.registry_port)
    }
}

impl Config {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.registry.port_range_min >= self.registry.port_range_max {
            return Err(Error::Config(format!(
                "Port range {}..{} is empty",
                self.registry.port_range_min, self.registry.port_range_max
            )));
        }
        if self.node.peer_timeout_ms == 0 {
            return Err(Error::Config("peer_timeout_ms must be positive".into()));
        }
        if self.node.weekly_quota == 0 {
            return Err(Error::Config("weekly_quota must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.registry.port, 1024);
        assert_eq!(config.node.weekly_quota, 3);
        assert_eq!(config.node.peer_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("campus.toml");
        fs::write(
            &path,
            r#"
[registry]
port = 4000

[node]
campus = "kkl"
peer_timeout_ms = 250
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.registry.port, 4000);
        assert_eq!(config.node.campus, Some(Campus::Kkl));
        assert_eq!(config.node.peer_timeout(), Duration::from_millis(250));
        assert_eq!(config.node.registry_port, 1024);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::from_toml_str("[node]\nweekly_quota = 0").is_err());
        assert!(Config::from_toml_str("[node]\npeer_timeout_ms = 0").is_err());
        assert!(
            Config::from_toml_str("[registry]\nport_range_min = 5000\nport_range_max = 5000").is_err()
        );
        assert!(Config::from_toml_str("[node]\ncampus = \"xyz\"").is_err());
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = Config::load(&temp.path().join("missing.toml"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
