//! Configuration management for the driver daemon.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::cli::Args;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Driver identity configuration
    pub driver: DriverConfig,
    /// gRPC server configuration
    pub server: ServerConfig,
    /// Node-plugin configuration
    pub node: NodeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            driver: DriverConfig::default(),
            server: ServerConfig::default(),
            node: NodeConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config =
            serde_yaml::from_str(&content).with_context(|| "Failed to parse config file")?;

        Ok(config)
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref endpoint) = args.endpoint {
            self.server.endpoint = endpoint.clone();
        }

        if let Some(ref cluster_config) = args.cluster_config {
            self.driver.cluster_config_path = cluster_config.clone();
        }

        if let Some(ref node_id) = args.node_id {
            self.node.id = Some(node_id.clone());
        }

        if args.dev {
            self.driver.dev_mode = true;
        }

        self
    }
}

/// Driver identity configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Driver name advertised to the CO.
    pub name: String,
    /// Human-readable cluster name stamped into backend metadata.
    pub cluster_name: Option<String>,
    /// Whether CSI metadata is stamped onto backend objects.
    pub set_metadata: bool,
    /// Path to the cluster map JSON.
    pub cluster_config_path: String,
    /// Prefix for backend volume names.
    pub volume_name_prefix: String,
    /// Prefix for backend snapshot names.
    pub snapshot_name_prefix: String,
    /// Use the in-memory mock cluster instead of Ceph tooling.
    pub dev_mode: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            name: "cephix.csi.ceph.com".to_string(),
            cluster_name: None,
            set_metadata: false,
            cluster_config_path: cephix_core::DEFAULT_CLUSTER_CONFIG_PATH.to_string(),
            volume_name_prefix: "csi-vol".to_string(),
            snapshot_name_prefix: "csi-snap".to_string(),
            dev_mode: false,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// CSI endpoint (`unix:///csi/csi.sock` or `host:port`).
    pub endpoint: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: "unix:///csi/csi.sock".to_string(),
        }
    }
}

/// Node-plugin configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node ID reported by NodeGetInfo (host name when unset).
    pub id: Option<String>,
    /// Topology labels of this node (`topology.kubernetes.io/zone`, ...).
    pub labels: std::collections::HashMap<String, String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: None,
            labels: std::collections::HashMap::new(),
        }
    }
}

impl NodeConfig {
    /// Get the node ID, falling back to the host name.
    pub fn get_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .map(|h| h.trim().to_string())
                .unwrap_or_else(|_| "unknown".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.endpoint, "unix:///csi/csi.sock");
        assert_eq!(config.driver.name, "cephix.csi.ceph.com");
        assert!(!config.driver.set_metadata);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
driver:
  name: cephix.example.com
  cluster_name: east-1
  set_metadata: true
  volume_name_prefix: vol
server:
  endpoint: unix:///tmp/csi.sock
node:
  id: node-7
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.driver.name, "cephix.example.com");
        assert_eq!(config.driver.cluster_name.as_deref(), Some("east-1"));
        assert!(config.driver.set_metadata);
        assert_eq!(config.driver.volume_name_prefix, "vol");
        assert_eq!(config.node.get_id(), "node-7");
    }

    #[test]
    fn test_cli_overrides() {
        use clap::Parser;
        let args = crate::cli::Args::parse_from([
            "cephix-driver",
            "--endpoint",
            "unix:///run/csi.sock",
            "--node-id",
            "node-9",
            "--dev",
        ]);
        let config = Config::default().with_cli_overrides(&args);
        assert_eq!(config.server.endpoint, "unix:///run/csi.sock");
        assert_eq!(config.node.get_id(), "node-9");
        assert!(config.driver.dev_mode);
    }
}
