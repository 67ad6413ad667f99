//! Cluster configuration registry.
//!
//! Maps a `clusterID` carried in CO parameters to the monitors, CephFS and
//! RBD settings of that cluster. The registry is loaded once at daemon start
//! from a JSON file and is immutable afterwards; secrets never appear here,
//! they arrive per-RPC.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{CephixError, Result};

/// Default location of the cluster map inside the driver container.
pub const DEFAULT_CLUSTER_CONFIG_PATH: &str = "/etc/ceph-csi-config/config.json";

/// One cluster entry from the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    /// Identifier referenced by storage-class parameters and encoded into
    /// every CSI handle.
    #[serde(rename = "clusterID")]
    pub cluster_id: String,
    /// Monitor addresses, `host:port`.
    pub monitors: Vec<String>,
    /// CephFS-specific settings.
    #[serde(default, rename = "cephFS")]
    pub cephfs: CephFsConfig,
    /// RBD-specific settings.
    #[serde(default)]
    pub rbd: RbdConfig,
    /// Read-affinity settings applied to mount options.
    #[serde(default)]
    pub read_affinity: ReadAffinityConfig,
}

/// CephFS settings for a cluster.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CephFsConfig {
    /// Extra options appended to kernel mounts.
    pub kernel_mount_options: String,
    /// Extra options appended to FUSE mounts.
    pub fuse_mount_options: String,
    /// Subvolume group the driver provisions into.
    pub subvolume_group: String,
    /// Network namespace the mount helpers execute in.
    pub net_namespace_file_path: String,
    /// Permit the legacy resize fallback that recreates the subvolume with a
    /// new quota. Destroys data on clusters without native resize, so it is
    /// off unless explicitly enabled.
    pub allow_recreate_on_resize: bool,
}

/// RBD settings for a cluster.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RbdConfig {
    /// RADOS namespace images are created in.
    pub rados_namespace: String,
}

/// Read-affinity settings for a cluster.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadAffinityConfig {
    /// Whether `read_from_replica=localize` options are added.
    pub enabled: bool,
    /// CRUSH location labels considered when localising reads.
    pub crush_location_labels: Vec<String>,
}

impl ClusterInfo {
    /// Subvolume group, defaulting to the upstream convention.
    pub fn subvolume_group(&self) -> &str {
        if self.cephfs.subvolume_group.is_empty() {
            "csi"
        } else {
            &self.cephfs.subvolume_group
        }
    }

    /// Comma-joined monitor list as passed to Ceph tooling.
    pub fn mon_host(&self) -> String {
        self.monitors.join(",")
    }

    /// CRUSH location option string (`read_from_replica=localize,
    /// crush_location=host:a|zone:b`) for the given node labels, or `None`
    /// when read affinity is disabled or nothing matches.
    pub fn crush_location_options(&self, node_labels: &HashMap<String, String>) -> Option<String> {
        if !self.read_affinity.enabled {
            return None;
        }
        let mut terms: Vec<String> = self
            .read_affinity
            .crush_location_labels
            .iter()
            .filter_map(|label| {
                node_labels.get(label).map(|value| {
                    // CRUSH bucket types use the trailing label segment
                    // (`topology.kubernetes.io/zone` -> `zone`).
                    let bucket = label.rsplit('/').next().unwrap_or(label);
                    format!("{bucket}:{value}")
                })
            })
            .collect();
        if terms.is_empty() {
            return None;
        }
        terms.sort();
        Some(format!(
            "read_from_replica=localize,crush_location={}",
            terms.join("|")
        ))
    }
}

/// Process-wide registry of cluster configurations.
#[derive(Debug, Clone)]
pub struct ClusterRegistry {
    clusters: HashMap<String, ClusterInfo>,
}

impl ClusterRegistry {
    /// Load the registry from a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CephixError::Internal(format!(
                "failed to read cluster config {}: {e}",
                path.display()
            ))
        })?;
        Self::parse(&content)
    }

    /// Parse the JSON array form of the config file.
    pub fn parse(content: &str) -> Result<Self> {
        let entries: Vec<ClusterInfo> = serde_json::from_str(content)
            .map_err(|e| CephixError::Internal(format!("failed to parse cluster config: {e}")))?;

        let mut clusters = HashMap::new();
        for entry in entries {
            if entry.cluster_id.is_empty() {
                return Err(CephixError::InvalidArgument(
                    "cluster config entry without clusterID".to_string(),
                ));
            }
            if entry.monitors.is_empty() {
                return Err(CephixError::InvalidArgument(format!(
                    "cluster {} has no monitors",
                    entry.cluster_id
                )));
            }
            if clusters.insert(entry.cluster_id.clone(), entry).is_some() {
                return Err(CephixError::InvalidArgument(
                    "duplicate clusterID in cluster config".to_string(),
                ));
            }
        }

        Ok(Self { clusters })
    }

    /// Build a registry from already-parsed entries (used by tests).
    pub fn from_entries(entries: Vec<ClusterInfo>) -> Self {
        let clusters = entries
            .into_iter()
            .map(|e| (e.cluster_id.clone(), e))
            .collect();
        Self { clusters }
    }

    /// Resolve a cluster id from CO parameters.
    pub fn get(&self, cluster_id: &str) -> Result<&ClusterInfo> {
        self.clusters.get(cluster_id).ok_or_else(|| {
            CephixError::InvalidArgument(format!(
                "clusterID {cluster_id} not found in cluster config"
            ))
        })
    }

    /// Registered cluster ids, mainly for startup logging.
    pub fn cluster_ids(&self) -> Vec<&str> {
        self.clusters.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {
            "clusterID": "c1",
            "monitors": ["10.0.0.1:6789", "10.0.0.2:6789"],
            "cephFS": {
                "subvolumeGroup": "csi-vols",
                "kernelMountOptions": "ms_mode=secure"
            },
            "rbd": {
                "radosNamespace": "tenant-a"
            },
            "readAffinity": {
                "enabled": true,
                "crushLocationLabels": ["topology.kubernetes.io/zone"]
            }
        },
        {
            "clusterID": "c2",
            "monitors": ["192.168.1.1:6789"]
        }
    ]"#;

    #[test]
    fn test_parse_sample() {
        let reg = ClusterRegistry::parse(SAMPLE).unwrap();
        let c1 = reg.get("c1").unwrap();
        assert_eq!(c1.mon_host(), "10.0.0.1:6789,10.0.0.2:6789");
        assert_eq!(c1.subvolume_group(), "csi-vols");
        assert_eq!(c1.rbd.rados_namespace, "tenant-a");

        let c2 = reg.get("c2").unwrap();
        assert_eq!(c2.subvolume_group(), "csi");
        assert!(c2.rbd.rados_namespace.is_empty());
    }

    #[test]
    fn test_unknown_cluster_rejected() {
        let reg = ClusterRegistry::parse(SAMPLE).unwrap();
        assert!(matches!(
            reg.get("nope"),
            Err(CephixError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_duplicate_cluster_rejected() {
        let dup = r#"[
            {"clusterID": "c1", "monitors": ["m:1"]},
            {"clusterID": "c1", "monitors": ["m:2"]}
        ]"#;
        assert!(ClusterRegistry::parse(dup).is_err());
    }

    #[test]
    fn test_missing_monitors_rejected() {
        let bad = r#"[{"clusterID": "c1", "monitors": []}]"#;
        assert!(ClusterRegistry::parse(bad).is_err());
    }

    #[test]
    fn test_crush_location_options() {
        let reg = ClusterRegistry::parse(SAMPLE).unwrap();
        let c1 = reg.get("c1").unwrap();

        let mut labels = HashMap::new();
        labels.insert(
            "topology.kubernetes.io/zone".to_string(),
            "zone-a".to_string(),
        );
        assert_eq!(
            c1.crush_location_options(&labels).unwrap(),
            "read_from_replica=localize,crush_location=zone:zone-a"
        );

        // Disabled cluster yields nothing even with matching labels.
        let c2 = reg.get("c2").unwrap();
        assert!(c2.crush_location_options(&labels).is_none());
    }
}
