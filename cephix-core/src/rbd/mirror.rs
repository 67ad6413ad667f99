//! RBD mirroring (volume replication).
//!
//! Enable/disable, promote/demote, resync and last-sync introspection for
//! mirrored images. Snapshot-mode mirroring may carry a mirror-snapshot
//! schedule; journal mode ships every write and ignores scheduling
//! parameters with a warning.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::admin::{MirrorImageStatus, RbdAdmin};
use crate::error::{CephixError, Result};
use crate::rbd::FlattenMode;
use crate::types::{LastSyncInfo, MirrorMode, MirrorSchedule};

/// Replication parameter names (from the replication class).
const PARAM_MIRRORING_MODE: &str = "mirroringMode";
const PARAM_SCHEDULING_INTERVAL: &str = "schedulingInterval";
const PARAM_SCHEDULING_START_TIME: &str = "schedulingStartTime";
const PARAM_FLATTEN_MODE: &str = "flattenMode";

static SCHEDULE_INTERVAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+[mhd]$").expect("static regex must parse"));

/// Parsed replication configuration.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    pub mode: MirrorMode,
    pub schedule: Option<MirrorSchedule>,
    pub flatten: FlattenMode,
}

/// Parse and validate replication-class parameters.
///
/// The scheduling interval must match `^\d+[mhd]$`; a start time without an
/// interval is meaningless and rejected. Journal mode has no snapshot
/// schedule to attach, so scheduling parameters are ignored with a warning
/// rather than failing an otherwise valid request.
pub fn parse_replication_params(params: &HashMap<String, String>) -> Result<ReplicationConfig> {
    let mode = match params.get(PARAM_MIRRORING_MODE).map(String::as_str) {
        None | Some("") => MirrorMode::Snapshot,
        Some(raw) => MirrorMode::parse(raw)?,
    };
    let flatten = match params.get(PARAM_FLATTEN_MODE) {
        None => FlattenMode::Never,
        Some(raw) => FlattenMode::parse(raw)?,
    };

    let interval = params
        .get(PARAM_SCHEDULING_INTERVAL)
        .filter(|v| !v.is_empty());
    let start_time = params
        .get(PARAM_SCHEDULING_START_TIME)
        .filter(|v| !v.is_empty());

    let schedule = match (mode, interval) {
        (_, None) => {
            if start_time.is_some() {
                return Err(CephixError::InvalidArgument(
                    "schedulingStartTime requires schedulingInterval".to_string(),
                ));
            }
            None
        }
        (MirrorMode::Journal, Some(_)) => {
            warn!("journal mirroring has no snapshot schedule, ignoring scheduling parameters");
            None
        }
        (MirrorMode::Snapshot, Some(interval)) => {
            if !SCHEDULE_INTERVAL_RE.is_match(interval) {
                return Err(CephixError::InvalidArgument(format!(
                    "schedulingInterval {interval:?} must match <number>[m|h|d]"
                )));
            }
            Some(MirrorSchedule {
                interval: interval.clone(),
                start_time: start_time.cloned(),
            })
        }
    };

    Ok(ReplicationConfig {
        mode,
        schedule,
        flatten,
    })
}

/// Parse the last-sync JSON that snapshot-mode mirroring appends to the
/// status description after the first comma.
pub fn parse_last_sync_info(description: &str) -> Result<LastSyncInfo> {
    let (_, json_part) = description.split_once(',').ok_or_else(|| {
        CephixError::LastSyncNotFound(format!("description {description:?} has no sync details"))
    })?;
    let value: serde_json::Value = serde_json::from_str(json_part.trim()).map_err(|_| {
        CephixError::LastSyncNotFound(format!("description {description:?} has no sync details"))
    })?;

    let timestamp = value["local_snapshot_timestamp"].as_i64().ok_or_else(|| {
        CephixError::LastSyncNotFound("description carries no local_snapshot_timestamp".to_string())
    })?;
    let last_sync_time = DateTime::<Utc>::from_timestamp(timestamp, 0).ok_or_else(|| {
        CephixError::Internal(format!("invalid last-sync timestamp {timestamp}"))
    })?;

    Ok(LastSyncInfo {
        last_sync_time,
        last_sync_bytes: value["last_snapshot_bytes"].as_u64().unwrap_or(0),
        last_sync_duration_secs: value["last_snapshot_sync_seconds"].as_f64(),
    })
}

/// True when a resynced secondary has converged far enough for promotion:
/// local and all remote sites report daemon-up with an unknown image state.
pub fn resync_ready(status: &MirrorImageStatus) -> bool {
    let site_ready = |state: &str, up: bool| up && state == "up+unknown";
    site_ready(&status.local.state, status.local.up)
        && status
            .remotes
            .iter()
            .all(|site| site_ready(&site.state, site.up))
}

/// Mirroring operations for images of one pool / namespace.
pub struct MirrorManager<'a> {
    rbd_admin: &'a dyn RbdAdmin,
    pool: &'a str,
    namespace: &'a str,
}

impl<'a> MirrorManager<'a> {
    pub fn new(rbd_admin: &'a dyn RbdAdmin, pool: &'a str, namespace: &'a str) -> Self {
        Self {
            rbd_admin,
            pool,
            namespace,
        }
    }

    /// Enable mirroring on an image, flattening first when the policy says
    /// so, and attach the snapshot schedule where one was configured.
    #[instrument(skip(self, config), fields(pool = %self.pool, image = %image))]
    pub async fn enable(&self, image: &str, config: &ReplicationConfig) -> Result<()> {
        if config.flatten == FlattenMode::Force {
            let info = self.rbd_admin.image_info(self.pool, self.namespace, image).await?;
            if info.parent.is_some() {
                self.rbd_admin.flatten_image(self.pool, self.namespace, image).await?;
            }
        }

        self.rbd_admin
            .mirror_enable(self.pool, self.namespace, image, config.mode)
            .await?;

        if let Some(schedule) = &config.schedule {
            self.rbd_admin
                .snapshot_schedule_add(
                    self.pool,
                    self.namespace,
                    image,
                    &schedule.interval,
                    schedule.start_time.as_deref(),
                )
                .await?;
        }
        info!(image = %image, mode = config.mode.as_str(), "mirroring enabled");
        Ok(())
    }

    /// Disable mirroring.
    pub async fn disable(&self, image: &str, force: bool) -> Result<()> {
        self.rbd_admin
            .mirror_disable(self.pool, self.namespace, image, force)
            .await
    }

    /// Promote the image to primary.
    ///
    /// A busy backend during forced promotion means a previous promotion is
    /// still settling; that is surfaced as retryable so the CO polls.
    pub async fn promote(&self, image: &str, force: bool) -> Result<()> {
        match self
            .rbd_admin
            .mirror_promote(self.pool, self.namespace, image, force)
            .await
        {
            Err(CephixError::FailedPrecondition(msg)) if force => {
                Err(CephixError::OperationInProgress(msg))
            }
            other => other,
        }
    }

    /// Demote the image to secondary.
    pub async fn demote(&self, image: &str) -> Result<()> {
        self.rbd_admin.mirror_demote(self.pool, self.namespace, image).await
    }

    /// Request a resync of a diverged secondary.
    ///
    /// Only valid on a non-primary image whose local daemon state is known
    /// and up; resyncing a primary would discard the good copy.
    #[instrument(skip(self), fields(pool = %self.pool, image = %image))]
    pub async fn resync(&self, image: &str) -> Result<()> {
        let info = self.rbd_admin.mirror_info(self.pool, self.namespace, image).await?;
        if info.primary {
            return Err(CephixError::ImageNotPrimary(format!(
                "resync requested on primary image {image}"
            )));
        }
        let status = self.rbd_admin.mirror_status(self.pool, self.namespace, image).await?;
        if !status.local.up {
            return Err(CephixError::FailedPrecondition(format!(
                "local mirror state of {image} is not up ({})",
                status.local.state
            )));
        }
        self.rbd_admin.mirror_resync(self.pool, self.namespace, image).await?;
        info!(image = %image, "resync requested");
        Ok(())
    }

    /// Last-sync details of a mirrored image, parsed from the local site
    /// description.
    pub async fn replication_info(&self, image: &str) -> Result<LastSyncInfo> {
        let status = self.rbd_admin.mirror_status(self.pool, self.namespace, image).await?;
        parse_last_sync_info(&status.local.description)
    }

    /// Mirroring introspection passthrough.
    pub async fn info(&self, image: &str) -> Result<crate::admin::MirrorImageInfo> {
        self.rbd_admin.mirror_info(self.pool, self.namespace, image).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::RbdAdmin;
    use crate::mock::MockCluster;
    use crate::types::MirrorSiteStatus;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_replication_params_snapshot_schedule() {
        let config = parse_replication_params(&params(&[
            ("mirroringMode", "snapshot"),
            ("schedulingInterval", "15m"),
            ("schedulingStartTime", "14:00:00-05:00"),
        ]))
        .unwrap();
        assert_eq!(config.mode, MirrorMode::Snapshot);
        let schedule = config.schedule.unwrap();
        assert_eq!(schedule.interval, "15m");
        assert_eq!(schedule.start_time.as_deref(), Some("14:00:00-05:00"));
    }

    #[test]
    fn test_parse_replication_params_bad_interval() {
        for bad in ["15", "m15", "15s", "15 m", ""] {
            let result = parse_replication_params(&params(&[
                ("mirroringMode", "snapshot"),
                ("schedulingInterval", bad),
                ("schedulingStartTime", "14:00:00-05:00"),
            ]));
            assert!(result.is_err(), "interval {bad:?} must be rejected");
        }
    }

    #[test]
    fn test_parse_replication_params_journal_ignores_schedule() {
        let config = parse_replication_params(&params(&[
            ("mirroringMode", "journal"),
            ("schedulingInterval", "1h"),
        ]))
        .unwrap();
        assert_eq!(config.mode, MirrorMode::Journal);
        assert!(config.schedule.is_none());
    }

    #[test]
    fn test_parse_last_sync_info() {
        let description = r#"replaying, {"bytes_per_second":0.0,"last_snapshot_bytes":81920,"last_snapshot_sync_seconds":2,"local_snapshot_timestamp":1709288430,"remote_snapshot_timestamp":1709288430}"#;
        let info = parse_last_sync_info(description).unwrap();
        assert_eq!(info.last_sync_time.timestamp(), 1709288430);
        assert_eq!(info.last_sync_bytes, 81920);
        assert_eq!(info.last_sync_duration_secs, Some(2.0));
    }

    #[test]
    fn test_parse_last_sync_info_missing() {
        assert!(matches!(
            parse_last_sync_info("local image is primary"),
            Err(CephixError::LastSyncNotFound(_))
        ));
        assert!(matches!(
            parse_last_sync_info(r#"replaying, {"bytes_per_second":0.0}"#),
            Err(CephixError::LastSyncNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_enable_with_schedule() {
        let cluster = MockCluster::new();
        cluster.add_pool("rbd", 2);
        cluster.create_image("rbd", "", "img", 1 << 30, &[]).await.unwrap();
        let mgr = MirrorManager::new(&cluster, "rbd", "");

        let config = parse_replication_params(&params(&[
            ("mirroringMode", "snapshot"),
            ("schedulingInterval", "1h"),
        ]))
        .unwrap();
        mgr.enable("img", &config).await.unwrap();

        let info = mgr.info("img").await.unwrap();
        assert!(info.is_enabled());
        assert!(info.primary);
        assert_eq!(cluster.op_count("rbd.snapshot_schedule_add"), 1);
    }

    #[tokio::test]
    async fn test_resync_rejected_on_primary() {
        let cluster = MockCluster::new();
        cluster.add_pool("rbd", 2);
        cluster.create_image("rbd", "", "img", 1 << 30, &[]).await.unwrap();
        let mgr = MirrorManager::new(&cluster, "rbd", "");

        let config = parse_replication_params(&HashMap::new()).unwrap();
        mgr.enable("img", &config).await.unwrap();

        assert!(matches!(
            mgr.resync("img").await,
            Err(CephixError::ImageNotPrimary(_))
        ));

        // After demotion resync goes through.
        mgr.demote("img").await.unwrap();
        mgr.resync("img").await.unwrap();
    }

    #[test]
    fn test_resync_ready() {
        let site = |state: &str, up: bool| MirrorSiteStatus {
            site_name: String::new(),
            state: state.to_string(),
            up,
            description: String::new(),
            last_update: None,
        };
        let ready = MirrorImageStatus {
            local: site("up+unknown", true),
            remotes: vec![site("up+unknown", true)],
        };
        assert!(resync_ready(&ready));

        let not_ready = MirrorImageStatus {
            local: site("up+unknown", true),
            remotes: vec![site("up+replaying", true)],
        };
        assert!(!resync_ready(&not_ready));
    }
}
