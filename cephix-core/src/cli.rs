//! CLI-backed Ceph admin implementation.
//!
//! Drives the cluster through the `ceph`, `rbd` and `rados` tools with
//! `--format json` output. Every command carries the monitor list, the
//! client id and a keyfile, so no `ceph.conf` is required inside the driver
//! container.
//!
//! Where the cluster rejects a newer command form as unknown, the legacy
//! argument order is tried once; there are no silent retry loops.

use std::collections::HashMap;
use std::io::Write;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, error, warn};

use crate::admin::{
    BlocklistEntry, CephAdmin, FilesystemInfo, FsAdmin, MirrorImageInfo, MirrorImageStatus,
    NfsAdmin, OmapStore, OsdAdmin, RbdAdmin, RbdImageInfo, RbdSnapInfo, RbdSnapSpec,
    SubvolumeInfo, SubvolumeSnapshotInfo,
};
use crate::conn::AdminFactory;
use crate::credentials::Credentials;
use crate::error::{CephixError, Result};
use crate::types::{CloneState, MirrorMode, MirrorSiteStatus, QuiesceState};

/// Output of one admin command.
struct CmdOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl CmdOutput {
    fn json(&self) -> Result<Value> {
        serde_json::from_str(&self.stdout).map_err(|e| {
            CephixError::Internal(format!("failed to parse command output: {e}"))
        })
    }

    fn stderr_has(&self, needle: &str) -> bool {
        self.stderr.contains(needle)
    }
}

/// Admin handle backed by Ceph command-line tooling.
pub struct CephCli {
    monitors: String,
    id: String,
    /// Private copy of the key material; lives as long as the pooled
    /// connection, which outlives every borrower.
    keyfile: NamedTempFile,
    ceph_bin: String,
    rbd_bin: String,
    rados_bin: String,
}

impl CephCli {
    /// Build a handle for the given monitors and credentials. The key is
    /// copied into a keyfile owned by this handle.
    pub fn new(monitors: &str, creds: &Credentials) -> Result<Self> {
        let key = std::fs::read(creds.keyfile_path())
            .map_err(|e| CephixError::Internal(format!("failed to read keyfile: {e}")))?;
        let mut keyfile = NamedTempFile::new()
            .map_err(|e| CephixError::Internal(format!("failed to create keyfile: {e}")))?;
        keyfile
            .write_all(&key)
            .and_then(|_| keyfile.flush())
            .map_err(|e| CephixError::Internal(format!("failed to write keyfile: {e}")))?;

        Ok(Self {
            monitors: monitors.to_string(),
            id: creds.id.clone(),
            keyfile,
            ceph_bin: "ceph".to_string(),
            rbd_bin: "rbd".to_string(),
            rados_bin: "rados".to_string(),
        })
    }

    /// Common authentication arguments.
    fn auth_args(&self) -> Vec<String> {
        vec![
            "-m".to_string(),
            self.monitors.clone(),
            "--id".to_string(),
            self.id.clone(),
            "--keyfile".to_string(),
            self.keyfile.path().to_string_lossy().to_string(),
        ]
    }

    /// Execute a command and capture its output.
    async fn run(&self, program: &str, args: &[String]) -> Result<CmdOutput> {
        debug!(command = %program, args = ?args, "executing admin command");

        let output = Command::new(program)
            .args(args)
            .args(self.auth_args())
            .output()
            .await
            .map_err(|e| CephixError::ExecFailed(format!("failed to execute {program}: {e}")))?;

        let out = CmdOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        if !out.success {
            debug!(program = %program, stderr = %out.stderr, "admin command failed");
        }
        Ok(out)
    }

    async fn ceph(&self, args: &[&str]) -> Result<CmdOutput> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.run(&self.ceph_bin.clone(), &args).await
    }

    async fn rbd(&self, args: &[&str]) -> Result<CmdOutput> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.run(&self.rbd_bin.clone(), &args).await
    }

    async fn rados(&self, args: &[&str]) -> Result<CmdOutput> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.run(&self.rados_bin.clone(), &args).await
    }

    /// Classify a failed command into the error taxonomy. `not_found`
    /// supplies the entity-specific variant for ENOENT.
    fn classify(
        out: &CmdOutput,
        ctx: &str,
        not_found: fn(String) -> CephixError,
    ) -> CephixError {
        if out.stderr_has("ENOENT") || out.stderr_has("No such file or directory") {
            return not_found(ctx.to_string());
        }
        if out.stderr_has("no valid command found")
            || out.stderr_has("invalid command")
            || out.stderr_has("unrecognized arguments")
        {
            return CephixError::InvalidCommand(format!("{ctx}: {}", out.stderr.trim()));
        }
        if out.stderr_has("EACCES") || out.stderr_has("EPERM") || out.stderr_has("access denied")
        {
            return CephixError::Unauthenticated(format!("{ctx}: {}", out.stderr.trim()));
        }
        error!(ctx = %ctx, stderr = %out.stderr, "admin command failed");
        CephixError::ExecFailed(format!("{ctx}: {}", out.stderr.trim()))
    }

    /// Image spec (`pool/namespace/image` or `pool/image`), matching the
    /// form the rbd tool expects.
    fn image_spec(pool: &str, namespace: &str, image: &str) -> String {
        if namespace.is_empty() {
            format!("{pool}/{image}")
        } else {
            format!("{pool}/{namespace}/{image}")
        }
    }

    fn snap_spec(pool: &str, namespace: &str, image: &str, snap: &str) -> String {
        format!("{}@{snap}", Self::image_spec(pool, namespace, image))
    }

    fn rados_base_args(pool: &str, namespace: &str) -> Vec<String> {
        let mut args = vec!["-p".to_string(), pool.to_string()];
        if !namespace.is_empty() {
            args.push("--namespace".to_string());
            args.push(namespace.to_string());
        }
        args
    }
}

/// Parse `YYYY-mm-dd HH:MM:SS[.ffffff]` timestamps printed by Ceph tooling.
fn parse_ceph_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

fn site_status_from_json(site: &Value, site_name: String) -> MirrorSiteStatus {
    let state = site["state"].as_str().unwrap_or_default().to_string();
    MirrorSiteStatus {
        site_name,
        up: state.starts_with("up"),
        description: site["description"].as_str().unwrap_or_default().to_string(),
        last_update: site["last_update"]
            .as_str()
            .and_then(parse_ceph_timestamp),
        state,
    }
}

// =============================================================================
// OMAP
// =============================================================================

#[async_trait]
impl OmapStore for CephCli {
    async fn get_keys(
        &self,
        pool: &str,
        namespace: &str,
        oid: &str,
        keys: &[String],
    ) -> Result<HashMap<String, String>> {
        let mut result = HashMap::new();
        for key in keys {
            let value_file = NamedTempFile::new()
                .map_err(|e| CephixError::Internal(format!("failed to create temp file: {e}")))?;
            let mut args = Self::rados_base_args(pool, namespace);
            args.extend([
                "getomapval".to_string(),
                oid.to_string(),
                key.clone(),
                value_file.path().to_string_lossy().to_string(),
            ]);
            let out = self.run(&self.rados_bin.clone(), &args).await?;
            if !out.success {
                // Missing key or missing object both read as "no entry".
                if out.stderr_has("ENOENT") || out.stderr_has("No such key") {
                    continue;
                }
                return Err(Self::classify(&out, oid, CephixError::KeyNotFound));
            }
            let value = std::fs::read_to_string(value_file.path())
                .map_err(|e| CephixError::Internal(format!("failed to read omap value: {e}")))?;
            result.insert(key.clone(), value);
        }
        Ok(result)
    }

    async fn list_keys(
        &self,
        pool: &str,
        namespace: &str,
        oid: &str,
    ) -> Result<HashMap<String, String>> {
        let mut args = Self::rados_base_args(pool, namespace);
        args.extend(["listomapkeys".to_string(), oid.to_string()]);
        let out = self.run(&self.rados_bin.clone(), &args).await?;
        if !out.success {
            if out.stderr_has("ENOENT") {
                return Ok(HashMap::new());
            }
            return Err(Self::classify(&out, oid, CephixError::KeyNotFound));
        }
        let keys: Vec<String> = out
            .stdout
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        self.get_keys(pool, namespace, oid, &keys).await
    }

    async fn set_keys(
        &self,
        pool: &str,
        namespace: &str,
        oid: &str,
        pairs: &HashMap<String, String>,
    ) -> Result<()> {
        for (key, value) in pairs {
            let mut args = Self::rados_base_args(pool, namespace);
            args.extend([
                "setomapval".to_string(),
                oid.to_string(),
                key.clone(),
                value.clone(),
            ]);
            let out = self.run(&self.rados_bin.clone(), &args).await?;
            if !out.success {
                return Err(Self::classify(&out, oid, CephixError::KeyNotFound));
            }
        }
        Ok(())
    }

    async fn remove_keys(
        &self,
        pool: &str,
        namespace: &str,
        oid: &str,
        keys: &[String],
    ) -> Result<()> {
        for key in keys {
            let mut args = Self::rados_base_args(pool, namespace);
            args.extend(["rmomapkey".to_string(), oid.to_string(), key.clone()]);
            let out = self.run(&self.rados_bin.clone(), &args).await?;
            if !out.success && !out.stderr_has("ENOENT") {
                return Err(Self::classify(&out, oid, CephixError::KeyNotFound));
            }
        }
        Ok(())
    }

    async fn remove_object(&self, pool: &str, namespace: &str, oid: &str) -> Result<()> {
        let mut args = Self::rados_base_args(pool, namespace);
        args.extend(["rm".to_string(), oid.to_string()]);
        let out = self.run(&self.rados_bin.clone(), &args).await?;
        if !out.success && !out.stderr_has("ENOENT") {
            return Err(Self::classify(&out, oid, CephixError::KeyNotFound));
        }
        Ok(())
    }
}

// =============================================================================
// CEPHFS
// =============================================================================

#[async_trait]
impl FsAdmin for CephCli {
    async fn list_filesystems(&self) -> Result<Vec<FilesystemInfo>> {
        // `fs ls` carries the metadata pool name, `fs dump` the fs id; merge
        // the two by filesystem name.
        let ls = self.ceph(&["fs", "ls", "--format", "json"]).await?;
        if !ls.success {
            return Err(Self::classify(&ls, "fs ls", CephixError::FilesystemNotFound));
        }
        let ls_json = ls.json()?;
        let mut metadata_pools = HashMap::new();
        if let Some(entries) = ls_json.as_array() {
            for entry in entries {
                if let (Some(name), Some(pool)) =
                    (entry["name"].as_str(), entry["metadata_pool"].as_str())
                {
                    metadata_pools.insert(name.to_string(), pool.to_string());
                }
            }
        }

        let dump = self.ceph(&["fs", "dump", "--format", "json"]).await?;
        if !dump.success {
            return Err(Self::classify(&dump, "fs dump", CephixError::FilesystemNotFound));
        }
        let dump_json = dump.json()?;
        let mut filesystems = Vec::new();
        if let Some(entries) = dump_json["filesystems"].as_array() {
            for entry in entries {
                let name = entry["mdsmap"]["fs_name"].as_str().unwrap_or_default();
                let id = entry["id"].as_i64().unwrap_or_default();
                filesystems.push(FilesystemInfo {
                    name: name.to_string(),
                    id,
                    metadata_pool: metadata_pools.get(name).cloned().unwrap_or_default(),
                });
            }
        }
        Ok(filesystems)
    }

    async fn create_subvolume_group(&self, fs: &str, group: &str) -> Result<()> {
        let out = self
            .ceph(&["fs", "subvolumegroup", "create", fs, group])
            .await?;
        if !out.success {
            return Err(Self::classify(&out, group, CephixError::FilesystemNotFound));
        }
        Ok(())
    }

    async fn create_subvolume(
        &self,
        fs: &str,
        group: &str,
        name: &str,
        size_bytes: u64,
    ) -> Result<()> {
        let size = size_bytes.to_string();
        let out = self
            .ceph(&[
                "fs",
                "subvolume",
                "create",
                fs,
                name,
                size.as_str(),
                "--group_name",
                group,
            ])
            .await?;
        if !out.success {
            return Err(Self::classify(&out, name, CephixError::VolumeNotFound));
        }
        Ok(())
    }

    async fn subvolume_info(&self, fs: &str, group: &str, name: &str) -> Result<SubvolumeInfo> {
        let out = self
            .ceph(&[
                "fs",
                "subvolume",
                "info",
                fs,
                name,
                "--group_name",
                group,
                "--format",
                "json",
            ])
            .await?;
        if !out.success {
            return Err(Self::classify(&out, name, CephixError::VolumeNotFound));
        }
        let json = out.json()?;
        Ok(SubvolumeInfo {
            // "infinite" means no quota.
            bytes_quota: json["bytes_quota"].as_u64(),
            bytes_used: json["bytes_used"].as_u64().unwrap_or_default(),
            data_pool: json["data_pool"].as_str().unwrap_or_default().to_string(),
            features: json["features"]
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            state: json["state"].as_str().unwrap_or("complete").to_string(),
            path: json["path"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn resize_subvolume(
        &self,
        fs: &str,
        group: &str,
        name: &str,
        size_bytes: u64,
    ) -> Result<()> {
        let size = size_bytes.to_string();
        let out = self
            .ceph(&[
                "fs",
                "subvolume",
                "resize",
                fs,
                name,
                size.as_str(),
                "--group_name",
                group,
            ])
            .await?;
        if !out.success {
            return Err(Self::classify(&out, name, CephixError::VolumeNotFound));
        }
        Ok(())
    }

    async fn remove_subvolume(
        &self,
        fs: &str,
        group: &str,
        name: &str,
        force: bool,
        retain_snapshots: bool,
    ) -> Result<()> {
        let mut args = vec!["fs", "subvolume", "rm", fs, name, "--group_name", group];
        if force {
            args.push("--force");
        }
        if retain_snapshots {
            args.push("--retain-snapshots");
        }
        let out = self.ceph(&args).await?;
        if !out.success {
            if out.stderr_has("ENOTEMPTY") || out.stderr_has("snapshots") {
                return Err(CephixError::VolumeHasSnapshots(name.to_string()));
            }
            return Err(Self::classify(&out, name, CephixError::VolumeNotFound));
        }
        Ok(())
    }

    async fn set_subvolume_metadata(
        &self,
        fs: &str,
        group: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let out = self
            .ceph(&[
                "fs",
                "subvolume",
                "metadata",
                "set",
                fs,
                name,
                key,
                value,
                "--group_name",
                group,
            ])
            .await?;
        if !out.success {
            // Metadata support landed late; stamping is best-effort on old
            // clusters and the caller decides whether to ignore this.
            return Err(Self::classify(&out, name, CephixError::VolumeNotFound));
        }
        Ok(())
    }

    async fn create_snapshot(&self, fs: &str, group: &str, subvol: &str, snap: &str) -> Result<()> {
        let out = self
            .ceph(&[
                "fs",
                "subvolume",
                "snapshot",
                "create",
                fs,
                subvol,
                snap,
                "--group_name",
                group,
            ])
            .await?;
        if !out.success {
            return Err(Self::classify(&out, snap, CephixError::VolumeNotFound));
        }
        Ok(())
    }

    async fn remove_snapshot(
        &self,
        fs: &str,
        group: &str,
        subvol: &str,
        snap: &str,
        force: bool,
    ) -> Result<()> {
        let mut args = vec![
            "fs",
            "subvolume",
            "snapshot",
            "rm",
            fs,
            subvol,
            snap,
            "--group_name",
            group,
        ];
        if force {
            args.push("--force");
        }
        let out = self.ceph(&args).await?;
        if !out.success {
            if out.stderr_has("has pending clones") {
                return Err(CephixError::SnapshotHasPendingClones(snap.to_string()));
            }
            if out.stderr_has("protected") {
                return Err(CephixError::SnapshotProtected(snap.to_string()));
            }
            return Err(Self::classify(&out, snap, CephixError::SnapshotNotFound));
        }
        Ok(())
    }

    async fn list_snapshots(&self, fs: &str, group: &str, subvol: &str) -> Result<Vec<String>> {
        let out = self
            .ceph(&[
                "fs",
                "subvolume",
                "snapshot",
                "ls",
                fs,
                subvol,
                "--group_name",
                group,
                "--format",
                "json",
            ])
            .await?;
        if !out.success {
            return Err(Self::classify(&out, subvol, CephixError::VolumeNotFound));
        }
        let json = out.json()?;
        Ok(json
            .as_array()
            .map(|snaps| {
                snaps
                    .iter()
                    .filter_map(|s| s["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn snapshot_info(
        &self,
        fs: &str,
        group: &str,
        subvol: &str,
        snap: &str,
    ) -> Result<SubvolumeSnapshotInfo> {
        let out = self
            .ceph(&[
                "fs",
                "subvolume",
                "snapshot",
                "info",
                fs,
                subvol,
                snap,
                "--group_name",
                group,
                "--format",
                "json",
            ])
            .await?;
        if !out.success {
            if out.stderr_has("invalid command") || out.stderr_has("no valid command found") {
                return Err(CephixError::InvalidCommand(format!(
                    "snapshot info is not supported: {}",
                    out.stderr.trim()
                )));
            }
            return Err(Self::classify(&out, snap, CephixError::SnapshotNotFound));
        }
        let json = out.json()?;
        let created_at = json["created_at"]
            .as_str()
            .and_then(parse_ceph_timestamp)
            .unwrap_or_else(|| {
                warn!(snap = %snap, "snapshot without parseable created_at");
                Utc::now()
            });
        Ok(SubvolumeSnapshotInfo {
            created_at,
            protected: json["protected"].as_str() == Some("yes")
                || json["protected"].as_bool() == Some(true),
            pending_clones: json["pending_clones_count"].as_u64().unwrap_or_else(|| {
                u64::from(json["has_pending_clones"].as_str() == Some("yes"))
            }) as usize,
        })
    }

    async fn protect_snapshot(&self, fs: &str, group: &str, subvol: &str, snap: &str) -> Result<()> {
        let out = self
            .ceph(&[
                "fs",
                "subvolume",
                "snapshot",
                "protect",
                fs,
                subvol,
                snap,
                "--group_name",
                group,
            ])
            .await?;
        if !out.success && !out.stderr_has("EEXIST") && !out.stderr_has("already protected") {
            return Err(Self::classify(&out, snap, CephixError::SnapshotNotFound));
        }
        Ok(())
    }

    async fn unprotect_snapshot(
        &self,
        fs: &str,
        group: &str,
        subvol: &str,
        snap: &str,
    ) -> Result<()> {
        let out = self
            .ceph(&[
                "fs",
                "subvolume",
                "snapshot",
                "unprotect",
                fs,
                subvol,
                snap,
                "--group_name",
                group,
            ])
            .await?;
        if !out.success && !out.stderr_has("not protected") {
            return Err(Self::classify(&out, snap, CephixError::SnapshotNotFound));
        }
        Ok(())
    }

    async fn clone_snapshot(
        &self,
        fs: &str,
        group: &str,
        subvol: &str,
        snap: &str,
        target: &str,
    ) -> Result<()> {
        let out = self
            .ceph(&[
                "fs",
                "subvolume",
                "snapshot",
                "clone",
                fs,
                subvol,
                snap,
                target,
                "--group_name",
                group,
                "--target_group_name",
                group,
            ])
            .await?;
        if !out.success {
            return Err(Self::classify(&out, target, CephixError::SnapshotNotFound));
        }
        Ok(())
    }

    async fn clone_status(&self, fs: &str, group: &str, clone: &str) -> Result<CloneState> {
        let out = self
            .ceph(&[
                "fs",
                "clone",
                "status",
                fs,
                clone,
                "--group_name",
                group,
                "--format",
                "json",
            ])
            .await?;
        if !out.success {
            return Err(Self::classify(&out, clone, CephixError::VolumeNotFound));
        }
        let json = out.json()?;
        let state = json["status"]["state"].as_str().unwrap_or_default();
        CloneState::parse(state)
    }

    async fn quiesce(
        &self,
        fs: &str,
        set_id: &str,
        members: &[String],
        timeout_secs: u64,
        expiration_secs: u64,
    ) -> Result<QuiesceState> {
        let timeout = timeout_secs.to_string();
        let expiration = expiration_secs.to_string();
        let mut args = vec!["fs", "quiesce", fs];
        for member in members {
            args.push(member);
        }
        args.extend([
            "--set-id",
            set_id,
            "--timeout",
            timeout.as_str(),
            "--expiration",
            expiration.as_str(),
            "--format",
            "json",
        ]);
        let out = self.ceph(&args).await?;
        if !out.success {
            return Err(Self::classify(&out, set_id, CephixError::FilesystemNotFound));
        }
        let json = out.json()?;
        let state = json["sets"][set_id]["state"]["name"]
            .as_str()
            .unwrap_or_default();
        QuiesceState::parse(state)
    }

    async fn release_quiesce(&self, fs: &str, set_id: &str) -> Result<QuiesceState> {
        let out = self
            .ceph(&[
                "fs", "quiesce", fs, "--set-id", set_id, "--release", "--format", "json",
            ])
            .await?;
        if !out.success {
            if out.stderr_has("EPERM") {
                // Release of a set that is still quiescing.
                return Err(CephixError::QuiesceInProgress(set_id.to_string()));
            }
            return Err(Self::classify(&out, set_id, CephixError::FilesystemNotFound));
        }
        let json = out.json()?;
        let state = json["sets"][set_id]["state"]["name"]
            .as_str()
            .unwrap_or("RELEASED");
        QuiesceState::parse(state)
    }

    async fn reset_quiesce(&self, fs: &str, set_id: &str) -> Result<()> {
        let out = self
            .ceph(&["fs", "quiesce", fs, "--set-id", set_id, "--cancel"])
            .await?;
        if !out.success && !out.stderr_has("ENOENT") {
            return Err(Self::classify(&out, set_id, CephixError::FilesystemNotFound));
        }
        Ok(())
    }
}

// =============================================================================
// RBD
// =============================================================================

#[async_trait]
impl RbdAdmin for CephCli {
    async fn create_image(
        &self,
        pool: &str,
        namespace: &str,
        name: &str,
        size_bytes: u64,
        features: &[String],
    ) -> Result<()> {
        let spec = Self::image_spec(pool, namespace, name);
        let size = format!("{size_bytes}B");
        let mut args = vec!["create", "--size", size.as_str()];
        let feature_list;
        if !features.is_empty() {
            feature_list = features.join(",");
            args.push("--image-feature");
            args.push(&feature_list);
        }
        args.push(&spec);
        let out = self.rbd(&args).await?;
        if !out.success {
            return Err(Self::classify(&out, name, CephixError::PoolNotFound));
        }
        Ok(())
    }

    async fn image_info(&self, pool: &str, namespace: &str, name: &str) -> Result<RbdImageInfo> {
        let spec = Self::image_spec(pool, namespace, name);
        let out = self.rbd(&["info", spec.as_str(), "--format", "json"]).await?;
        if !out.success {
            return Err(Self::classify(&out, name, CephixError::ImageNotFound));
        }
        let json = out.json()?;
        let parent = json.get("parent").filter(|p| !p.is_null()).map(|p| RbdSnapSpec {
            pool: p["pool"].as_str().unwrap_or_default().to_string(),
            namespace: p["pool_namespace"].as_str().unwrap_or_default().to_string(),
            image: p["image"].as_str().unwrap_or_default().to_string(),
            snapshot: p["snapshot"].as_str().unwrap_or_default().to_string(),
        });
        Ok(RbdImageInfo {
            size_bytes: json["size"].as_u64().unwrap_or_default(),
            features: json["features"]
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            parent,
        })
    }

    async fn remove_image(&self, pool: &str, namespace: &str, name: &str) -> Result<()> {
        let spec = Self::image_spec(pool, namespace, name);
        let out = self.rbd(&["rm", spec.as_str()]).await?;
        if !out.success {
            if out.stderr_has("image has snapshots") {
                return Err(CephixError::VolumeHasSnapshots(name.to_string()));
            }
            return Err(Self::classify(&out, name, CephixError::ImageNotFound));
        }
        Ok(())
    }

    async fn resize_image(
        &self,
        pool: &str,
        namespace: &str,
        name: &str,
        size_bytes: u64,
    ) -> Result<()> {
        let spec = Self::image_spec(pool, namespace, name);
        let size = format!("{size_bytes}B");
        let out = self.rbd(&["resize", "--size", size.as_str(), spec.as_str()]).await?;
        if !out.success {
            return Err(Self::classify(&out, name, CephixError::ImageNotFound));
        }
        Ok(())
    }

    async fn clone_image(
        &self,
        parent: &RbdSnapSpec,
        child_name: &str,
        features: &[String],
    ) -> Result<()> {
        let parent_spec =
            Self::snap_spec(&parent.pool, &parent.namespace, &parent.image, &parent.snapshot);
        let child_spec = Self::image_spec(&parent.pool, &parent.namespace, child_name);
        let mut args = vec!["clone", parent_spec.as_str(), child_spec.as_str()];
        let feature_list;
        if !features.is_empty() {
            feature_list = features.join(",");
            args.push("--image-feature");
            args.push(&feature_list);
        }
        let out = self.rbd(&args).await?;
        if !out.success {
            return Err(Self::classify(&out, child_name, CephixError::SnapshotNotFound));
        }
        Ok(())
    }

    async fn flatten_image(&self, pool: &str, namespace: &str, name: &str) -> Result<()> {
        let spec = Self::image_spec(pool, namespace, name);
        let out = self.rbd(&["flatten", spec.as_str()]).await?;
        if !out.success {
            return Err(Self::classify(&out, name, CephixError::ImageNotFound));
        }
        Ok(())
    }

    async fn sparsify_image(&self, pool: &str, namespace: &str, name: &str) -> Result<()> {
        let spec = Self::image_spec(pool, namespace, name);
        let out = self.rbd(&["sparsify", spec.as_str()]).await?;
        if !out.success {
            return Err(Self::classify(&out, name, CephixError::ImageNotFound));
        }
        Ok(())
    }

    async fn create_snapshot(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        snap: &str,
    ) -> Result<()> {
        let spec = Self::snap_spec(pool, namespace, image, snap);
        let out = self.rbd(&["snap", "create", spec.as_str()]).await?;
        if !out.success {
            return Err(Self::classify(&out, snap, CephixError::ImageNotFound));
        }
        Ok(())
    }

    async fn remove_snapshot(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        snap: &str,
    ) -> Result<()> {
        let spec = Self::snap_spec(pool, namespace, image, snap);
        let out = self.rbd(&["snap", "rm", spec.as_str()]).await?;
        if !out.success {
            if out.stderr_has("protected") {
                return Err(CephixError::SnapshotProtected(snap.to_string()));
            }
            return Err(Self::classify(&out, snap, CephixError::SnapshotNotFound));
        }
        Ok(())
    }

    async fn list_snapshots(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
    ) -> Result<Vec<RbdSnapInfo>> {
        let spec = Self::image_spec(pool, namespace, image);
        let out = self.rbd(&["snap", "ls", spec.as_str(), "--format", "json"]).await?;
        if !out.success {
            return Err(Self::classify(&out, image, CephixError::ImageNotFound));
        }
        let json = out.json()?;
        Ok(json
            .as_array()
            .map(|snaps| {
                snaps
                    .iter()
                    .map(|s| RbdSnapInfo {
                        name: s["name"].as_str().unwrap_or_default().to_string(),
                        size_bytes: s["size"].as_u64().unwrap_or_default(),
                        protected: s["protected"].as_str() == Some("true")
                            || s["protected"].as_bool() == Some(true),
                        created_at: s["timestamp"].as_str().and_then(parse_ceph_timestamp),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn protect_snapshot(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        snap: &str,
    ) -> Result<()> {
        let spec = Self::snap_spec(pool, namespace, image, snap);
        let out = self.rbd(&["snap", "protect", spec.as_str()]).await?;
        if !out.success && !out.stderr_has("EBUSY") && !out.stderr_has("already protected") {
            return Err(Self::classify(&out, snap, CephixError::SnapshotNotFound));
        }
        Ok(())
    }

    async fn unprotect_snapshot(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        snap: &str,
    ) -> Result<()> {
        let spec = Self::snap_spec(pool, namespace, image, snap);
        let out = self.rbd(&["snap", "unprotect", spec.as_str()]).await?;
        if !out.success && !out.stderr_has("not protected") {
            if out.stderr_has("EBUSY") {
                return Err(CephixError::SnapshotHasPendingClones(snap.to_string()));
            }
            return Err(Self::classify(&out, snap, CephixError::SnapshotNotFound));
        }
        Ok(())
    }

    async fn children(&self, parent: &RbdSnapSpec) -> Result<Vec<String>> {
        let spec =
            Self::snap_spec(&parent.pool, &parent.namespace, &parent.image, &parent.snapshot);
        let out = self.rbd(&["children", spec.as_str(), "--format", "json"]).await?;
        if !out.success {
            return Err(Self::classify(&out, &parent.image, CephixError::SnapshotNotFound));
        }
        let json = out.json()?;
        Ok(json
            .as_array()
            .map(|children| {
                children
                    .iter()
                    .filter_map(|c| c["image"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_image_meta(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let spec = Self::image_spec(pool, namespace, image);
        let out = self.rbd(&["image-meta", "set", spec.as_str(), key, value]).await?;
        if !out.success {
            return Err(Self::classify(&out, image, CephixError::ImageNotFound));
        }
        Ok(())
    }

    async fn get_image_meta(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        key: &str,
    ) -> Result<String> {
        let spec = Self::image_spec(pool, namespace, image);
        let out = self.rbd(&["image-meta", "get", spec.as_str(), key]).await?;
        if !out.success {
            return Err(Self::classify(&out, key, CephixError::KeyNotFound));
        }
        Ok(out.stdout.trim_end_matches('\n').to_string())
    }

    async fn mirror_enable(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        mode: MirrorMode,
    ) -> Result<()> {
        let spec = Self::image_spec(pool, namespace, image);
        let out = self
            .rbd(&["mirror", "image", "enable", spec.as_str(), mode.as_str()])
            .await?;
        if !out.success && !out.stderr_has("already enabled") {
            return Err(Self::classify(&out, image, CephixError::ImageNotFound));
        }
        Ok(())
    }

    async fn mirror_disable(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        force: bool,
    ) -> Result<()> {
        let spec = Self::image_spec(pool, namespace, image);
        let mut args = vec!["mirror", "image", "disable", spec.as_str()];
        if force {
            args.push("--force");
        }
        let out = self.rbd(&args).await?;
        if !out.success && !out.stderr_has("mirroring not enabled") {
            return Err(Self::classify(&out, image, CephixError::ImageNotFound));
        }
        Ok(())
    }

    async fn mirror_promote(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        force: bool,
    ) -> Result<()> {
        let spec = Self::image_spec(pool, namespace, image);
        let mut args = vec!["mirror", "image", "promote", spec.as_str()];
        if force {
            args.push("--force");
        }
        let out = self.rbd(&args).await?;
        if !out.success {
            if out.stderr_has("already primary") {
                return Ok(());
            }
            if out.stderr_has("EBUSY") {
                return Err(CephixError::FailedPrecondition(format!(
                    "image {image} is busy; forced promotion required"
                )));
            }
            return Err(Self::classify(&out, image, CephixError::ImageNotFound));
        }
        Ok(())
    }

    async fn mirror_demote(&self, pool: &str, namespace: &str, image: &str) -> Result<()> {
        let spec = Self::image_spec(pool, namespace, image);
        let out = self.rbd(&["mirror", "image", "demote", spec.as_str()]).await?;
        if !out.success && !out.stderr_has("not primary") {
            return Err(Self::classify(&out, image, CephixError::ImageNotFound));
        }
        Ok(())
    }

    async fn mirror_resync(&self, pool: &str, namespace: &str, image: &str) -> Result<()> {
        let spec = Self::image_spec(pool, namespace, image);
        let out = self.rbd(&["mirror", "image", "resync", spec.as_str()]).await?;
        if !out.success {
            if out.stderr_has("primary") {
                return Err(CephixError::ImageNotPrimary(image.to_string()));
            }
            return Err(Self::classify(&out, image, CephixError::ImageNotFound));
        }
        Ok(())
    }

    async fn mirror_info(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
    ) -> Result<MirrorImageInfo> {
        let spec = Self::image_spec(pool, namespace, image);
        let out = self.rbd(&["info", spec.as_str(), "--format", "json"]).await?;
        if !out.success {
            return Err(Self::classify(&out, image, CephixError::ImageNotFound));
        }
        let json = out.json()?;
        let mirroring = &json["mirroring"];
        let state = mirroring["state"].as_str().unwrap_or("disabled").to_string();
        let mode = match mirroring["mode"].as_str() {
            Some(raw) if state != "disabled" => Some(MirrorMode::parse(raw)?),
            _ => None,
        };
        Ok(MirrorImageInfo {
            mode,
            state,
            primary: mirroring["primary"].as_bool().unwrap_or(false),
            global_id: mirroring["global_id"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn mirror_status(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
    ) -> Result<MirrorImageStatus> {
        let spec = Self::image_spec(pool, namespace, image);
        let out = self
            .rbd(&["mirror", "image", "status", spec.as_str(), "--format", "json"])
            .await?;
        if !out.success {
            return Err(Self::classify(&out, image, CephixError::ImageNotFound));
        }
        let json = out.json()?;
        let local = site_status_from_json(&json, String::new());
        let remotes = json["peer_sites"]
            .as_array()
            .map(|sites| {
                sites
                    .iter()
                    .map(|site| {
                        let name = site["site_name"].as_str().unwrap_or_default().to_string();
                        site_status_from_json(site, name)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(MirrorImageStatus { local, remotes })
    }

    async fn snapshot_schedule_add(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        interval: &str,
        start_time: Option<&str>,
    ) -> Result<()> {
        let mut args = vec![
            "mirror",
            "snapshot",
            "schedule",
            "add",
            "--pool",
            pool,
        ];
        if !namespace.is_empty() {
            args.push("--namespace");
            args.push(namespace);
        }
        args.extend(["--image", image, interval]);
        if let Some(start) = start_time {
            args.push(start);
        }
        let out = self.rbd(&args).await?;
        if !out.success {
            return Err(Self::classify(&out, image, CephixError::ImageNotFound));
        }
        Ok(())
    }

    async fn group_create(&self, pool: &str, namespace: &str, group: &str) -> Result<()> {
        let spec = Self::image_spec(pool, namespace, group);
        let out = self.rbd(&["group", "create", spec.as_str()]).await?;
        if !out.success && !out.stderr_has("EEXIST") {
            return Err(Self::classify(&out, group, CephixError::PoolNotFound));
        }
        Ok(())
    }

    async fn group_remove(&self, pool: &str, namespace: &str, group: &str) -> Result<()> {
        let spec = Self::image_spec(pool, namespace, group);
        let out = self.rbd(&["group", "rm", spec.as_str()]).await?;
        if !out.success {
            return Err(Self::classify(&out, group, CephixError::VolumeNotFound));
        }
        Ok(())
    }

    async fn group_image_add(
        &self,
        pool: &str,
        namespace: &str,
        group: &str,
        image: &str,
    ) -> Result<()> {
        let group_spec = Self::image_spec(pool, namespace, group);
        let image_spec = Self::image_spec(pool, namespace, image);
        let out = self
            .rbd(&["group", "image", "add", group_spec.as_str(), image_spec.as_str()])
            .await?;
        if !out.success && !out.stderr_has("EEXIST") {
            return Err(Self::classify(&out, image, CephixError::ImageNotFound));
        }
        Ok(())
    }

    async fn group_image_remove(
        &self,
        pool: &str,
        namespace: &str,
        group: &str,
        image: &str,
    ) -> Result<()> {
        let group_spec = Self::image_spec(pool, namespace, group);
        let image_spec = Self::image_spec(pool, namespace, image);
        let out = self
            .rbd(&["group", "image", "rm", group_spec.as_str(), image_spec.as_str()])
            .await?;
        if !out.success && !out.stderr_has("ENOENT") {
            return Err(Self::classify(&out, image, CephixError::ImageNotFound));
        }
        Ok(())
    }

    async fn group_images(&self, pool: &str, namespace: &str, group: &str) -> Result<Vec<String>> {
        let spec = Self::image_spec(pool, namespace, group);
        let out = self
            .rbd(&["group", "image", "list", spec.as_str(), "--format", "json"])
            .await?;
        if !out.success {
            return Err(Self::classify(&out, group, CephixError::VolumeNotFound));
        }
        let json = out.json()?;
        Ok(json
            .as_array()
            .map(|images| {
                images
                    .iter()
                    .filter_map(|i| i["image"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }
}

// =============================================================================
// NFS
// =============================================================================

#[async_trait]
impl NfsAdmin for CephCli {
    async fn create_export(
        &self,
        nfs_cluster: &str,
        fs: &str,
        path: &str,
        pseudo_path: &str,
    ) -> Result<()> {
        // Newer clusters take flagged arguments.
        let out = self
            .ceph(&[
                "nfs",
                "export",
                "create",
                "cephfs",
                "--cluster-id",
                nfs_cluster,
                "--pseudo-path",
                pseudo_path,
                "--fsname",
                fs,
                "--path",
                path,
            ])
            .await?;
        if out.success {
            return Ok(());
        }
        let first_err = Self::classify(&out, pseudo_path, CephixError::ExportNotFound);
        if !matches!(first_err, CephixError::InvalidCommand(_)) {
            return Err(first_err);
        }

        // Legacy positional dialect.
        warn!(
            nfs_cluster = %nfs_cluster,
            "typed export create not implemented by cluster, falling back to legacy form"
        );
        let path_arg = format!("--path={path}");
        let out = self
            .ceph(&[
                "nfs",
                "export",
                "create",
                "cephfs",
                fs,
                nfs_cluster,
                pseudo_path,
                path_arg.as_str(),
            ])
            .await?;
        if !out.success {
            return Err(Self::classify(&out, pseudo_path, CephixError::ExportNotFound));
        }
        Ok(())
    }

    async fn remove_export(&self, nfs_cluster: &str, pseudo_path: &str) -> Result<()> {
        let out = self
            .ceph(&["nfs", "export", "rm", nfs_cluster, pseudo_path])
            .await?;
        if !out.success {
            return Err(Self::classify(&out, pseudo_path, CephixError::ExportNotFound));
        }
        Ok(())
    }
}

// =============================================================================
// OSD
// =============================================================================

#[async_trait]
impl OsdAdmin for CephCli {
    async fn pool_id(&self, pool: &str) -> Result<i64> {
        let out = self
            .ceph(&["osd", "pool", "ls", "detail", "--format", "json"])
            .await?;
        if !out.success {
            return Err(Self::classify(&out, pool, CephixError::PoolNotFound));
        }
        let json = out.json()?;
        json.as_array()
            .and_then(|pools| {
                pools.iter().find_map(|p| {
                    (p["pool_name"].as_str() == Some(pool)).then(|| p["pool_id"].as_i64())?
                })
            })
            .ok_or_else(|| CephixError::PoolNotFound(pool.to_string()))
    }

    async fn pool_name(&self, pool_id: i64) -> Result<String> {
        let out = self
            .ceph(&["osd", "pool", "ls", "detail", "--format", "json"])
            .await?;
        if !out.success {
            return Err(Self::classify(&out, "pools", CephixError::PoolNotFound));
        }
        let json = out.json()?;
        json.as_array()
            .and_then(|pools| {
                pools.iter().find_map(|p| {
                    (p["pool_id"].as_i64() == Some(pool_id))
                        .then(|| p["pool_name"].as_str().map(str::to_string))?
                })
            })
            .ok_or_else(|| CephixError::PoolNotFound(format!("id {pool_id}")))
    }

    async fn blocklist_add(&self, addr: &str) -> Result<()> {
        let out = self.ceph(&["osd", "blocklist", "add", addr]).await?;
        if !out.success {
            return Err(Self::classify(&out, addr, CephixError::KeyNotFound));
        }
        Ok(())
    }

    async fn blocklist_remove(&self, addr: &str) -> Result<()> {
        let out = self.ceph(&["osd", "blocklist", "rm", addr]).await?;
        if !out.success && !out.stderr_has("ENOENT") {
            return Err(Self::classify(&out, addr, CephixError::KeyNotFound));
        }
        Ok(())
    }

    async fn blocklist_list(&self) -> Result<Vec<BlocklistEntry>> {
        let out = self
            .ceph(&["osd", "blocklist", "ls", "--format", "json"])
            .await?;
        if !out.success {
            return Err(Self::classify(&out, "blocklist", CephixError::KeyNotFound));
        }
        let json = out.json()?;
        Ok(json
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| {
                        e["addr"].as_str().map(|addr| BlocklistEntry {
                            addr: addr.to_string(),
                            until: e["until"].as_str().map(str::to_string),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl CephAdmin for CephCli {
    fn omap(&self) -> &dyn OmapStore {
        self
    }
    fn fs(&self) -> &dyn FsAdmin {
        self
    }
    fn rbd(&self) -> &dyn RbdAdmin {
        self
    }
    fn nfs(&self) -> &dyn NfsAdmin {
        self
    }
    fn osd(&self) -> &dyn OsdAdmin {
        self
    }
}

/// Factory installing [`CephCli`] handles into the connection pool.
#[derive(Debug, Default)]
pub struct CliAdminFactory;

#[async_trait]
impl AdminFactory for CliAdminFactory {
    async fn connect(
        &self,
        monitors: &str,
        creds: &Credentials,
    ) -> Result<std::sync::Arc<dyn CephAdmin>> {
        let cli = CephCli::new(monitors, creds)?;
        Ok(std::sync::Arc::new(cli))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_spec_without_namespace() {
        assert_eq!(CephCli::image_spec("rbd", "", "vol-1"), "rbd/vol-1");
    }

    #[test]
    fn test_image_spec_with_namespace() {
        assert_eq!(
            CephCli::image_spec("rbd", "tenant1", "vol-1"),
            "rbd/tenant1/vol-1"
        );
        assert_eq!(
            CephCli::snap_spec("rbd", "tenant1", "vol-1", "s1"),
            "rbd/tenant1/vol-1@s1"
        );
    }

    #[test]
    fn test_parse_ceph_timestamp() {
        let parsed = parse_ceph_timestamp("2024-03-01 10:20:30.123456").unwrap();
        assert_eq!(parsed.timestamp(), 1709288430);
        assert!(parse_ceph_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_classify_enoent() {
        let out = CmdOutput {
            success: false,
            stdout: String::new(),
            stderr: "Error ENOENT: subvolume 'x' does not exist".to_string(),
        };
        assert!(matches!(
            CephCli::classify(&out, "x", CephixError::VolumeNotFound),
            CephixError::VolumeNotFound(_)
        ));
    }

    #[test]
    fn test_classify_invalid_command() {
        let out = CmdOutput {
            success: false,
            stdout: String::new(),
            stderr: "no valid command found; 10 closest matches: ...".to_string(),
        };
        assert!(matches!(
            CephCli::classify(&out, "x", CephixError::VolumeNotFound),
            CephixError::InvalidCommand(_)
        ));
    }
}
