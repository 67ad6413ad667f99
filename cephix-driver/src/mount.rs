//! Mount primitives used by the node plugin.
//!
//! The control plane only decides *what* to mount where; the actual
//! `mount`/`umount`/`rbd device map`/`fstrim` invocations live behind the
//! [`Mounter`] trait so the node service can be exercised against the
//! recording mock.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tokio::process::Command;
use tracing::{debug, info, warn};

use cephix_core::{CephixError, Result};

// Mountpoint -> ceph-fuse daemon PID, consulted on unmount to reap the
// daemon. Guarded by a mutex; lives for the process.
static FUSE_PIDS: Lazy<Mutex<HashMap<String, u32>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Mount operations the node service depends on.
#[async_trait]
pub trait Mounter: Send + Sync {
    /// Mount a CephFS path (kernel client or FUSE).
    async fn mount_cephfs(
        &self,
        mon_host: &str,
        path: &str,
        target: &str,
        options: &[String],
        fuse: bool,
        user: &str,
        keyfile: &Path,
    ) -> Result<()>;

    /// Map an RBD image and return the block device path.
    async fn map_rbd(
        &self,
        mon_host: &str,
        pool: &str,
        namespace: &str,
        image: &str,
        user: &str,
        keyfile: &Path,
    ) -> Result<String>;

    /// Unmap an RBD device.
    async fn unmap_rbd(&self, device: &str) -> Result<()>;

    /// Mount a block device with a filesystem.
    async fn mount_device(&self, device: &str, target: &str, fs_type: &str, options: &[String])
        -> Result<()>;

    /// Bind-mount a staged path into the container target.
    async fn bind_mount(&self, source: &str, target: &str, readonly: bool) -> Result<()>;

    /// Unmount a path (and reap a FUSE daemon if one served it).
    async fn unmount(&self, target: &str) -> Result<()>;

    /// Trim unused blocks of a mounted filesystem.
    async fn fstrim(&self, path: &str) -> Result<()>;
}

/// Production mounter shelling out to the system tools.
#[derive(Debug, Default)]
pub struct SystemMounter;

impl SystemMounter {
    async fn run(program: &str, args: &[String]) -> Result<String> {
        debug!(command = %program, args = ?args, "executing mount command");
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| CephixError::ExecFailed(format!("failed to execute {program}: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CephixError::ExecFailed(format!(
                "{program} failed: {}",
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl Mounter for SystemMounter {
    async fn mount_cephfs(
        &self,
        mon_host: &str,
        path: &str,
        target: &str,
        options: &[String],
        fuse: bool,
        user: &str,
        keyfile: &Path,
    ) -> Result<()> {
        tokio::fs::create_dir_all(target)
            .await
            .map_err(|e| CephixError::Internal(format!("failed to create {target}: {e}")))?;

        if fuse {
            let mut args = vec![
                "-m".to_string(),
                mon_host.to_string(),
                "--id".to_string(),
                user.to_string(),
                "--keyfile".to_string(),
                keyfile.to_string_lossy().to_string(),
                "-r".to_string(),
                path.to_string(),
                target.to_string(),
            ];
            for option in options {
                args.push("-o".to_string());
                args.push(option.clone());
            }
            Self::run("ceph-fuse", &args).await?;

            // ceph-fuse daemonises; remember its PID so unmount can reap it.
            if let Ok(pid_out) = Self::run("pgrep", &["-f".to_string(), format!("ceph-fuse.*{target}")]).await
            {
                if let Ok(pid) = pid_out.trim().lines().next().unwrap_or("").parse::<u32>() {
                    FUSE_PIDS
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(target.to_string(), pid);
                }
            }
        } else {
            let source = format!("{mon_host}:{path}");
            let mut option_list = vec![
                format!("name={user}"),
                format!("secretfile={}", keyfile.to_string_lossy()),
            ];
            option_list.extend(options.iter().cloned());
            let args = vec![
                "-t".to_string(),
                "ceph".to_string(),
                source,
                target.to_string(),
                "-o".to_string(),
                option_list.join(","),
            ];
            Self::run("mount", &args).await?;
        }
        info!(target = %target, fuse, "cephfs mounted");
        Ok(())
    }

    async fn map_rbd(
        &self,
        mon_host: &str,
        pool: &str,
        namespace: &str,
        image: &str,
        user: &str,
        keyfile: &Path,
    ) -> Result<String> {
        let spec = if namespace.is_empty() {
            format!("{pool}/{image}")
        } else {
            format!("{pool}/{namespace}/{image}")
        };
        let args = vec![
            "device".to_string(),
            "map".to_string(),
            spec,
            "-m".to_string(),
            mon_host.to_string(),
            "--id".to_string(),
            user.to_string(),
            "--keyfile".to_string(),
            keyfile.to_string_lossy().to_string(),
        ];
        let device = Self::run("rbd", &args).await?.trim().to_string();
        info!(device = %device, image = %image, "rbd image mapped");
        Ok(device)
    }

    async fn unmap_rbd(&self, device: &str) -> Result<()> {
        Self::run(
            "rbd",
            &["device".to_string(), "unmap".to_string(), device.to_string()],
        )
        .await
        .map(|_| ())
    }

    async fn mount_device(
        &self,
        device: &str,
        target: &str,
        fs_type: &str,
        options: &[String],
    ) -> Result<()> {
        tokio::fs::create_dir_all(target)
            .await
            .map_err(|e| CephixError::Internal(format!("failed to create {target}: {e}")))?;
        let mut args = vec![device.to_string(), target.to_string()];
        if !fs_type.is_empty() {
            args.insert(0, fs_type.to_string());
            args.insert(0, "-t".to_string());
        }
        if !options.is_empty() {
            args.push("-o".to_string());
            args.push(options.join(","));
        }
        Self::run("mount", &args).await.map(|_| ())
    }

    async fn bind_mount(&self, source: &str, target: &str, readonly: bool) -> Result<()> {
        tokio::fs::create_dir_all(target)
            .await
            .map_err(|e| CephixError::Internal(format!("failed to create {target}: {e}")))?;
        Self::run(
            "mount",
            &[
                "--bind".to_string(),
                source.to_string(),
                target.to_string(),
            ],
        )
        .await?;
        if readonly {
            Self::run(
                "mount",
                &[
                    "-o".to_string(),
                    "remount,ro,bind".to_string(),
                    target.to_string(),
                ],
            )
            .await?;
        }
        Ok(())
    }

    async fn unmount(&self, target: &str) -> Result<()> {
        Self::run("umount", &[target.to_string()]).await?;

        let pid = FUSE_PIDS
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(target);
        if let Some(pid) = pid {
            // Best effort; the daemon usually exits with the unmount.
            if let Err(e) = Self::run("kill", &[pid.to_string()]).await {
                warn!(pid, error = %e, "failed to reap ceph-fuse daemon");
            }
        }
        Ok(())
    }

    async fn fstrim(&self, path: &str) -> Result<()> {
        Self::run("fstrim", &[path.to_string()]).await.map(|_| ())
    }
}

/// Recording mounter for tests: every call is appended to `calls` and
/// succeeds.
#[derive(Debug, Default)]
pub struct MockMounter {
    pub calls: Mutex<Vec<String>>,
}

impl MockMounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }

    pub fn recorded(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Mounter for MockMounter {
    async fn mount_cephfs(
        &self,
        mon_host: &str,
        path: &str,
        target: &str,
        _options: &[String],
        fuse: bool,
        _user: &str,
        _keyfile: &Path,
    ) -> Result<()> {
        self.record(format!("mount_cephfs {mon_host}:{path} -> {target} fuse={fuse}"));
        Ok(())
    }

    async fn map_rbd(
        &self,
        _mon_host: &str,
        pool: &str,
        namespace: &str,
        image: &str,
        _user: &str,
        _keyfile: &Path,
    ) -> Result<String> {
        self.record(format!("map_rbd {pool}/{namespace}/{image}"));
        Ok(format!("/dev/rbd/{pool}/{image}"))
    }

    async fn unmap_rbd(&self, device: &str) -> Result<()> {
        self.record(format!("unmap_rbd {device}"));
        Ok(())
    }

    async fn mount_device(
        &self,
        device: &str,
        target: &str,
        fs_type: &str,
        _options: &[String],
    ) -> Result<()> {
        self.record(format!("mount_device {device} -> {target} ({fs_type})"));
        Ok(())
    }

    async fn bind_mount(&self, source: &str, target: &str, readonly: bool) -> Result<()> {
        self.record(format!("bind_mount {source} -> {target} ro={readonly}"));
        Ok(())
    }

    async fn unmount(&self, target: &str) -> Result<()> {
        self.record(format!("unmount {target}"));
        Ok(())
    }

    async fn fstrim(&self, path: &str) -> Result<()> {
        self.record(format!("fstrim {path}"));
        Ok(())
    }
}
