//! # Cephix Core
//!
//! Control-plane library of the Cephix CSI driver.
//!
//! This crate provides everything between the gRPC facade and the Ceph
//! cluster: configuration, credentials, pooled connections, the omap
//! journal that makes provisioning idempotent, per-identifier operation
//! locks, and the managers that drive CephFS subvolumes, RBD images,
//! snapshots, clones, group snapshots, NFS exports and network fencing.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    CSI facade (daemon)                   │
//! │   validation · locks · journal · managers · translator   │
//! └────────────────────────────┬─────────────────────────────┘
//!                              │  admin traits
//!              ┌───────────────┴───────────────┐
//!              ▼                               ▼
//!     ┌─────────────────┐             ┌─────────────────┐
//!     │     CephCli     │             │   MockCluster   │
//!     │ (ceph/rbd/rados │             │   (in-memory,   │
//!     │    tooling)     │             │     tests)      │
//!     └─────────────────┘             └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cephix_core::{ClusterRegistry, ConnectionPool, CliAdminFactory, Credentials};
//!
//! let registry = ClusterRegistry::load("/etc/ceph-csi-config/config.json")?;
//! let pool = ConnectionPool::new(std::sync::Arc::new(CliAdminFactory));
//! let creds = Credentials::from_admin_secrets(&secrets)?;
//! let conn = pool.connect(&registry.get("c1")?.mon_host(), &creds).await?;
//! ```

pub mod admin;
pub mod cephfs;
pub mod cli;
pub mod clone;
pub mod config;
pub mod conn;
pub mod credentials;
pub mod error;
pub mod fence;
pub mod group;
pub mod ident;
pub mod journal;
pub mod locks;
pub mod mock;
pub mod nfs;
pub mod rbd;
pub mod reftracker;
pub mod snapshot;
pub mod types;

pub use admin::{
    BlocklistEntry, CephAdmin, FilesystemInfo, FsAdmin, MirrorImageInfo, MirrorImageStatus,
    NfsAdmin, OmapStore, OsdAdmin, RbdAdmin, RbdImageInfo, RbdSnapInfo, RbdSnapSpec,
    SubvolumeInfo, SubvolumeSnapshotInfo,
};
pub use cephfs::{reset_cluster_cache, ResizeSupport, SubvolumeManager};
pub use cli::{CephCli, CliAdminFactory};
pub use clone::CloneOrchestrator;
pub use config::{ClusterInfo, ClusterRegistry, DEFAULT_CLUSTER_CONFIG_PATH};
pub use conn::{AdminFactory, Connection, ConnectionPool};
pub use credentials::Credentials;
pub use error::{CephixError, Result};
pub use fence::NetworkFence;
pub use group::{GroupMember, GroupSnapshotEngine, GroupSnapshotResult, MemberSnapshot};
pub use ident::{CsiIdentifier, IDENT_VERSION};
pub use journal::{Journal, JournalAttrs, ReservationData, ReserveRequest};
pub use locks::{OpClass, OperationLocks, VolumeLocks};
pub use mock::MockCluster;
pub use nfs::NfsExporter;
pub use rbd::mirror::{
    parse_last_sync_info, parse_replication_params, resync_ready, MirrorManager,
    ReplicationConfig,
};
pub use rbd::{FlattenMode, RbdManager};
pub use reftracker::{RefTracker, SnapshotRefs};
pub use snapshot::{CephFsSnapshots, RbdSnapshots, SnapshotEngine, SnapshotStatus};
pub use types::{
    round_up_to_grain, BackendKind, CloneState, LastSyncInfo, MirrorMode, MirrorSchedule,
    MirrorSiteStatus, MirrorState, QuiesceState, SnapshotIdentifier, VolumeIdentifier,
    VolumeOptions, CEPHFS_SIZE_GRAIN,
};
