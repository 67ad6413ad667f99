//! RADOS omap journal.
//!
//! The journal binds CO-supplied request names to backend artifacts through
//! two omap objects per entity:
//!
//! - the *directory* object holds `name key -> UUID` entries, one per
//!   request name;
//! - the per-UUID object holds the attributes of the reservation, including
//!   the derived backend name.
//!
//! Entries are created directory-first and deleted UUID-first. A crash
//! between the two writes leaves a half-reservation that the next access to
//! the same request name detects and garbage-collects; no cross-object
//! transaction is ever required.

use std::collections::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::admin::OmapStore;
use crate::error::{CephixError, Result};

// Attribute keys inside a per-UUID omap object.
const ATTR_REQUEST_NAME: &str = "csi.volname";
const ATTR_BACKEND_NAME: &str = "csi.imagename";
const ATTR_NAME_PREFIX: &str = "csi.nameprefix";
const ATTR_PARENT_NAME: &str = "csi.parent";
const ATTR_ENCRYPTION_KMS: &str = "csi.volume.encryptKMS";
const ATTR_CLUSTER_NAME: &str = "csi.clustername";
const ATTR_FLATTEN_MODE: &str = "csi.imageflattenmode";

const GROUP_MAPPING_PREFIX: &str = "csi.mapping.";

/// Attributes stored under a reservation UUID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalAttrs {
    pub request_name: String,
    pub backend_name: String,
    pub name_prefix: String,
    pub parent_name: Option<String>,
    pub encryption_kms: Option<String>,
    pub cluster_name: Option<String>,
    pub flatten_mode: Option<String>,
}

impl JournalAttrs {
    fn to_pairs(&self) -> HashMap<String, String> {
        let mut pairs = HashMap::new();
        pairs.insert(ATTR_REQUEST_NAME.to_string(), self.request_name.clone());
        pairs.insert(ATTR_BACKEND_NAME.to_string(), self.backend_name.clone());
        pairs.insert(ATTR_NAME_PREFIX.to_string(), self.name_prefix.clone());
        if let Some(parent) = &self.parent_name {
            pairs.insert(ATTR_PARENT_NAME.to_string(), parent.clone());
        }
        if let Some(kms) = &self.encryption_kms {
            pairs.insert(ATTR_ENCRYPTION_KMS.to_string(), kms.clone());
        }
        if let Some(name) = &self.cluster_name {
            pairs.insert(ATTR_CLUSTER_NAME.to_string(), name.clone());
        }
        if let Some(mode) = &self.flatten_mode {
            pairs.insert(ATTR_FLATTEN_MODE.to_string(), mode.clone());
        }
        pairs
    }

    fn from_pairs(pairs: &HashMap<String, String>) -> Self {
        Self {
            request_name: pairs.get(ATTR_REQUEST_NAME).cloned().unwrap_or_default(),
            backend_name: pairs.get(ATTR_BACKEND_NAME).cloned().unwrap_or_default(),
            name_prefix: pairs.get(ATTR_NAME_PREFIX).cloned().unwrap_or_default(),
            parent_name: pairs.get(ATTR_PARENT_NAME).cloned(),
            encryption_kms: pairs.get(ATTR_ENCRYPTION_KMS).cloned(),
            cluster_name: pairs.get(ATTR_CLUSTER_NAME).cloned(),
            flatten_mode: pairs.get(ATTR_FLATTEN_MODE).cloned(),
        }
    }
}

/// A reservation resolved from the journal.
#[derive(Debug, Clone)]
pub struct ReservationData {
    /// UUID allocated at reservation time (32-char hex).
    pub uuid: String,
    /// Backend artifact name, `<prefix>-<uuid>`.
    pub backend_name: String,
    pub attrs: JournalAttrs,
}

/// Parameters of a new reservation.
#[derive(Debug, Clone, Default)]
pub struct ReserveRequest<'a> {
    pub request_name: &'a str,
    pub name_prefix: &'a str,
    pub parent_name: Option<&'a str>,
    pub encryption_kms: Option<&'a str>,
    pub cluster_name: Option<&'a str>,
    pub flatten_mode: Option<&'a str>,
    /// Reuse an already-allocated UUID instead of generating one (used when
    /// the object id was fixed by an earlier reservation, e.g. mirrored
    /// volumes).
    pub reserved_id: Option<&'a str>,
}

/// One journal namespace (volumes, snapshots or groups) inside a pool.
#[derive(Debug, Clone)]
pub struct Journal {
    /// Object holding the `request name -> UUID` directory.
    csi_dir: String,
    /// Key prefix inside the directory object.
    name_key_prefix: String,
    /// Object-name prefix of per-UUID attribute objects.
    obj_prefix: String,
}

impl Journal {
    /// Journal for volumes (`csi.volumes.default` / `csi.volume.<uuid>`).
    pub fn volumes() -> Self {
        Self {
            csi_dir: "csi.volumes.default".to_string(),
            name_key_prefix: "csi.volume.".to_string(),
            obj_prefix: "csi.volume.".to_string(),
        }
    }

    /// Journal for snapshots (`csi.snaps.default` / `csi.snap.<uuid>`).
    pub fn snapshots() -> Self {
        Self {
            csi_dir: "csi.snaps.default".to_string(),
            name_key_prefix: "csi.snap.".to_string(),
            obj_prefix: "csi.snap.".to_string(),
        }
    }

    /// Journal for volume groups (`csi.groups.default` / `csi.group.<uuid>`).
    pub fn groups() -> Self {
        Self {
            csi_dir: "csi.groups.default".to_string(),
            name_key_prefix: "csi.group.".to_string(),
            obj_prefix: "csi.group.".to_string(),
        }
    }

    fn name_key(&self, request_name: &str) -> String {
        format!("{}{}", self.name_key_prefix, request_name)
    }

    fn uuid_oid(&self, uuid: &str) -> String {
        format!("{}{}", self.obj_prefix, uuid)
    }

    /// Look up an existing reservation for `request_name`.
    ///
    /// Returns `None` when no reservation exists. A directory entry whose
    /// UUID object is missing is a stale leftover from a crashed
    /// reservation and is garbage-collected here. A parent mismatch between
    /// the stored reservation and `parent_name` means the CO reused a
    /// request name with a different content source, which is rejected.
    pub async fn check_reservation(
        &self,
        omap: &dyn OmapStore,
        pool: &str,
        namespace: &str,
        request_name: &str,
        parent_name: Option<&str>,
    ) -> Result<Option<ReservationData>> {
        let name_key = self.name_key(request_name);
        let dir_entries = omap
            .get_keys(pool, namespace, &self.csi_dir, &[name_key.clone()])
            .await?;
        let uuid = match dir_entries.get(&name_key) {
            Some(uuid) => uuid.clone(),
            None => return Ok(None),
        };

        let attrs_pairs = omap
            .list_keys(pool, namespace, &self.uuid_oid(&uuid))
            .await?;
        if attrs_pairs.is_empty() {
            // Forward half of a crashed reservation; collect it and report
            // the name as free.
            warn!(
                request_name = %request_name,
                uuid = %uuid,
                "garbage-collecting stale journal entry"
            );
            omap.remove_keys(pool, namespace, &self.csi_dir, &[name_key])
                .await?;
            return Ok(None);
        }

        let attrs = JournalAttrs::from_pairs(&attrs_pairs);
        if attrs.parent_name.as_deref() != parent_name {
            return Err(CephixError::InvalidArgument(format!(
                "request {request_name} exists with a different content source \
                 ({:?} != {:?})",
                attrs.parent_name, parent_name
            )));
        }

        let backend_name = if attrs.backend_name.is_empty() {
            format!("{}-{}", attrs.name_prefix, uuid)
        } else {
            attrs.backend_name.clone()
        };

        Ok(Some(ReservationData {
            uuid,
            backend_name,
            attrs,
        }))
    }

    /// Reserve `request_name`, allocating a UUID and writing both omap
    /// halves in directory-first order.
    pub async fn reserve_name(
        &self,
        omap: &dyn OmapStore,
        pool: &str,
        namespace: &str,
        req: &ReserveRequest<'_>,
    ) -> Result<ReservationData> {
        let uuid = match req.reserved_id {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().simple().to_string(),
        };
        let backend_name = format!("{}-{}", req.name_prefix, uuid);

        let mut dir_entry = HashMap::new();
        dir_entry.insert(self.name_key(req.request_name), uuid.clone());
        omap.set_keys(pool, namespace, &self.csi_dir, &dir_entry)
            .await?;

        let attrs = JournalAttrs {
            request_name: req.request_name.to_string(),
            backend_name: backend_name.clone(),
            name_prefix: req.name_prefix.to_string(),
            parent_name: req.parent_name.map(str::to_string),
            encryption_kms: req.encryption_kms.map(str::to_string),
            cluster_name: req.cluster_name.map(str::to_string),
            flatten_mode: req.flatten_mode.map(str::to_string),
        };
        omap.set_keys(pool, namespace, &self.uuid_oid(&uuid), &attrs.to_pairs())
            .await?;

        debug!(
            request_name = %req.request_name,
            uuid = %uuid,
            backend_name = %backend_name,
            "reserved journal entry"
        );

        Ok(ReservationData {
            uuid,
            backend_name,
            attrs,
        })
    }

    /// Remove a reservation, UUID object first so a crash can only leave
    /// the collectable directory half behind. Both removals are idempotent.
    pub async fn undo_reservation(
        &self,
        omap: &dyn OmapStore,
        pool: &str,
        namespace: &str,
        request_name: &str,
        uuid: &str,
    ) -> Result<()> {
        omap.remove_object(pool, namespace, &self.uuid_oid(uuid))
            .await?;
        omap.remove_keys(pool, namespace, &self.csi_dir, &[self.name_key(request_name)])
            .await?;
        debug!(request_name = %request_name, uuid = %uuid, "undid journal reservation");
        Ok(())
    }

    /// Read the attributes of a reservation by UUID; `KeyNotFound` when the
    /// UUID object does not exist (orphaned handle).
    pub async fn get_attributes(
        &self,
        omap: &dyn OmapStore,
        pool: &str,
        namespace: &str,
        uuid: &str,
    ) -> Result<JournalAttrs> {
        let pairs = omap.list_keys(pool, namespace, &self.uuid_oid(uuid)).await?;
        if pairs.is_empty() {
            return Err(CephixError::KeyNotFound(format!(
                "no journal entry for uuid {uuid}"
            )));
        }
        Ok(JournalAttrs::from_pairs(&pairs))
    }

    /// Store a single attribute under a reservation UUID.
    pub async fn store_attribute(
        &self,
        omap: &dyn OmapStore,
        pool: &str,
        namespace: &str,
        uuid: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let mut pairs = HashMap::new();
        pairs.insert(key.to_string(), value.to_string());
        omap.set_keys(pool, namespace, &self.uuid_oid(uuid), &pairs)
            .await
    }

    /// Fetch a single attribute; `KeyNotFound` when absent.
    pub async fn fetch_attribute(
        &self,
        omap: &dyn OmapStore,
        pool: &str,
        namespace: &str,
        uuid: &str,
        key: &str,
    ) -> Result<String> {
        let pairs = omap
            .get_keys(pool, namespace, &self.uuid_oid(uuid), &[key.to_string()])
            .await?;
        pairs
            .get(key)
            .cloned()
            .ok_or_else(|| CephixError::KeyNotFound(format!("attribute {key} of uuid {uuid}")))
    }

    // =========================================================================
    // GROUP MEMBER MAPPING
    // =========================================================================

    /// Record `volume id -> snapshot id` member mappings under a group
    /// UUID. Members accumulate monotonically until the group completes.
    pub async fn add_volumes_mapping(
        &self,
        omap: &dyn OmapStore,
        pool: &str,
        namespace: &str,
        group_uuid: &str,
        mapping: &HashMap<String, String>,
    ) -> Result<()> {
        let pairs = mapping
            .iter()
            .map(|(vol, snap)| (format!("{GROUP_MAPPING_PREFIX}{vol}"), snap.clone()))
            .collect();
        omap.set_keys(pool, namespace, &self.uuid_oid(group_uuid), &pairs)
            .await
    }

    /// Remove member mappings from a group.
    pub async fn remove_volumes_mapping(
        &self,
        omap: &dyn OmapStore,
        pool: &str,
        namespace: &str,
        group_uuid: &str,
        volume_ids: &[String],
    ) -> Result<()> {
        let keys: Vec<String> = volume_ids
            .iter()
            .map(|vol| format!("{GROUP_MAPPING_PREFIX}{vol}"))
            .collect();
        omap.remove_keys(pool, namespace, &self.uuid_oid(group_uuid), &keys)
            .await
    }

    /// Read the member mapping of a group.
    pub async fn get_volumes_mapping(
        &self,
        omap: &dyn OmapStore,
        pool: &str,
        namespace: &str,
        group_uuid: &str,
    ) -> Result<HashMap<String, String>> {
        let pairs = omap
            .list_keys(pool, namespace, &self.uuid_oid(group_uuid))
            .await?;
        Ok(pairs
            .into_iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(GROUP_MAPPING_PREFIX)
                    .map(|vol| (vol.to_string(), v))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;

    const POOL: &str = "cephfs-metadata";
    const NS: &str = "";

    #[tokio::test]
    async fn test_reserve_check_undo_round_trip() {
        let cluster = MockCluster::new();
        let journal = Journal::volumes();

        let reserved = journal
            .reserve_name(
                &cluster,
                POOL,
                NS,
                &ReserveRequest {
                    request_name: "pvc-a",
                    name_prefix: "csi-vol",
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(reserved.backend_name, format!("csi-vol-{}", reserved.uuid));

        let checked = journal
            .check_reservation(&cluster, POOL, NS, "pvc-a", None)
            .await
            .unwrap()
            .expect("reservation must be visible");
        assert_eq!(checked.uuid, reserved.uuid);
        assert_eq!(checked.backend_name, reserved.backend_name);
        assert_eq!(checked.attrs.request_name, "pvc-a");

        journal
            .undo_reservation(&cluster, POOL, NS, "pvc-a", &reserved.uuid)
            .await
            .unwrap();
        assert!(journal
            .check_reservation(&cluster, POOL, NS, "pvc-a", None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_stale_directory_entry_is_collected() {
        let cluster = MockCluster::new();
        let journal = Journal::volumes();

        // Simulate a crash between the directory write and the attribute
        // write: only the name -> UUID half exists.
        let mut dir = HashMap::new();
        dir.insert("csi.volume.pvc-b".to_string(), "deadbeef".to_string());
        cluster
            .set_keys(POOL, NS, "csi.volumes.default", &dir)
            .await
            .unwrap();

        // First access collects the orphan and reports the name free.
        assert!(journal
            .check_reservation(&cluster, POOL, NS, "pvc-b", None)
            .await
            .unwrap()
            .is_none());
        let dir_now = cluster
            .list_keys(POOL, NS, "csi.volumes.default")
            .await
            .unwrap();
        assert!(!dir_now.contains_key("csi.volume.pvc-b"));

        // And the name is reusable.
        let reserved = journal
            .reserve_name(
                &cluster,
                POOL,
                NS,
                &ReserveRequest {
                    request_name: "pvc-b",
                    name_prefix: "csi-vol",
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_ne!(reserved.uuid, "deadbeef");
    }

    #[tokio::test]
    async fn test_parent_mismatch_rejected() {
        let cluster = MockCluster::new();
        let journal = Journal::snapshots();

        journal
            .reserve_name(
                &cluster,
                POOL,
                NS,
                &ReserveRequest {
                    request_name: "snap-1",
                    name_prefix: "csi-snap",
                    parent_name: Some("csi-vol-abc"),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Same name, same parent: fine.
        assert!(journal
            .check_reservation(&cluster, POOL, NS, "snap-1", Some("csi-vol-abc"))
            .await
            .unwrap()
            .is_some());

        // Same name, different parent: rejected.
        assert!(matches!(
            journal
                .check_reservation(&cluster, POOL, NS, "snap-1", Some("csi-vol-zzz"))
                .await,
            Err(CephixError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_reserved_id_is_respected() {
        let cluster = MockCluster::new();
        let journal = Journal::volumes();

        let reserved = journal
            .reserve_name(
                &cluster,
                POOL,
                NS,
                &ReserveRequest {
                    request_name: "pvc-c",
                    name_prefix: "csi-vol",
                    reserved_id: Some("0123456789abcdef0123456789abcdef"),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(reserved.uuid, "0123456789abcdef0123456789abcdef");
    }

    #[tokio::test]
    async fn test_attributes_and_single_attribute_io() {
        let cluster = MockCluster::new();
        let journal = Journal::volumes();

        let reserved = journal
            .reserve_name(
                &cluster,
                POOL,
                NS,
                &ReserveRequest {
                    request_name: "pvc-d",
                    name_prefix: "csi-vol",
                    encryption_kms: Some("vault"),
                    cluster_name: Some("east"),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let attrs = journal
            .get_attributes(&cluster, POOL, NS, &reserved.uuid)
            .await
            .unwrap();
        assert_eq!(attrs.encryption_kms.as_deref(), Some("vault"));
        assert_eq!(attrs.cluster_name.as_deref(), Some("east"));

        journal
            .store_attribute(&cluster, POOL, NS, &reserved.uuid, "csi.nfscluster", "nfs1")
            .await
            .unwrap();
        let fetched = journal
            .fetch_attribute(&cluster, POOL, NS, &reserved.uuid, "csi.nfscluster")
            .await
            .unwrap();
        assert_eq!(fetched, "nfs1");

        assert!(matches!(
            journal
                .fetch_attribute(&cluster, POOL, NS, &reserved.uuid, "missing")
                .await,
            Err(CephixError::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_group_mapping() {
        let cluster = MockCluster::new();
        let journal = Journal::groups();
        let group = "11112222333344445555666677778888";

        let mut mapping = HashMap::new();
        mapping.insert("vol-1".to_string(), "snap-1".to_string());
        mapping.insert("vol-2".to_string(), "snap-2".to_string());
        journal
            .add_volumes_mapping(&cluster, POOL, NS, group, &mapping)
            .await
            .unwrap();

        let stored = journal
            .get_volumes_mapping(&cluster, POOL, NS, group)
            .await
            .unwrap();
        assert_eq!(stored, mapping);

        journal
            .remove_volumes_mapping(&cluster, POOL, NS, group, &["vol-1".to_string()])
            .await
            .unwrap();
        let stored = journal
            .get_volumes_mapping(&cluster, POOL, NS, group)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored.get("vol-2").map(String::as_str), Some("snap-2"));
    }
}
