//! Composite CSI identifier codec.
//!
//! Volume and snapshot handles given to the container orchestrator are
//! opaque printable strings that the driver alone can decode back into
//! `(version, cluster ID, location ID, object UUID)`. The layout is fixed:
//!
//! ```text
//! vvvv-llll-<cluster id>-pppppppppppppppp-uuuuuuuuuuuuuuuuuuuuuuuuuuuuuuuu
//! ```
//!
//! where `vvvv` is the codec version in hex, `llll` the cluster-id length in
//! hex (cluster ids may themselves contain dashes, hence the prefix),
//! `pppp…` the 64-bit location id (pool or filesystem id) in hex and the
//! trailing 32 hex chars the object UUID.

use std::fmt;

use uuid::Uuid;

use crate::error::{CephixError, Result};

/// Current (and only) identifier layout version.
pub const IDENT_VERSION: u16 = 1;

const LOCATION_HEX_LEN: usize = 16;
const UUID_HEX_LEN: usize = 32;

/// Decoded form of a CSI volume or snapshot handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsiIdentifier {
    /// Codec version the handle was encoded with.
    pub version: u16,
    /// Cluster the object lives in, as configured in the cluster map.
    pub cluster_id: String,
    /// Pool id (RBD) or filesystem id (CephFS) holding the object.
    pub location_id: i64,
    /// UUID allocated by the journal at reservation time.
    pub object_uuid: String,
}

impl CsiIdentifier {
    /// Build an identifier for a freshly reserved object.
    pub fn new(cluster_id: impl Into<String>, location_id: i64, object_uuid: impl Into<String>) -> Self {
        Self {
            version: IDENT_VERSION,
            cluster_id: cluster_id.into(),
            location_id,
            object_uuid: object_uuid.into(),
        }
    }

    /// Serialise into the printable wire form handed to the CO.
    pub fn encode(&self) -> Result<String> {
        if self.cluster_id.is_empty() || self.cluster_id.len() > 0xffff {
            return Err(CephixError::InvalidArgument(format!(
                "cluster id {:?} cannot be encoded",
                self.cluster_id
            )));
        }
        let uuid = normalize_uuid(&self.object_uuid)?;
        Ok(format!(
            "{:04x}-{:04x}-{}-{:016x}-{}",
            self.version,
            self.cluster_id.len(),
            self.cluster_id,
            self.location_id as u64,
            uuid,
        ))
    }

    /// Parse a handle received from the CO.
    ///
    /// Unknown layout versions are rejected so that a newer driver release
    /// can change the format without older replicas mis-parsing it.
    pub fn decode(encoded: &str) -> Result<Self> {
        let err = || CephixError::InvalidArgument(format!("invalid VolumeID {encoded}"));

        let version_str = encoded.get(0..4).ok_or_else(err)?;
        let version = u16::from_str_radix(version_str, 16).map_err(|_| err())?;
        if version != IDENT_VERSION {
            return Err(err());
        }

        if encoded.as_bytes().get(4) != Some(&b'-') {
            return Err(err());
        }
        let len_str = encoded.get(5..9).ok_or_else(err)?;
        let cluster_len = usize::from_str_radix(len_str, 16).map_err(|_| err())?;
        if cluster_len == 0 {
            return Err(err());
        }

        if encoded.as_bytes().get(9) != Some(&b'-') {
            return Err(err());
        }
        let cluster_id = encoded.get(10..10 + cluster_len).ok_or_else(err)?.to_string();

        let loc_start = 10 + cluster_len + 1;
        if encoded.as_bytes().get(loc_start - 1) != Some(&b'-') {
            return Err(err());
        }
        let loc_str = encoded.get(loc_start..loc_start + LOCATION_HEX_LEN).ok_or_else(err)?;
        let location_id = u64::from_str_radix(loc_str, 16).map_err(|_| err())? as i64;

        let uuid_start = loc_start + LOCATION_HEX_LEN + 1;
        if encoded.as_bytes().get(uuid_start - 1) != Some(&b'-') {
            return Err(err());
        }
        let uuid_str = encoded.get(uuid_start..).ok_or_else(err)?;
        if uuid_str.len() != UUID_HEX_LEN || encoded.len() != uuid_start + UUID_HEX_LEN {
            return Err(err());
        }
        let object_uuid = normalize_uuid(uuid_str)?;

        Ok(Self {
            version,
            cluster_id,
            location_id,
            object_uuid,
        })
    }
}

impl fmt::Display for CsiIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.cluster_id, self.location_id, self.object_uuid
        )
    }
}

/// Accepts a UUID with or without dashes and returns the 32-char hex form.
fn normalize_uuid(raw: &str) -> Result<String> {
    Uuid::parse_str(raw)
        .map(|u| u.simple().to_string())
        .map_err(|_| CephixError::InvalidArgument(format!("invalid object UUID {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let ident = CsiIdentifier::new("ceph-east", 7, "9e186bfc7f0b4b7c93c662bf39d0d3f7");
        let encoded = ident.encode().unwrap();
        let decoded = CsiIdentifier::decode(&encoded).unwrap();
        assert_eq!(decoded, ident);
        // And the string form is stable.
        assert_eq!(decoded.encode().unwrap(), encoded);
    }

    #[test]
    fn test_cluster_id_with_dashes() {
        let ident = CsiIdentifier::new("my-cluster-01", 42, Uuid::new_v4().simple().to_string());
        let encoded = ident.encode().unwrap();
        let decoded = CsiIdentifier::decode(&encoded).unwrap();
        assert_eq!(decoded.cluster_id, "my-cluster-01");
        assert_eq!(decoded.location_id, 42);
    }

    #[test]
    fn test_dashed_uuid_is_normalized() {
        let ident = CsiIdentifier::new("c1", 1, "9e186bfc-7f0b-4b7c-93c6-62bf39d0d3f7");
        let encoded = ident.encode().unwrap();
        assert!(encoded.ends_with("9e186bfc7f0b4b7c93c662bf39d0d3f7"));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let ident = CsiIdentifier::new("c1", 1, Uuid::new_v4().simple().to_string());
        let encoded = ident.encode().unwrap();
        let tampered = format!("0002{}", &encoded[4..]);
        assert!(matches!(
            CsiIdentifier::decode(&tampered),
            Err(CephixError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_truncated_input_rejected() {
        let ident = CsiIdentifier::new("c1", 1, Uuid::new_v4().simple().to_string());
        let encoded = ident.encode().unwrap();
        for cut in [0, 3, 9, encoded.len() - 1] {
            assert!(CsiIdentifier::decode(&encoded[..cut]).is_err(), "cut at {cut}");
        }
        assert!(CsiIdentifier::decode(&format!("{encoded}ff")).is_err());
    }

    #[test]
    fn test_negative_location_id() {
        let ident = CsiIdentifier::new("c1", -1, Uuid::new_v4().simple().to_string());
        let encoded = ident.encode().unwrap();
        let decoded = CsiIdentifier::decode(&encoded).unwrap();
        assert_eq!(decoded.location_id, -1);
    }
}
