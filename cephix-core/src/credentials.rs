//! Per-RPC Ceph credentials.
//!
//! The CO hands the driver a secrets map on every call. The key material is
//! written to a private keyfile that Ceph tooling can consume via
//! `--keyfile`; the file is zeroed and unlinked when the credentials are
//! dropped, on every exit path.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{CephixError, Result};

const SECRET_USER_ID: &str = "userID";
const SECRET_USER_KEY: &str = "userKey";
const SECRET_ADMIN_ID: &str = "adminID";
const SECRET_ADMIN_KEY: &str = "adminKey";

/// Scoped Ceph credentials materialised to a keyfile.
#[derive(Debug)]
pub struct Credentials {
    /// Ceph entity name without the `client.` prefix.
    pub id: String,
    key_len: usize,
    key_fingerprint: u64,
    keyfile: NamedTempFile,
}

impl Credentials {
    /// Build credentials from `adminID`/`adminKey` secret entries.
    ///
    /// Provisioning operations require admin scope; node-side operations use
    /// [`Credentials::from_user_secrets`].
    pub fn from_admin_secrets(secrets: &HashMap<String, String>) -> Result<Self> {
        Self::materialise(secrets, SECRET_ADMIN_ID, SECRET_ADMIN_KEY)
    }

    /// Build credentials from `userID`/`userKey` secret entries.
    pub fn from_user_secrets(secrets: &HashMap<String, String>) -> Result<Self> {
        Self::materialise(secrets, SECRET_USER_ID, SECRET_USER_KEY)
    }

    fn materialise(
        secrets: &HashMap<String, String>,
        id_field: &str,
        key_field: &str,
    ) -> Result<Self> {
        let id = secrets
            .get(id_field)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                CephixError::Unauthenticated(format!("missing {id_field} in secrets"))
            })?;
        let key = secrets
            .get(key_field)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                CephixError::Unauthenticated(format!("missing {key_field} in secrets"))
            })?;

        let mut keyfile = NamedTempFile::new().map_err(|e| {
            CephixError::Internal(format!("failed to create keyfile: {e}"))
        })?;
        keyfile
            .write_all(key.as_bytes())
            .and_then(|_| keyfile.flush())
            .map_err(|e| CephixError::Internal(format!("failed to write keyfile: {e}")))?;

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);

        Ok(Self {
            id: id.clone(),
            key_len: key.len(),
            key_fingerprint: hasher.finish(),
            keyfile,
        })
    }

    /// Non-reversible fingerprint of the key material, used to key the
    /// connection pool without retaining the key itself.
    pub fn fingerprint(&self) -> u64 {
        self.key_fingerprint
    }

    /// Path of the keyfile, passed as `--keyfile` to Ceph tooling.
    pub fn keyfile_path(&self) -> &Path {
        self.keyfile.path()
    }

    /// Keyfile path as an owned buffer for command construction.
    pub fn keyfile_path_buf(&self) -> PathBuf {
        self.keyfile.path().to_path_buf()
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        // Overwrite the key material before the tempfile unlinks itself, so
        // the bytes do not survive in the filesystem's free blocks.
        let file = self.keyfile.as_file_mut();
        let scrub = file
            .seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(&vec![0u8; self.key_len]))
            .and_then(|_| file.flush());
        if let Err(e) = scrub {
            warn!(error = %e, "failed to scrub credential keyfile");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_admin_credentials_written_to_keyfile() {
        let creds =
            Credentials::from_admin_secrets(&secrets(&[("adminID", "admin"), ("adminKey", "s3cr3t")]))
                .unwrap();
        assert_eq!(creds.id, "admin");
        let on_disk = std::fs::read_to_string(creds.keyfile_path()).unwrap();
        assert_eq!(on_disk, "s3cr3t");
    }

    #[test]
    fn test_keyfile_removed_on_drop() {
        let path = {
            let creds = Credentials::from_user_secrets(&secrets(&[
                ("userID", "u1"),
                ("userKey", "k1"),
            ]))
            .unwrap();
            creds.keyfile_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert!(matches!(
            Credentials::from_admin_secrets(&secrets(&[("adminID", "admin")])),
            Err(CephixError::Unauthenticated(_))
        ));
        assert!(matches!(
            Credentials::from_user_secrets(&secrets(&[("userKey", "k")])),
            Err(CephixError::Unauthenticated(_))
        ));
        // Empty values are as bad as missing ones.
        assert!(Credentials::from_admin_secrets(&secrets(&[
            ("adminID", ""),
            ("adminKey", "k"),
        ]))
        .is_err());
    }
}
