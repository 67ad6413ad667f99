//! Cluster connection pool.
//!
//! Admin handles are expensive to set up, so `(monitors, user, key)` tuples
//! are shared between RPCs through a reference-counted pool. The pooled
//! handle stays alive at least as long as its longest-lived borrower; when
//! the last [`Connection`] drops, the entry is closed and removed.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::admin::CephAdmin;
use crate::credentials::Credentials;
use crate::error::Result;

/// Builds admin handles for a `(monitors, credentials)` pair.
///
/// The daemon installs the CLI-backed factory; tests install one returning
/// the in-memory mock cluster.
#[async_trait]
pub trait AdminFactory: Send + Sync {
    async fn connect(&self, monitors: &str, creds: &Credentials) -> Result<Arc<dyn CephAdmin>>;
}

struct PoolEntry {
    admin: Arc<dyn CephAdmin>,
    refs: usize,
}

struct PoolInner {
    factory: Arc<dyn AdminFactory>,
    entries: Mutex<HashMap<String, PoolEntry>>,
}

/// Reference-counted pool of cluster connections.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(factory: Arc<dyn AdminFactory>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                factory,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Borrow a connection for the given cluster and credentials,
    /// establishing one if none is pooled.
    pub async fn connect(&self, monitors: &str, creds: &Credentials) -> Result<Connection> {
        let key = format!("{monitors}|{}|{:016x}", creds.id, creds.fingerprint());

        {
            let mut entries = self.inner.entries.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = entries.get_mut(&key) {
                entry.refs += 1;
                debug!(key = %key, refs = entry.refs, "reusing pooled connection");
                return Ok(Connection {
                    inner: Arc::clone(&self.inner),
                    key,
                    admin: Arc::clone(&entry.admin),
                });
            }
        }

        // Connect outside the lock; a racing caller may beat us to the
        // insert, in which case its handle wins and ours is discarded.
        let admin = self.inner.factory.connect(monitors, creds).await?;

        let mut entries = self.inner.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(key.clone()).or_insert_with(|| {
            debug!(key = %key, "pooling new connection");
            PoolEntry {
                admin: Arc::clone(&admin),
                refs: 0,
            }
        });
        entry.refs += 1;
        Ok(Connection {
            inner: Arc::clone(&self.inner),
            key,
            admin: Arc::clone(&entry.admin),
        })
    }

    /// Number of live pool entries, for tests and startup logging.
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A borrowed cluster connection. Dropping it releases the reference; the
/// last holder closes the pooled entry.
pub struct Connection {
    inner: Arc<PoolInner>,
    key: String,
    admin: Arc<dyn CephAdmin>,
}

impl Connection {
    /// The admin handle bundle for this cluster.
    pub fn admin(&self) -> &dyn CephAdmin {
        self.admin.as_ref()
    }
}

impl Deref for Connection {
    type Target = dyn CephAdmin;

    fn deref(&self) -> &Self::Target {
        self.admin.as_ref()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let mut entries = self.inner.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                entries.remove(&self.key);
                debug!(key = %self.key, "closed pooled connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::mock::MockCluster;

    struct CountingFactory {
        cluster: Arc<MockCluster>,
        connects: AtomicUsize,
    }

    #[async_trait]
    impl AdminFactory for CountingFactory {
        async fn connect(&self, _monitors: &str, _creds: &Credentials) -> Result<Arc<dyn CephAdmin>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let admin: Arc<dyn CephAdmin> = self.cluster.clone();
            Ok(admin)
        }
    }

    fn creds(id: &str, key: &str) -> Credentials {
        let mut secrets = StdHashMap::new();
        secrets.insert("adminID".to_string(), id.to_string());
        secrets.insert("adminKey".to_string(), key.to_string());
        Credentials::from_admin_secrets(&secrets).unwrap()
    }

    #[tokio::test]
    async fn test_connections_are_shared_and_reaped() {
        let factory = Arc::new(CountingFactory {
            cluster: Arc::new(MockCluster::new()),
            connects: AtomicUsize::new(0),
        });
        let pool = ConnectionPool::new(factory.clone());
        let c = creds("admin", "key");

        let a = pool.connect("mon1:6789", &c).await.unwrap();
        let b = pool.connect("mon1:6789", &c).await.unwrap();
        assert_eq!(factory.connects.load(Ordering::SeqCst), 1);
        assert_eq!(pool.len(), 1);

        drop(a);
        assert_eq!(pool.len(), 1, "entry survives while borrowed");
        drop(b);
        assert_eq!(pool.len(), 0, "last drop closes the entry");
    }

    #[tokio::test]
    async fn test_distinct_users_get_distinct_connections() {
        let factory = Arc::new(CountingFactory {
            cluster: Arc::new(MockCluster::new()),
            connects: AtomicUsize::new(0),
        });
        let pool = ConnectionPool::new(factory.clone());

        let _a = pool.connect("mon1:6789", &creds("admin", "key")).await.unwrap();
        let _b = pool.connect("mon1:6789", &creds("user", "key")).await.unwrap();
        assert_eq!(factory.connects.load(Ordering::SeqCst), 2);
        assert_eq!(pool.len(), 2);
    }
}
