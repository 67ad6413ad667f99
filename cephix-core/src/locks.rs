//! Operation lock manager.
//!
//! Two layers of locking keep concurrent RPCs for the same object apart:
//!
//! - [`VolumeLocks`] is a plain try-lock keyed by a single identifier
//!   (request name, volume id or snapshot id; one instance per scope).
//! - [`OperationLocks`] tracks *classes* of cluster operations per
//!   identifier. Compatible classes run in parallel (several clones may pull
//!   from one source), incompatible ones are refused immediately.
//!
//! Acquisition never blocks; on contention the caller returns `ABORTED` and
//! the CO retries. Guards release their slot on drop, so every early-return
//! path unwinds correctly.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Operation classes competing for a single volume or snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    /// The object is the source of a volume clone.
    Clone,
    /// The object is a snapshot being restored into a new volume.
    Restore,
    /// The object is being deleted.
    Delete,
    /// The object is being expanded.
    Expand,
    /// A snapshot is being taken of the object.
    SnapCreate,
}

#[derive(Debug, Default)]
struct OpCounts {
    clone: usize,
    restore: usize,
    snap_create: bool,
    delete: bool,
    expand: bool,
}

impl OpCounts {
    fn is_idle(&self) -> bool {
        self.clone == 0 && self.restore == 0 && !self.snap_create && !self.delete && !self.expand
    }

    /// Check the compatibility matrix and take the slot if free.
    ///
    /// delete and expand exclude everything; clone and restore exclude
    /// delete/expand but stack with each other; snapshot creation is
    /// serialised per source and excluded by delete.
    fn try_take(&mut self, class: OpClass) -> bool {
        match class {
            OpClass::Clone | OpClass::Restore => {
                if self.delete || self.expand {
                    return false;
                }
            }
            OpClass::Delete => {
                if !self.is_idle() {
                    return false;
                }
            }
            OpClass::Expand => {
                if self.delete || self.expand || self.clone > 0 || self.restore > 0 {
                    return false;
                }
            }
            OpClass::SnapCreate => {
                if self.delete || self.snap_create {
                    return false;
                }
            }
        }
        match class {
            OpClass::Clone => self.clone += 1,
            OpClass::Restore => self.restore += 1,
            OpClass::Delete => self.delete = true,
            OpClass::Expand => self.expand = true,
            OpClass::SnapCreate => self.snap_create = true,
        }
        true
    }

    fn release(&mut self, class: OpClass) {
        match class {
            OpClass::Clone => self.clone = self.clone.saturating_sub(1),
            OpClass::Restore => self.restore = self.restore.saturating_sub(1),
            OpClass::Delete => self.delete = false,
            OpClass::Expand => self.expand = false,
            OpClass::SnapCreate => self.snap_create = false,
        }
    }
}

/// Single-holder try-locks keyed by an identifier.
///
/// The driver keeps one instance per scope (request names, volume ids,
/// snapshot ids) so the key spaces cannot collide.
#[derive(Debug, Clone, Default)]
pub struct VolumeLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl VolumeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `id`, or `None` when another RPC holds it.
    pub fn try_acquire(&self, id: &str) -> Option<VolumeLockGuard> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(id.to_string()) {
            return None;
        }
        Some(VolumeLockGuard {
            held: Arc::clone(&self.held),
            id: id.to_string(),
        })
    }

    #[cfg(test)]
    fn is_held(&self, id: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
    }
}

/// RAII guard returned by [`VolumeLocks::try_acquire`].
#[derive(Debug)]
pub struct VolumeLockGuard {
    held: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for VolumeLockGuard {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

/// Class-typed operation locks keyed by an identifier.
#[derive(Debug, Clone, Default)]
pub struct OperationLocks {
    counts: Arc<Mutex<HashMap<String, OpCounts>>>,
}

impl OperationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a `class` slot on `id`, or `None` when an incompatible
    /// operation is active.
    pub fn try_acquire(&self, class: OpClass, id: &str) -> Option<OpLockGuard> {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        let entry = counts.entry(id.to_string()).or_default();
        if !entry.try_take(class) {
            if entry.is_idle() {
                counts.remove(id);
            }
            return None;
        }
        Some(OpLockGuard {
            counts: Arc::clone(&self.counts),
            id: id.to_string(),
            class,
        })
    }
}

/// RAII guard returned by [`OperationLocks::try_acquire`].
#[derive(Debug)]
pub struct OpLockGuard {
    counts: Arc<Mutex<HashMap<String, OpCounts>>>,
    id: String,
    class: OpClass,
}

impl Drop for OpLockGuard {
    fn drop(&mut self) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = counts.get_mut(&self.id) {
            entry.release(self.class);
            if entry.is_idle() {
                counts.remove(&self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_lock_exclusive() {
        let locks = VolumeLocks::new();
        let guard = locks.try_acquire("pvc-1").unwrap();
        assert!(locks.try_acquire("pvc-1").is_none());
        // Unrelated id is unaffected.
        assert!(locks.try_acquire("pvc-2").is_some());
        drop(guard);
        assert!(locks.try_acquire("pvc-1").is_some());
    }

    #[test]
    fn test_volume_lock_released_on_drop() {
        let locks = VolumeLocks::new();
        {
            let _guard = locks.try_acquire("v").unwrap();
            assert!(locks.is_held("v"));
        }
        assert!(!locks.is_held("v"));
    }

    #[test]
    fn test_delete_excludes_everything() {
        let ops = OperationLocks::new();
        let _del = ops.try_acquire(OpClass::Delete, "x").unwrap();
        assert!(ops.try_acquire(OpClass::Clone, "x").is_none());
        assert!(ops.try_acquire(OpClass::Restore, "x").is_none());
        assert!(ops.try_acquire(OpClass::Expand, "x").is_none());
        assert!(ops.try_acquire(OpClass::SnapCreate, "x").is_none());
        assert!(ops.try_acquire(OpClass::Delete, "x").is_none());
    }

    #[test]
    fn test_clones_stack_and_block_delete_and_expand() {
        let ops = OperationLocks::new();
        let c1 = ops.try_acquire(OpClass::Clone, "x").unwrap();
        let c2 = ops.try_acquire(OpClass::Clone, "x").unwrap();
        assert!(ops.try_acquire(OpClass::Delete, "x").is_none());
        assert!(ops.try_acquire(OpClass::Expand, "x").is_none());
        drop(c1);
        // Still one clone active.
        assert!(ops.try_acquire(OpClass::Delete, "x").is_none());
        drop(c2);
        assert!(ops.try_acquire(OpClass::Delete, "x").is_some());
    }

    #[test]
    fn test_snap_create_serialised_per_source() {
        let ops = OperationLocks::new();
        let s1 = ops.try_acquire(OpClass::SnapCreate, "src").unwrap();
        assert!(ops.try_acquire(OpClass::SnapCreate, "src").is_none());
        // But a clone of the same source is fine.
        assert!(ops.try_acquire(OpClass::Clone, "src").is_some());
        drop(s1);
        assert!(ops.try_acquire(OpClass::SnapCreate, "src").is_some());
    }

    #[test]
    fn test_idle_entries_are_reaped() {
        let ops = OperationLocks::new();
        let guard = ops.try_acquire(OpClass::Expand, "y").unwrap();
        drop(guard);
        assert!(ops.counts.lock().unwrap().is_empty());
    }
}
