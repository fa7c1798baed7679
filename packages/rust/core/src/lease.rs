//! Per-address leases.
//!
//! Runs for the same source address share their content-addressed paths, so
//! they must not overlap. A lease is an async mutex keyed by the derived
//! source path; holders of the same key run one after another.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Held for the duration of one run; dropping it releases the address.
pub type Lease = OwnedMutexGuard<()>;

/// Table of address locks, pruned as leases are released.
#[derive(Default)]
pub struct AddressLeases {
    locks: Mutex<HashMap<PathBuf, Weak<AsyncMutex<()>>>>,
}

impl AddressLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lease on `key`.
    pub async fn acquire(&self, key: &Path) -> Lease {
        let lock = self.lock_for(key);
        if lock.try_lock().is_err() {
            debug!(key = %key.display(), "waiting for concurrent run on the same source");
        }
        lock.lock_owned().await
    }

    fn lock_for(&self, key: &Path) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.retain(|_, w| w.strong_count() > 0);

        if let Some(existing) = locks.get(key).and_then(Weak::upgrade) {
            return existing;
        }

        let lock = Arc::new(AsyncMutex::new(()));
        locks.insert(key.to_path_buf(), Arc::downgrade(&lock));
        lock
    }
}
