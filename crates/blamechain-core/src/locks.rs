//! Per-key append locks.
//!
//! Holds no revision data: each entry is only a mutex that serialises appends
//! to one chain within this process. Cross-process safety comes from the
//! store's conditional commit.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::source::RecordKey;

#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
  inner: Mutex<HashMap<RecordKey, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
  /// Wait for exclusive append access to `key`.
  pub(crate) async fn acquire(&self, key: RecordKey) -> OwnedMutexGuard<()> {
    let lock = self.entry(key);
    lock.lock_owned().await
  }

  fn entry(&self, key: RecordKey) -> Arc<AsyncMutex<()>> {
    let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    // Entries nobody holds or waits on are dropped.
    map.retain(|k, lock| *k == key || Arc::strong_count(lock) > 1);
    map.entry(key).or_default().clone()
  }

  #[cfg(test)]
  fn len(&self) -> usize {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
  }
}
