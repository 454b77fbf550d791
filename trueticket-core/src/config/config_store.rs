//! Reloadable settings shared by request handlers and background processors.
//!
//! A reload swaps the whole value and bumps a version carried on a watch
//! channel. Long-running loops hold a [`ConfigWatcher`] and reschedule when
//! it fires; request paths just take a [`ConfigStore::snapshot`].

use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, watch};

pub struct ConfigStore<T> {
    inner: Arc<Shared<T>>,
}

struct Shared<T> {
    value: RwLock<T>,
    version: watch::Sender<u64>,
}

/// Wakes once per reload of the [`ConfigStore`] it came from.
pub struct ConfigWatcher(watch::Receiver<u64>);

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Shared {
                value: RwLock::new(initial),
                version: watch::Sender::new(0),
            }),
        }
    }

    /// Swap in a reloaded value. Watchers are woken after the write lock
    /// is released.
    pub async fn update(&self, value: T) {
        *self.inner.value.write().await = value;
        self.inner.version.send_modify(|version| *version += 1);
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.value.read().await
    }

    /// Reloads applied since startup.
    pub fn version(&self) -> u64 {
        *self.inner.version.borrow()
    }

    pub fn subscribe(&self) -> ConfigWatcher {
        ConfigWatcher(self.inner.version.subscribe())
    }
}

impl<T: Clone> ConfigStore<T> {
    /// Owned copy, safe to keep across await points.
    pub async fn snapshot(&self) -> T {
        self.inner.value.read().await.clone()
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ConfigWatcher {
    /// Errors once every handle to the store is gone.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.0.changed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_notifies_watchers() {
        let store = ConfigStore::new(1u32);
        let mut watcher = store.subscribe();

        store.update(2).await;
        watcher.changed().await.unwrap();

        assert_eq!(*store.read().await, 2);
        assert_eq!(store.snapshot().await, 2);
        assert_eq!(store.version(), 1);
    }

    #[tokio::test]
    async fn test_late_subscriber_waits_for_next_reload() {
        let store = ConfigStore::new("a".to_string());
        store.update("b".to_string()).await;

        let mut watcher = store.subscribe();
        let pending =
            tokio::time::timeout(std::time::Duration::from_millis(20), watcher.changed()).await;
        assert!(pending.is_err());

        store.update("c".to_string()).await;
        watcher.changed().await.unwrap();
        assert_eq!(store.version(), 2);
    }
}
