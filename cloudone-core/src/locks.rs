//! Per-resource mutual exclusion

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async locks keyed by resource name
///
/// Read-modify-write cycles against the same resource (for example a
/// secret's version manifest) take the lock for that key; unrelated keys
/// never contend. A key's entry is dropped once nobody holds or waits for it.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Exclusive access to one key of a [`KeyedLocks`]
pub struct KeyedGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &str) -> KeyedGuard<'_> {
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        KeyedGuard {
            locks: &self.locks,
            key: key.to_string(),
            guard: Some(mutex.lock_owned().await),
        }
    }

    /// Number of keys currently held or waited for
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        // Release first so the map holds the only remaining reference when
        // nobody else is waiting.
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.lock("projects/p/secrets/a").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("projects/p/secrets/a").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_keys_do_not_contend() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("projects/p/secrets/a").await;
        let _b = locks.lock("projects/p/secrets/b").await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_released_keys_are_forgotten() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.lock("projects/p/secrets/a").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("projects/p/secrets/a").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The waiter still needs the entry
        drop(guard);
        waiter.await.unwrap();
        assert!(locks.is_empty());

        for i in 0..100 {
            let _guard = locks.lock(&format!("projects/p/secrets/s{i}")).await;
        }
        assert!(locks.is_empty());
    }
}
