//! Issuance serialization.
//!
//! A keyed async mutex: two concurrent issuance calls for the same
//! (tenant, user) pair are fully serialized, calls for different pairs
//! never block each other. The guard is RAII — dropping it (on any exit
//! path, including errors) releases the key.
//!
//! Deployments running several engine instances against one Postgres
//! database additionally serialize through the adapter's transaction-
//! scoped advisory lock; this in-process lock is the authoritative
//! mechanism for a single instance.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-(tenant, user) issuance locks.
#[derive(Default)]
pub struct IssuanceLocks {
    locks: Mutex<HashMap<(Uuid, Uuid), Arc<Mutex<()>>>>,
}

impl IssuanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a (tenant, user) pair, waiting if another
    /// issuance for the same pair is in flight.
    pub async fn acquire(&self, tenant_id: Uuid, user_id: Uuid) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().await;
            locks
                .entry((tenant_id, user_id))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        // The registry lock is released before waiting on the entry, so
        // contention on one pair never blocks acquisition for others.
        entry.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let locks = Arc::new(IssuanceLocks::new());
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        let in_section = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let in_section = Arc::clone(&in_section);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(tenant, user).await;
                let now = in_section.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = IssuanceLocks::new();
        let tenant = Uuid::new_v4();

        let _guard_a = locks.acquire(tenant, Uuid::new_v4()).await;
        // Acquiring a different pair while the first is held must not
        // deadlock or wait.
        let acquired = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(tenant, Uuid::new_v4()),
        )
        .await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn test_guard_drop_releases() {
        let locks = IssuanceLocks::new();
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();

        drop(locks.acquire(tenant, user).await);
        let reacquired =
            tokio::time::timeout(Duration::from_millis(100), locks.acquire(tenant, user)).await;
        assert!(reacquired.is_ok());
    }
}
