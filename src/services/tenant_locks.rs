//! In-process serialisation of work per tenant.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async mutex per tenant, shared by workers and operator actions in the
/// same process. Across processes the advisory lock taken inside each
/// transaction does the same job.
#[derive(Clone, Default)]
pub struct TenantLocks {
    inner: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, tenant_id: Uuid) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the shard lock is not held across the await.
        let mutex = self
            .inner
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    pub fn tracked(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_tenant_waits_other_tenant_does_not() {
        let locks = TenantLocks::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let held = locks.acquire(a).await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.acquire(a)).await;
        assert!(blocked.is_err());

        let other = tokio::time::timeout(Duration::from_millis(50), locks.acquire(b)).await;
        assert!(other.is_ok());

        drop(held);
        let reacquired = tokio::time::timeout(Duration::from_millis(50), locks.acquire(a)).await;
        assert!(reacquired.is_ok());
        assert_eq!(locks.tracked(), 2);
    }
}
