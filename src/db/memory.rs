use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::store::{EntitlementStore, StoreError};
use crate::models::{AuditEntry, Entitlement, NewAuditEntry};

/// Process-local store with the same duplicate-tolerant semantics as the
/// PostgreSQL tables. Used by tests and throwaway local runs.
#[derive(Default)]
pub struct InMemoryEntitlementStore {
    inner: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    access: Vec<Entitlement>,
    audit: Vec<AuditEntry>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl InMemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Physical row count for a pair, duplicates included.
    pub async fn row_count(&self, user_id: i64, product_id: i64) -> usize {
        let tables = self.inner.read().await;
        tables
            .access
            .iter()
            .filter(|r| r.user_id == user_id && r.product_id == product_id)
            .count()
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn insert(&self, user_id: i64, product_id: i64) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        let id = tables.next_id();
        tables.access.push(Entitlement {
            id,
            user_id,
            product_id,
            granted_at: Utc::now(),
        });
        Ok(())
    }

    async fn delete(&self, user_id: i64, product_id: i64) -> Result<u64, StoreError> {
        let mut tables = self.inner.write().await;
        let before = tables.access.len();
        tables
            .access
            .retain(|r| !(r.user_id == user_id && r.product_id == product_id));
        Ok((before - tables.access.len()) as u64)
    }

    async fn exists_any(&self, user_id: i64, product_ids: &[i64]) -> Result<bool, StoreError> {
        let tables = self.inner.read().await;
        Ok(tables
            .access
            .iter()
            .any(|r| r.user_id == user_id && product_ids.contains(&r.product_id)))
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Entitlement>, i64), StoreError> {
        let tables = self.inner.read().await;
        let mut rows: Vec<Entitlement> = tables
            .access
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.granted_at.cmp(&a.granted_at).then(b.id.cmp(&a.id)));

        let total = rows.len() as i64;
        let page = rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();

        Ok((page, total))
    }

    async fn all_pairs(&self) -> Result<Vec<(i64, i64)>, StoreError> {
        let tables = self.inner.read().await;
        let pairs: BTreeSet<(i64, i64)> = tables
            .access
            .iter()
            .map(|r| (r.user_id, r.product_id))
            .collect();
        Ok(pairs.into_iter().collect())
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        let id = tables.next_id();
        tables.audit.push(AuditEntry {
            id,
            user_id: entry.user_id,
            product_id: entry.product_id,
            action: entry.action,
            reason: entry.reason,
            actor_id: entry.actor_id,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn audit_for(
        &self,
        user_id: i64,
        product_id: i64,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let tables = self.inner.read().await;
        Ok(tables
            .audit
            .iter()
            .filter(|a| a.user_id == user_id && a.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_rows_are_kept_and_deleted_together() {
        let store = InMemoryEntitlementStore::new();
        store.insert(1, 2).await.unwrap();
        store.insert(1, 2).await.unwrap();
        assert_eq!(store.row_count(1, 2).await, 2);
        assert_eq!(store.all_pairs().await.unwrap(), vec![(1, 2)]);

        assert_eq!(store.delete(1, 2).await.unwrap(), 2);
        assert!(!store.exists_any(1, &[2]).await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_any_checks_every_candidate() {
        let store = InMemoryEntitlementStore::new();
        store.insert(7, 30).await.unwrap();

        assert!(store.exists_any(7, &[10, 20, 30]).await.unwrap());
        assert!(!store.exists_any(7, &[10, 20]).await.unwrap());
        assert!(!store.exists_any(8, &[30]).await.unwrap());
        assert!(!store.exists_any(7, &[]).await.unwrap());
    }
}
