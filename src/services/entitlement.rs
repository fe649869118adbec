use std::sync::Arc;

use crate::db::{EntitlementStore, StoreError};
use crate::models::{AuditAction, AuditEntry, EntitlementPage, NewAuditEntry};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 200;

/// Grant/revoke/check operations over an [`EntitlementStore`].
///
/// Grant and revoke are idempotent from the caller's point of view and each
/// call appends exactly one audit row, whether or not the mapping changed.
#[derive(Clone)]
pub struct EntitlementService {
    store: Arc<dyn EntitlementStore>,
}

impl EntitlementService {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    /// Records that `user_id` may watch `product_id`.
    ///
    /// Returns `false` only when the insert itself failed.
    #[tracing::instrument(skip(self, reason))]
    pub async fn grant(&self, user_id: i64, product_id: i64, reason: &str, actor_id: i64) -> bool {
        let inserted = match self.store.insert(user_id, product_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    user_id,
                    product_id,
                    reason = %reason,
                    error = %e,
                    "Failed to insert entitlement"
                );
                false
            }
        };

        self.audit(user_id, product_id, AuditAction::Grant, reason, actor_id)
            .await;

        if inserted {
            tracing::info!(user_id, product_id, "Access granted");
        }

        inserted
    }

    /// Removes every entitlement row for the pair.
    ///
    /// Revoking access that was never granted still succeeds and is audited.
    #[tracing::instrument(skip(self, reason))]
    pub async fn revoke(&self, user_id: i64, product_id: i64, reason: &str, actor_id: i64) -> bool {
        let deleted = match self.store.delete(user_id, product_id).await {
            Ok(removed) => {
                tracing::info!(user_id, product_id, removed, "Access revoked");
                true
            }
            Err(e) => {
                tracing::error!(
                    user_id,
                    product_id,
                    reason = %reason,
                    error = %e,
                    "Failed to delete entitlement"
                );
                false
            }
        };

        self.audit(user_id, product_id, AuditAction::Revoke, reason, actor_id)
            .await;

        deleted
    }

    /// Exact-id existence check. Storage failures deny access.
    pub async fn has_access(&self, user_id: i64, product_id: i64) -> bool {
        self.has_access_any(user_id, &[product_id]).await
    }

    /// True if the user holds an entitlement for any of `product_ids`.
    pub async fn has_access_any(&self, user_id: i64, product_ids: &[i64]) -> bool {
        if user_id <= 0 {
            return false;
        }

        match self.store.exists_any(user_id, product_ids).await {
            Ok(found) => found,
            Err(e) => {
                tracing::error!(
                    user_id,
                    ?product_ids,
                    error = %e,
                    "Entitlement lookup failed, denying access"
                );
                false
            }
        }
    }

    /// Paginated listing for display. `page` is 1-based.
    pub async fn list_for_user(
        &self,
        user_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<EntitlementPage, StoreError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = (page as i64 - 1) * page_size as i64;

        let (records, total) = self
            .store
            .list_for_user(user_id, page_size as i64, offset)
            .await?;

        Ok(EntitlementPage {
            records,
            total,
            page,
            page_size,
        })
    }

    pub async fn audit_trail(
        &self,
        user_id: i64,
        product_id: i64,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        self.store.audit_for(user_id, product_id).await
    }

    pub async fn all_pairs(&self) -> Result<Vec<(i64, i64)>, StoreError> {
        self.store.all_pairs().await
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }

    async fn audit(
        &self,
        user_id: i64,
        product_id: i64,
        action: AuditAction,
        reason: &str,
        actor_id: i64,
    ) {
        let reason = reason.trim();
        let entry = NewAuditEntry {
            user_id,
            product_id,
            action,
            reason: (!reason.is_empty()).then(|| reason.to_string()),
            actor_id,
        };

        if let Err(e) = self.store.append_audit(entry).await {
            tracing::error!(
                user_id,
                product_id,
                action = %action,
                error = %e,
                "Failed to append audit entry"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryEntitlementStore;

    fn service() -> EntitlementService {
        EntitlementService::new(Arc::new(InMemoryEntitlementStore::new()))
    }

    #[tokio::test]
    async fn test_grant_twice_is_harmless_and_audited_twice() {
        let svc = service();

        assert!(svc.grant(1, 100, "first", 1).await);
        assert!(svc.grant(1, 100, "again", 1).await);
        assert!(svc.has_access(1, 100).await);

        let trail = svc.audit_trail(1, 100).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert!(trail.iter().all(|a| a.action == AuditAction::Grant));
    }

    #[tokio::test]
    async fn test_revoke_without_grant_still_audits() {
        let svc = service();

        assert!(svc.revoke(5, 200, "", 99).await);

        let trail = svc.audit_trail(5, 200).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::Revoke);
        assert_eq!(trail[0].actor_id, 99);
        assert_eq!(trail[0].reason, None);
    }

    #[tokio::test]
    async fn test_grant_then_revoke_round_trip() {
        let svc = service();

        svc.grant(3, 30, "", 3).await;
        assert!(svc.has_access(3, 30).await);

        svc.grant(3, 30, "", 3).await;
        svc.revoke(3, 30, "", 3).await;
        assert!(!svc.has_access(3, 30).await);
    }

    #[tokio::test]
    async fn test_has_access_is_exact_id() {
        let svc = service();
        svc.grant(3, 30, "", 3).await;

        assert!(!svc.has_access(3, 31).await);
        assert!(!svc.has_access(4, 30).await);
        assert!(svc.has_access_any(3, &[31, 30]).await);
    }

    #[tokio::test]
    async fn test_list_for_user_pages_newest_first() {
        let svc = service();
        for product in 1..=5 {
            svc.grant(9, product, "", 9).await;
        }
        svc.grant(10, 77, "", 10).await;

        let first = svc.list_for_user(9, 1, 2).await.unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.records[0].product_id, 5);
        assert_eq!(first.records[1].product_id, 4);

        let last = svc.list_for_user(9, 3, 2).await.unwrap();
        assert_eq!(last.records.len(), 1);
        assert_eq!(last.records[0].product_id, 1);
        assert_eq!(last.total_pages(), 3);
    }
}
