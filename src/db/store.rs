use async_trait::async_trait;

use crate::models::{AuditEntry, Entitlement, NewAuditEntry};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unknown audit action in storage: {0}")]
    InvalidAuditAction(String),
}

/// Persistence primitives behind the entitlement service.
///
/// Rows are keyed logically by `(user_id, product_id)` but no uniqueness is
/// enforced: `insert` may create duplicates, `delete` removes every match and
/// `exists_any` only asks whether at least one row exists.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn insert(&self, user_id: i64, product_id: i64) -> Result<(), StoreError>;

    /// Deletes all rows for the pair and returns how many were removed.
    async fn delete(&self, user_id: i64, product_id: i64) -> Result<u64, StoreError>;

    async fn exists_any(&self, user_id: i64, product_ids: &[i64]) -> Result<bool, StoreError>;

    /// Rows for a user ordered by `granted_at` descending, plus the total row count.
    async fn list_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Entitlement>, i64), StoreError>;

    /// Distinct `(user_id, product_id)` pairs currently stored.
    async fn all_pairs(&self) -> Result<Vec<(i64, i64)>, StoreError>;

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<(), StoreError>;

    async fn audit_for(&self, user_id: i64, product_id: i64)
        -> Result<Vec<AuditEntry>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
