use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use super::store::{EntitlementStore, StoreError};
use crate::models::{AuditEntry, Entitlement, NewAuditEntry};

#[derive(Clone)]
pub struct PgEntitlementStore {
    pool: PgPool,
}

impl PgEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct AuditRow {
    id: i64,
    user_id: i64,
    product_id: i64,
    action: String,
    reason: Option<String>,
    actor_id: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = StoreError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let action = row
            .action
            .parse()
            .map_err(StoreError::InvalidAuditAction)?;

        Ok(AuditEntry {
            id: row.id,
            user_id: row.user_id,
            product_id: row.product_id,
            action,
            reason: row.reason,
            actor_id: row.actor_id,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl EntitlementStore for PgEntitlementStore {
    async fn insert(&self, user_id: i64, product_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO vod_access (user_id, product_id)
            VALUES ($1, $2)
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, user_id: i64, product_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM vod_access WHERE user_id = $1 AND product_id = $2
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn exists_any(&self, user_id: i64, product_ids: &[i64]) -> Result<bool, StoreError> {
        if product_ids.is_empty() {
            return Ok(false);
        }

        let found = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT 1 FROM vod_access
            WHERE user_id = $1 AND product_id = ANY($2)
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(product_ids.to_vec())
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Entitlement>, i64), StoreError> {
        let records = sqlx::query_as::<_, Entitlement>(
            r#"
            SELECT id, user_id, product_id, granted_at FROM vod_access
            WHERE user_id = $1
            ORDER BY granted_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM vod_access WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((records, total))
    }

    async fn all_pairs(&self) -> Result<Vec<(i64, i64)>, StoreError> {
        let pairs = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT DISTINCT user_id, product_id FROM vod_access
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(pairs)
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO vod_access_audit (user_id, product_id, action, reason, actor_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.product_id)
        .bind(entry.action.as_str())
        .bind(&entry.reason)
        .bind(entry.actor_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn audit_for(
        &self,
        user_id: i64,
        product_id: i64,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT * FROM vod_access_audit
            WHERE user_id = $1 AND product_id = $2
            ORDER BY id ASC
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AuditEntry::try_from).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
