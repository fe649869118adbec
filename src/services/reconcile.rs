//! Backfill and consistency checks between paid orders and the entitlement table.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::db::StoreError;
use crate::models::Order;
use crate::services::catalog::Catalog;
use crate::services::commerce::classify_order;
use crate::services::entitlement::EntitlementService;

pub const BACKFILL_REASON: &str = "backfill";
pub const RECONCILE_REASON: &str = "reconcile";
/// Actor recorded for maintenance changes.
pub const SYSTEM_ACTOR: i64 = 0;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Pairs owed by a paid order but absent from the table.
    pub missing: Vec<(i64, i64)>,
    /// Pairs in the table that no paid order accounts for.
    pub orphans: Vec<(i64, i64)>,
    pub inserted: usize,
    pub deleted: usize,
    pub dry_run: bool,
}

/// `(user_id, product_id)` pairs owed by paid, registered-buyer orders.
pub async fn expected_pairs(
    catalog: &dyn Catalog,
    orders: &[Order],
    since: Option<NaiveDate>,
) -> BTreeSet<(i64, i64)> {
    let mut pairs = BTreeSet::new();

    for order in orders {
        if !order.is_paid() || !created_since(order, since) {
            continue;
        }
        let Some(user_id) = order.buyer() else {
            continue;
        };

        let classified = classify_order(catalog, order).await;
        if !classified.unclassified.is_empty() {
            tracing::warn!(
                order_id = order.id,
                products = ?classified.unclassified,
                "Order has unclassified items, their pairs are not expected"
            );
        }
        pairs.extend(classified.vod_ids.into_iter().map(|id| (user_id, id)));
    }

    pairs
}

fn created_since(order: &Order, since: Option<NaiveDate>) -> bool {
    match since {
        None => true,
        Some(date) => order
            .created_at
            .map(|created| created.date_naive() >= date)
            .unwrap_or(false),
    }
}

/// Inserts rows owed by paid orders that are not in the table yet.
#[tracing::instrument(skip(service, catalog, orders), fields(orders = orders.len()))]
pub async fn backfill(
    service: &EntitlementService,
    catalog: &dyn Catalog,
    orders: &[Order],
    since: Option<NaiveDate>,
    dry_run: bool,
) -> Result<ReconcileReport, StoreError> {
    let expected = expected_pairs(catalog, orders, since).await;
    let existing: BTreeSet<(i64, i64)> = service.all_pairs().await?.into_iter().collect();

    let mut report = ReconcileReport {
        missing: expected.difference(&existing).copied().collect(),
        dry_run,
        ..Default::default()
    };

    if !dry_run {
        report.inserted = grant_all(service, &report.missing, BACKFILL_REASON).await;
    }

    tracing::info!(
        missing = report.missing.len(),
        inserted = report.inserted,
        dry_run,
        "Backfill finished"
    );

    Ok(report)
}

/// Diffs expected pairs against the table. With `fix`, inserts the missing
/// pairs and deletes the orphans; otherwise only reports.
#[tracing::instrument(skip(service, catalog, orders), fields(orders = orders.len()))]
pub async fn check(
    service: &EntitlementService,
    catalog: &dyn Catalog,
    orders: &[Order],
    since: Option<NaiveDate>,
    fix: bool,
) -> Result<ReconcileReport, StoreError> {
    let expected = expected_pairs(catalog, orders, since).await;
    let existing: BTreeSet<(i64, i64)> = service.all_pairs().await?.into_iter().collect();

    let mut report = ReconcileReport {
        missing: expected.difference(&existing).copied().collect(),
        orphans: existing.difference(&expected).copied().collect(),
        dry_run: !fix,
        ..Default::default()
    };

    if fix {
        report.inserted = grant_all(service, &report.missing, RECONCILE_REASON).await;

        for &(user_id, product_id) in &report.orphans {
            if service
                .revoke(user_id, product_id, RECONCILE_REASON, SYSTEM_ACTOR)
                .await
            {
                report.deleted += 1;
            }
        }
    }

    tracing::info!(
        missing = report.missing.len(),
        orphans = report.orphans.len(),
        inserted = report.inserted,
        deleted = report.deleted,
        fix,
        "Check finished"
    );

    Ok(report)
}

async fn grant_all(service: &EntitlementService, pairs: &[(i64, i64)], reason: &str) -> usize {
    let mut inserted = 0;
    for &(user_id, product_id) in pairs {
        if service.grant(user_id, product_id, reason, SYSTEM_ACTOR).await {
            inserted += 1;
        } else {
            tracing::warn!(user_id, product_id, "Maintenance insert failed");
        }
    }
    inserted
}
