use std::sync::Arc;

use serde::Serialize;

use crate::models::{LineItem, Order, OrderEvent};
use crate::services::catalog::{Catalog, CatalogError};
use crate::services::classification::{is_vod_item, LineItemView};
use crate::services::entitlement::EntitlementService;

/// VOD line items found in an order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedOrder {
    /// Line items in the order, VOD or not.
    pub total_items: usize,
    /// Effective ids of VOD items, in line-item order.
    pub vod_ids: Vec<i64>,
    /// Items whose catalog lookup failed and whose attributes did not mark
    /// them as VOD, so they could not be classified either way.
    pub unclassified: Vec<i64>,
}

impl ClassifiedOrder {
    /// Every line item is a VOD item and there is at least one.
    pub fn is_all_vod(&self) -> bool {
        self.total_items > 0 && self.total_items == self.vod_ids.len()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ItemFailure {
    pub product_id: i64,
    pub action: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EventOutcome {
    pub order_id: i64,
    pub event: OrderEvent,
    pub user_id: Option<i64>,
    pub granted: Vec<i64>,
    pub revoked: Vec<i64>,
    pub failures: Vec<ItemFailure>,
    /// The platform should move the order to completed.
    pub complete_order: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<&'static str>,
}

impl EventOutcome {
    fn new(order: &Order, event: OrderEvent) -> Self {
        Self {
            order_id: order.id,
            event,
            user_id: order.buyer(),
            granted: Vec::new(),
            revoked: Vec::new(),
            failures: Vec::new(),
            complete_order: false,
            skipped: None,
        }
    }
}

/// Turns order lifecycle events into entitlement changes.
#[derive(Clone)]
pub struct CommerceAdapter {
    entitlements: EntitlementService,
    catalog: Arc<dyn Catalog>,
}

impl CommerceAdapter {
    pub fn new(entitlements: EntitlementService, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            entitlements,
            catalog,
        }
    }

    /// Grants on payment, revokes on cancel/refund. Storage failures are
    /// logged and reported per item; the remaining items are still processed.
    #[tracing::instrument(skip(self, order), fields(order_id = order.id, event = %event))]
    pub async fn handle(&self, event: OrderEvent, order: &Order) -> EventOutcome {
        let mut outcome = EventOutcome::new(order, event);

        let Some(user_id) = order.buyer() else {
            tracing::info!("Guest order, skipping entitlement changes");
            outcome.skipped = Some("guest_order");
            return outcome;
        };

        let classified = classify_order(self.catalog.as_ref(), order).await;
        let reason = order.reference();

        for &product_id in &classified.unclassified {
            tracing::error!(
                user_id,
                product_id,
                order_id = order.id,
                "Line item could not be classified"
            );
            outcome.failures.push(ItemFailure {
                product_id,
                action: "classify",
            });
        }

        for product_id in &classified.vod_ids {
            let product_id = *product_id;
            if event.grants_access() {
                if self
                    .entitlements
                    .grant(user_id, product_id, &reason, user_id)
                    .await
                {
                    outcome.granted.push(product_id);
                } else {
                    tracing::error!(user_id, product_id, order_id = order.id, "Grant failed");
                    outcome.failures.push(ItemFailure {
                        product_id,
                        action: "grant",
                    });
                }
            } else if self
                .entitlements
                .revoke(user_id, product_id, &reason, user_id)
                .await
            {
                outcome.revoked.push(product_id);
            } else {
                tracing::error!(user_id, product_id, order_id = order.id, "Revoke failed");
                outcome.failures.push(ItemFailure {
                    product_id,
                    action: "revoke",
                });
            }
        }

        outcome.complete_order = event.grants_access() && classified.is_all_vod();

        tracing::info!(
            user_id,
            granted = outcome.granted.len(),
            revoked = outcome.revoked.len(),
            failures = outcome.failures.len(),
            complete_order = outcome.complete_order,
            "Order event processed"
        );

        outcome
    }
}

/// Classifies every line item of `order`, looking up the declared product
/// type in the catalog when the payload does not carry it.
pub async fn classify_order(catalog: &dyn Catalog, order: &Order) -> ClassifiedOrder {
    let mut classified = ClassifiedOrder {
        total_items: order.items.len(),
        ..Default::default()
    };

    for item in &order.items {
        let effective_id = item.effective_id();
        if effective_id <= 0 {
            continue;
        }

        let (product_type, lookup_failed) = match declared_type(catalog, item).await {
            Ok(product_type) => (product_type, false),
            Err(e) => {
                tracing::warn!(product_id = effective_id, error = %e, "Catalog lookup failed");
                (None, true)
            }
        };
        let view = LineItemView {
            attributes: &item.meta,
            product_type: product_type.as_deref(),
        };

        if is_vod_item(&view) {
            classified.vod_ids.push(effective_id);
        } else if lookup_failed {
            classified.unclassified.push(effective_id);
        }
    }

    classified
}

async fn declared_type(
    catalog: &dyn Catalog,
    item: &LineItem,
) -> Result<Option<String>, CatalogError> {
    if let Some(product_type) = &item.product_type {
        return Ok(Some(product_type.clone()));
    }

    let product = catalog.product(item.effective_id()).await?;
    Ok(product.map(|p| p.product_type))
}
