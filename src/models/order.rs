use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order statuses that count as paid for reconciliation.
pub const PAID_STATUSES: [&str; 2] = ["processing", "completed"];

/// Order as posted by the commerce platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    /// Registered buyer; absent or non-positive for guest checkouts.
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<LineItem>,
}

impl Order {
    pub fn buyer(&self) -> Option<i64> {
        self.user_id.filter(|id| *id > 0)
    }

    pub fn is_paid(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| PAID_STATUSES.contains(&s))
            .unwrap_or(false)
    }

    /// Audit reason recorded for every entitlement change caused by this order.
    pub fn reference(&self) -> String {
        order_reason(self.id, "")
    }
}

/// `[order #<id>]` followed by an optional free-text reason.
pub fn order_reason(order_id: i64, reason: &str) -> String {
    let reason = reason.trim();
    if reason.is_empty() {
        format!("[order #{}]", order_id)
    } else {
        format!("[order #{}] {}", order_id, reason)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: i64,
    #[serde(default)]
    pub variation_id: i64,
    /// Line-item meta, including variation attributes such as `attribute_pa_video_format`.
    #[serde(default)]
    pub meta: HashMap<String, String>,
    /// Declared product type when the platform includes it in the payload.
    #[serde(default)]
    pub product_type: Option<String>,
}

impl LineItem {
    /// Variation id when the item references a variation, else the base product id.
    pub fn effective_id(&self) -> i64 {
        if self.variation_id > 0 {
            self.variation_id
        } else {
            self.product_id
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderEvent {
    PaymentCompleted,
    Cancelled,
    Refunded,
}

impl OrderEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderEvent::PaymentCompleted => "payment-completed",
            OrderEvent::Cancelled => "cancelled",
            OrderEvent::Refunded => "refunded",
        }
    }

    pub fn grants_access(&self) -> bool {
        matches!(self, OrderEvent::PaymentCompleted)
    }
}

impl fmt::Display for OrderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment-completed" => Ok(OrderEvent::PaymentCompleted),
            "cancelled" => Ok(OrderEvent::Cancelled),
            "refunded" => Ok(OrderEvent::Refunded),
            other => Err(format!("unknown order event: {}", other)),
        }
    }
}
