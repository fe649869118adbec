use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const PRODUCT_TYPE_VOD: &str = "vod";
pub const PRODUCT_TYPE_VARIATION: &str = "variation";

/// Catalog view of a product or a single variation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    pub product_type: String,
    /// Set for variations only.
    #[serde(default)]
    pub parent_id: Option<i64>,
    /// Variation ids of a variable product.
    #[serde(default)]
    pub children: Vec<i64>,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

impl Product {
    pub fn is_variation(&self) -> bool {
        self.product_type == PRODUCT_TYPE_VARIATION
    }

    /// Parent id of a variation, ignoring zero/negative placeholders.
    pub fn parent(&self) -> Option<i64> {
        if !self.is_variation() {
            return None;
        }
        self.parent_id.filter(|id| *id > 0)
    }

    /// Non-empty, trimmed meta value.
    pub fn meta_value(&self, key: &str) -> Option<&str> {
        self.meta
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Product #{}", self.id))
    }
}
