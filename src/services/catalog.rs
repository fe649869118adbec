use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::models::Product;

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Catalog API error: HTTP {status}: {message}")]
    ApiError { status: u16, message: String },
}

/// Read access to the product catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn product(&self, id: i64) -> Result<Option<Product>, CatalogError>;
}

/// Catalog backed by the store's REST API (`/wp-json/wc/v3/products/{id}`).
pub struct RestCatalog {
    client: Client,
    api_base_url: String,
    consumer_key: String,
    consumer_secret: Secret<String>,
}

#[derive(Debug, Deserialize)]
struct ApiProduct {
    id: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    product_type: String,
    #[serde(default)]
    parent_id: i64,
    #[serde(default)]
    variations: Vec<i64>,
    #[serde(default)]
    meta_data: Vec<ApiMeta>,
}

#[derive(Debug, Deserialize)]
struct ApiMeta {
    key: String,
    #[serde(default)]
    value: JsonValue,
}

impl From<ApiProduct> for Product {
    fn from(api: ApiProduct) -> Self {
        let meta = api
            .meta_data
            .into_iter()
            .filter_map(|m| {
                let value = match m.value {
                    JsonValue::String(s) => s,
                    JsonValue::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some((m.key, value))
            })
            .collect();

        Product {
            id: api.id,
            name: api.name,
            product_type: api.product_type,
            parent_id: (api.parent_id > 0).then_some(api.parent_id),
            children: api.variations,
            meta,
        }
    }
}

impl RestCatalog {
    pub fn new(
        client: Client,
        api_base_url: &str,
        consumer_key: String,
        consumer_secret: Secret<String>,
    ) -> Self {
        Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            consumer_key,
            consumer_secret,
        }
    }
}

#[async_trait]
impl Catalog for RestCatalog {
    #[tracing::instrument(skip(self))]
    async fn product(&self, id: i64) -> Result<Option<Product>, CatalogError> {
        if id <= 0 {
            return Ok(None);
        }

        let url = format!("{}/wp-json/wc/v3/products/{}", self.api_base_url, id);

        let response = self
            .client
            .get(&url)
            .basic_auth(
                &self.consumer_key,
                Some(self.consumer_secret.expose_secret()),
            )
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let product: ApiProduct = response.json().await?;
                tracing::debug!(product_id = id, product_type = %product.product_type, "Loaded product");
                Ok(Some(product.into()))
            }
            StatusCode::NOT_FOUND => Ok(None),
            other => {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                tracing::error!(status = %other, error = %message, "Catalog API request failed");
                Err(CatalogError::ApiError {
                    status: other.as_u16(),
                    message,
                })
            }
        }
    }
}

/// Fixed catalog held in memory.
#[derive(Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<i64, Product>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let catalog = Self::new();
        for product in products {
            catalog.insert(product);
        }
        catalog
    }

    pub fn insert(&self, product: Product) {
        let mut products = self
            .products
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        products.insert(product.id, product);
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn product(&self, id: i64) -> Result<Option<Product>, CatalogError> {
        let products = self
            .products
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(products.get(&id).cloned())
    }
}
