//! Authorization and media resolution for stream requests.

use std::sync::Arc;

use axum::response::Response;

use crate::config::VodSettings;
use crate::models::Product;
use crate::services::candidates::candidate_ids;
use crate::services::catalog::{Catalog, CatalogError};
use crate::services::delivery::{self, DeliveryError, DeliveryMode};
use crate::services::entitlement::EntitlementService;
use crate::services::locator::{resolve_locator, MediaLocator, Resolution};

#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    #[error("Product not found")]
    ProductNotFound,

    #[error("No access to product")]
    Forbidden,

    #[error("No media locator configured")]
    NoLocatorConfigured { checked_keys: Option<Vec<String>> },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// A product the viewer may watch.
#[derive(Debug, Clone)]
pub struct Authorized {
    pub product: Product,
    pub candidates: Vec<i64>,
    /// Set when access came from the admin override rather than an entitlement.
    pub forced: bool,
}

/// A locator ready for delivery, with the probe that found it.
#[derive(Debug, Clone)]
pub struct ResolvedMedia {
    pub locator: MediaLocator,
    pub resolution: Resolution,
}

#[derive(Clone)]
pub struct StreamGuard {
    entitlements: EntitlementService,
    catalog: Arc<dyn Catalog>,
    settings: VodSettings,
    client: reqwest::Client,
}

impl StreamGuard {
    pub fn new(
        entitlements: EntitlementService,
        catalog: Arc<dyn Catalog>,
        settings: VodSettings,
        client: reqwest::Client,
    ) -> Self {
        Self {
            entitlements,
            catalog,
            settings,
            client,
        }
    }

    /// Checks that `user_id` holds an entitlement for the product or one of
    /// its related ids. `admin_force` bypasses the check.
    #[tracing::instrument(skip(self))]
    pub async fn authorize(
        &self,
        user_id: i64,
        product_id: i64,
        admin_force: bool,
    ) -> Result<Authorized, StreamError> {
        let product = self
            .catalog
            .product(product_id)
            .await?
            .ok_or(StreamError::ProductNotFound)?;

        let candidates = candidate_ids(&product);

        if admin_force {
            tracing::info!(user_id, product_id, "Admin override for stream access");
            return Ok(Authorized {
                product,
                candidates,
                forced: true,
            });
        }

        if !self.entitlements.has_access_any(user_id, &candidates).await {
            tracing::info!(user_id, product_id, ?candidates, "Stream access denied");
            return Err(StreamError::Forbidden);
        }

        Ok(Authorized {
            product,
            candidates,
            forced: false,
        })
    }

    /// Finds the media locator, falling back to the parent of a variation.
    pub async fn resolve(&self, product: &Product) -> Result<ResolvedMedia, StreamError> {
        let parent = match product.parent() {
            Some(parent_id) => self.catalog.product(parent_id).await?,
            None => None,
        };

        let resolution = resolve_locator(product, parent.as_ref());

        match resolution.locator.as_deref() {
            Some(raw) => Ok(ResolvedMedia {
                locator: MediaLocator::parse(raw),
                resolution,
            }),
            None => {
                tracing::warn!(
                    product_id = product.id,
                    checked = resolution.checked_keys.len(),
                    "No media locator configured"
                );
                Err(StreamError::NoLocatorConfigured {
                    checked_keys: self.settings.debug.then_some(resolution.checked_keys),
                })
            }
        }
    }

    /// Produces the byte response for a resolved locator.
    pub async fn deliver(
        &self,
        locator: &MediaLocator,
        range_header: Option<&str>,
    ) -> Result<Response, StreamError> {
        let response = match locator {
            MediaLocator::Remote(url) => match self.settings.delivery_mode {
                DeliveryMode::Redirect => delivery::redirect(url),
                DeliveryMode::Proxy => delivery::proxy(&self.client, url, range_header).await?,
            },
            MediaLocator::Local(path) => {
                delivery::serve_file(&self.settings.storage_root, path, range_header).await?
            }
        };

        Ok(response)
    }
}
