use std::sync::Arc;

use secrecy::Secret;
use sqlx::PgPool;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::VodSettings;
use crate::services::catalog::Catalog;
use crate::services::commerce::CommerceAdapter;
use crate::services::entitlement::EntitlementService;
use crate::services::guard::StreamGuard;
use crate::services::token::TokenSigner;

/// Session keys written by the platform's login bridge.
pub const SESSION_KEY_USER_ID: &str = "user_id";
pub const SESSION_KEY_IS_ADMIN: &str = "is_admin";
/// Written here for the admin forms.
pub const SESSION_KEY_CSRF_TOKEN: &str = "csrf_token";

/// Creates a session layer for Axum
pub async fn create_session_layer(
    pool: PgPool,
) -> Result<SessionManagerLayer<PostgresStore>, sqlx::Error> {
    let session_store = PostgresStore::new(pool);
    session_store.migrate().await?;

    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(true) // Only send over HTTPS in production
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(24)));

    Ok(session_layer)
}

/// Shared handles for every HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub entitlements: EntitlementService,
    pub catalog: Arc<dyn Catalog>,
    pub tokens: Arc<TokenSigner>,
    pub guard: StreamGuard,
    pub commerce: CommerceAdapter,
    pub settings: VodSettings,
    pub webhook_secret: Secret<String>,
}

impl AppState {
    /// Wires the services around one store and one catalog.
    pub fn new(
        entitlements: EntitlementService,
        catalog: Arc<dyn Catalog>,
        tokens: TokenSigner,
        settings: VodSettings,
        webhook_secret: Secret<String>,
        client: reqwest::Client,
    ) -> Self {
        let guard = StreamGuard::new(
            entitlements.clone(),
            catalog.clone(),
            settings.clone(),
            client,
        );
        let commerce = CommerceAdapter::new(entitlements.clone(), catalog.clone());

        Self {
            entitlements,
            catalog,
            tokens: Arc::new(tokens),
            guard,
            commerce,
            settings,
            webhook_secret,
        }
    }
}
