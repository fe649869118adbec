use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use secrecy::ExposeSecret;

use crate::api::middleware::session::AppState;
use crate::error::AppError;
use crate::models::{Order, OrderEvent};
use crate::services::commerce::EventOutcome;
use crate::services::signature;

/// Header carrying the hex HMAC-SHA256 of the raw request body.
pub const SIGNATURE_HEADER: &str = "x-vod-signature";

/// Receives an order lifecycle event from the commerce platform.
///
/// The platform applies `complete_order` itself; this service only touches
/// entitlements.
async fn order_event(
    State(state): State<AppState>,
    Path(event): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EventOutcome>, AppError> {
    let event: OrderEvent = event.parse().map_err(AppError::Validation)?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    if !signature::verify(
        &body,
        signature,
        state.webhook_secret.expose_secret().as_bytes(),
    ) {
        tracing::warn!(event = %event, "Rejected order hook with bad signature");
        return Err(AppError::Unauthorized);
    }

    let order: Order = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid order payload: {}", e)))?;

    Ok(Json(state.commerce.handle(event, &order).await))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/hooks/orders/:event", post(order_event))
}
