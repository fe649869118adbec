use axum::{
    extract::{Query, State},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::account::pagination;
use crate::api::middleware::{
    auth::{get_authenticated_viewer, require_admin},
    session::{AppState, SESSION_KEY_CSRF_TOKEN},
};
use crate::error::AppError;
use crate::models::{order_reason, AuditEntry};
use crate::services::entitlement::DEFAULT_PAGE_SIZE;

#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub err: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AccessForm {
    pub user_id: i64,
    pub product_id: i64,
    #[serde(default)]
    pub reason: Option<String>,
    pub csrf_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkMode {
    Grant,
    Revoke,
}

#[derive(Debug, Deserialize)]
pub struct BulkForm {
    pub user_id: i64,
    pub order_id: i64,
    /// Comma separated product ids.
    pub product_ids: String,
    pub mode: BulkMode,
    #[serde(default)]
    pub reason: Option<String>,
    pub csrf_token: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub user_id: i64,
    pub product_id: i64,
}

/// Returns the session CSRF token, creating one on first use.
async fn csrf_token(session: &Session) -> Result<String, AppError> {
    if let Some(token) = session.get::<String>(SESSION_KEY_CSRF_TOKEN).await? {
        return Ok(token);
    }
    let token = Uuid::new_v4().simple().to_string();
    session.insert(SESSION_KEY_CSRF_TOKEN, &token).await?;
    Ok(token)
}

async fn check_csrf(session: &Session, submitted: &str) -> Result<(), AppError> {
    let expected: Option<String> = session.get(SESSION_KEY_CSRF_TOKEN).await?;
    match expected {
        Some(expected) if tokens_match(&expected, submitted) => Ok(()),
        _ => {
            tracing::warn!("Admin form submitted with a bad CSRF token");
            Err(AppError::Validation("Invalid form token. Reload and try again.".into()))
        }
    }
}

fn tokens_match(expected: &str, submitted: &str) -> bool {
    !submitted.is_empty()
        && ring::constant_time::verify_slices_are_equal(expected.as_bytes(), submitted.as_bytes())
            .is_ok()
}

/// Parses `"7, 8,9"` into ids, rejecting anything that is not a positive integer.
pub fn parse_product_ids(raw: &str) -> Result<Vec<i64>, String> {
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.parse::<i64>() {
            Ok(id) if id > 0 => {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            _ => return Err(format!("Invalid product id: {}", part)),
        }
    }
    if ids.is_empty() {
        return Err("No product ids given".into());
    }
    Ok(ids)
}

fn back_to(user_id: i64, key: &str, message: &str) -> Response {
    let encoded: String = url::form_urlencoded::byte_serialize(message.as_bytes()).collect();
    Redirect::to(&format!("/admin/access?user_id={}&{}={}", user_id, key, encoded)).into_response()
}

async fn access_page(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<AccessQuery>,
) -> Result<Html<String>, AppError> {
    let csrf = csrf_token(&session).await?;

    let notice = match (&query.msg, &query.err) {
        (_, Some(err)) => format!(r#"<p class="err">{}</p>"#, html_escape::encode_text(err)),
        (Some(msg), None) => format!(r#"<p class="msg">{}</p>"#, html_escape::encode_text(msg)),
        _ => String::new(),
    };

    let user_section = match query.user_id.filter(|id| *id > 0) {
        Some(user_id) => {
            let page = state
                .entitlements
                .list_for_user(user_id, query.page.unwrap_or(1), DEFAULT_PAGE_SIZE)
                .await?;

            let rows: String = page
                .records
                .iter()
                .map(|record| {
                    format!(
                        r#"<tr><td>{pid}</td><td>{granted}</td><td><form method="POST" action="/admin/access/revoke"><input type="hidden" name="user_id" value="{uid}"><input type="hidden" name="product_id" value="{pid}"><input type="hidden" name="csrf_token" value="{csrf}"><input type="text" name="reason" placeholder="Reason"><button type="submit">Revoke</button></form></td></tr>"#,
                        pid = record.product_id,
                        granted = record.granted_at.format("%Y-%m-%d %H:%M UTC"),
                        uid = user_id,
                        csrf = csrf
                    )
                })
                .collect();

            format!(
                r#"<h2>User #{uid} ({total} entitlements)</h2><table><thead><tr><th>Product</th><th>Granted</th><th></th></tr></thead><tbody>{rows}</tbody></table>{pages}<h3>Grant access</h3><form method="POST" action="/admin/access/grant"><input type="hidden" name="user_id" value="{uid}"><input type="hidden" name="csrf_token" value="{csrf}"><input type="number" name="product_id" placeholder="Product ID" required><input type="text" name="reason" placeholder="Reason"><button type="submit">Grant</button></form><h3>By order</h3><form method="POST" action="/admin/access/bulk"><input type="hidden" name="user_id" value="{uid}"><input type="hidden" name="csrf_token" value="{csrf}"><input type="number" name="order_id" placeholder="Order ID" required><input type="text" name="product_ids" placeholder="Product IDs, comma separated" required><select name="mode"><option value="grant">Grant</option><option value="revoke">Revoke</option></select><input type="text" name="reason" placeholder="Reason"><button type="submit">Apply</button></form>"#,
                uid = user_id,
                total = page.total,
                rows = rows,
                pages = pagination(&format!("/admin/access?user_id={}&", user_id), page.page, page.total_pages()),
                csrf = csrf
            )
        }
        None => String::new(),
    };

    let html = format!(
        r#"<!DOCTYPE html><html><head><title>VOD Access</title><meta charset="UTF-8"><style>body{{font-family:Arial,sans-serif;max-width:1000px;margin:40px auto;padding:20px}}table{{width:100%;border-collapse:collapse;margin:15px 0}}td,th{{padding:8px;border-bottom:1px solid #ddd;text-align:left}}form{{display:inline}}input,select{{padding:6px;margin-right:6px}}.msg{{background:#e8f5e9;padding:10px}}.err{{background:#ffebee;padding:10px}}</style></head><body><h1>VOD Access</h1>{notice}<form method="GET" action="/admin/access"><input type="number" name="user_id" placeholder="User ID" value="{uid}"><button type="submit">Look up</button></form>{section}</body></html>"#,
        notice = notice,
        uid = query.user_id.map(|id| id.to_string()).unwrap_or_default(),
        section = user_section
    );

    Ok(Html(html))
}

async fn grant_access(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<AccessForm>,
) -> Result<Response, AppError> {
    check_csrf(&session, &form.csrf_token).await?;
    let admin = get_authenticated_viewer(&session)
        .await
        .map_err(|_| AppError::Unauthorized)?;

    if form.user_id <= 0 || form.product_id <= 0 {
        return Ok(back_to(form.user_id, "err", "User and product ids must be positive."));
    }

    let reason = form.reason.as_deref().unwrap_or("").trim();
    let reason = if reason.is_empty() { "admin grant" } else { reason };

    if state
        .entitlements
        .grant(form.user_id, form.product_id, reason, admin.user_id)
        .await
    {
        Ok(back_to(
            form.user_id,
            "msg",
            &format!("Granted product #{}.", form.product_id),
        ))
    } else {
        Ok(back_to(form.user_id, "err", "Grant failed. See server logs."))
    }
}

async fn revoke_access(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<AccessForm>,
) -> Result<Response, AppError> {
    check_csrf(&session, &form.csrf_token).await?;
    let admin = get_authenticated_viewer(&session)
        .await
        .map_err(|_| AppError::Unauthorized)?;

    if form.user_id <= 0 || form.product_id <= 0 {
        return Ok(back_to(form.user_id, "err", "User and product ids must be positive."));
    }

    let reason = form.reason.as_deref().unwrap_or("").trim();
    let reason = if reason.is_empty() { "admin revoke" } else { reason };

    if state
        .entitlements
        .revoke(form.user_id, form.product_id, reason, admin.user_id)
        .await
    {
        Ok(back_to(
            form.user_id,
            "msg",
            &format!("Revoked product #{}.", form.product_id),
        ))
    } else {
        Ok(back_to(form.user_id, "err", "Revoke failed. See server logs."))
    }
}

async fn bulk_access(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<BulkForm>,
) -> Result<Response, AppError> {
    check_csrf(&session, &form.csrf_token).await?;
    let admin = get_authenticated_viewer(&session)
        .await
        .map_err(|_| AppError::Unauthorized)?;

    if form.user_id <= 0 || form.order_id <= 0 {
        return Ok(back_to(form.user_id, "err", "User and order ids must be positive."));
    }
    let ids = match parse_product_ids(&form.product_ids) {
        Ok(ids) => ids,
        Err(e) => return Ok(back_to(form.user_id, "err", &e)),
    };

    let reason = order_reason(form.order_id, form.reason.as_deref().unwrap_or(""));
    let mut failed = Vec::new();
    for &product_id in &ids {
        let ok = match form.mode {
            BulkMode::Grant => {
                state
                    .entitlements
                    .grant(form.user_id, product_id, &reason, admin.user_id)
                    .await
            }
            BulkMode::Revoke => {
                state
                    .entitlements
                    .revoke(form.user_id, product_id, &reason, admin.user_id)
                    .await
            }
        };
        if !ok {
            failed.push(product_id);
        }
    }

    tracing::info!(
        admin_id = admin.user_id,
        user_id = form.user_id,
        order_id = form.order_id,
        mode = ?form.mode,
        count = ids.len(),
        failed = failed.len(),
        "Bulk access change"
    );

    if failed.is_empty() {
        let verb = match form.mode {
            BulkMode::Grant => "Granted",
            BulkMode::Revoke => "Revoked",
        };
        Ok(back_to(
            form.user_id,
            "msg",
            &format!("{} {} product(s) for order #{}.", verb, ids.len(), form.order_id),
        ))
    } else {
        let failed: Vec<String> = failed.iter().map(|id| id.to_string()).collect();
        Ok(back_to(
            form.user_id,
            "err",
            &format!("Failed for product(s): {}", failed.join(", ")),
        ))
    }
}

/// Audit rows for one user/product pair, oldest first.
async fn audit_trail(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    let entries = state
        .entitlements
        .audit_trail(query.user_id, query.product_id)
        .await?;
    Ok(Json(entries))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/access", get(access_page))
        .route("/admin/access/grant", post(grant_access))
        .route("/admin/access/revoke", post(revoke_access))
        .route("/admin/access/bulk", post(bulk_access))
        .route("/admin/access/audit", get(audit_trail))
        .route_layer(middleware::from_fn(require_admin))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_product_ids() {
        assert_eq!(parse_product_ids("7, 8,7 ,9,"), Ok(vec![7, 8, 9]));
        assert!(parse_product_ids("7,abc").is_err());
        assert!(parse_product_ids("0").is_err());
        assert!(parse_product_ids(" , ").is_err());
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("3f1c-token", "3f1c-token"));
        assert!(!tokens_match("3f1c-token", "3f1c-tokeN"));
        assert!(!tokens_match("3f1c-token", "3f1c"));
        assert!(!tokens_match("", ""));
    }
}
