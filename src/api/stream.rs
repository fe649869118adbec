use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::middleware::{
    auth::{current_viewer, Viewer},
    session::AppState,
};
use crate::error::AppError;
use crate::services::delivery::no_store;
use crate::services::guard::{Authorized, ResolvedMedia};
use crate::services::locator::LocatorSource;
use crate::services::token::TokenError;

#[derive(Debug, Deserialize)]
pub struct WatchQuery {
    pub product_id: i64,
    #[serde(default)]
    pub force: Option<u8>,
    #[serde(default)]
    pub dbg: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub force: Option<u8>,
    #[serde(default)]
    pub dbg: Option<u8>,
}

/// Login URL that brings the visitor back to `return_to` afterwards.
pub fn login_redirect(login_url: &str, return_to: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(return_to.as_bytes()).collect();
    let separator = if login_url.contains('?') { '&' } else { '?' };
    format!("{}{}redirect_to={}", login_url, separator, encoded)
}

fn admin_force(viewer: Option<Viewer>, force: Option<u8>) -> bool {
    force == Some(1) && viewer.map(|v| v.is_admin).unwrap_or(false)
}

/// Player page for one product. Issues a short-lived stream token.
async fn watch_page(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<WatchQuery>,
) -> Result<Response, AppError> {
    let viewer = current_viewer(&session)
        .await
        .map_err(|_| AppError::Session("session read failed".into()))?;

    let Some(viewer) = viewer else {
        let return_to = format!("/watch?product_id={}", query.product_id);
        return Err(AppError::NotAuthenticated(login_redirect(
            &state.settings.login_url,
            &return_to,
        )));
    };

    let forced = admin_force(Some(viewer), query.force);
    let authorized = state
        .guard
        .authorize(viewer.user_id, query.product_id, forced)
        .await?;
    let media = state.guard.resolve(&authorized.product).await?;

    let token = state.tokens.issue(
        viewer.user_id,
        authorized.product.id,
        state.settings.token_ttl_secs,
    );
    let mut stream_url = format!("/stream?token={}", token);
    if authorized.forced {
        stream_url.push_str("&force=1");
    }

    let debug_panel = if state.settings.debug && query.dbg == Some(1) {
        render_debug_panel(&authorized, &media)
    } else {
        String::new()
    };

    tracing::info!(
        user_id = viewer.user_id,
        product_id = authorized.product.id,
        forced = authorized.forced,
        "Watch page issued stream token"
    );

    let html = render_player(
        &authorized.product.display_name(),
        &stream_url,
        media.locator.is_hls(),
        &debug_panel,
    );

    Ok(no_store(Html(html).into_response()))
}

fn render_player(title: &str, stream_url: &str, is_hls: bool, debug_panel: &str) -> String {
    let title = html_escape::encode_text(title);
    let player = if is_hls {
        format!(
            r#"<video id="vod-player" controls playsinline></video><script src="https://cdn.jsdelivr.net/npm/hls.js@1"></script><script>(function(){{var v=document.getElementById('vod-player');var src='{src}';if(v.canPlayType('application/vnd.apple.mpegurl')){{v.src=src;}}else if(window.Hls&&Hls.isSupported()){{var h=new Hls();h.loadSource(src);h.attachMedia(v);}}}})();</script>"#,
            src = stream_url
        )
    } else {
        format!(
            r#"<video id="vod-player" controls playsinline controlsList="nodownload" src="{}"></video>"#,
            stream_url
        )
    };

    format!(
        r#"<!DOCTYPE html><html><head><title>{title}</title><meta charset="UTF-8"><meta name="viewport" content="width=device-width, initial-scale=1.0"><style>body{{font-family:Arial,sans-serif;max-width:960px;margin:40px auto;padding:20px}}h1{{color:#333}}video{{width:100%;background:#000;border-radius:4px}}.debug{{background:#fff8e1;border-left:4px solid #ffb300;padding:10px 15px;margin-top:20px;font-family:monospace;font-size:13px}}</style></head><body><h1>{title}</h1>{player}{debug}<p><a href="/my-account/videos">Back to my videos</a></p></body></html>"#,
        title = title,
        player = player,
        debug = debug_panel
    )
}

fn render_debug_panel(authorized: &Authorized, media: &ResolvedMedia) -> String {
    let candidates = authorized
        .candidates
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let source = match media.resolution.source {
        Some(LocatorSource::Product) => "product",
        Some(LocatorSource::Parent) => "parent",
        None => "none",
    };

    format!(
        r#"<div class="debug"><p>candidates: {}</p><p>locator key: {} ({})</p><p>checked: {}</p><p>forced: {}</p></div>"#,
        candidates,
        media.resolution.key.unwrap_or("-"),
        source,
        html_escape::encode_text(&media.resolution.checked_keys.join(", ")),
        authorized.forced
    )
}

/// Byte endpoint. Every response, including errors, is marked uncacheable.
async fn stream(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Response {
    no_store(stream_media(&state, &session, &headers, query).await.into_response())
}

async fn stream_media(
    state: &AppState,
    session: &Session,
    headers: &HeaderMap,
    query: StreamQuery,
) -> Result<Response, AppError> {
    let viewer = current_viewer(session)
        .await
        .map_err(|_| AppError::Session("session read failed".into()))?;

    let (user_id, product_id) = match (&query.token, viewer) {
        (Some(token), viewer) => {
            let payload = state.tokens.verify(token)?;
            if let Some(viewer) = viewer {
                if viewer.user_id != payload.u {
                    tracing::warn!(
                        session_user = viewer.user_id,
                        token_user = payload.u,
                        "Stream token presented by a different user"
                    );
                    return Err(TokenError::UserMismatch.into());
                }
            }
            (payload.u, payload.p)
        }
        (None, Some(viewer)) => {
            let product_id = query
                .product_id
                .ok_or_else(|| AppError::Validation("product_id is required".into()))?;
            (viewer.user_id, product_id)
        }
        (None, None) => {
            let return_to = match query.product_id {
                Some(id) => format!("/watch?product_id={}", id),
                None => "/my-account/videos".to_string(),
            };
            return Err(AppError::NotAuthenticated(login_redirect(
                &state.settings.login_url,
                &return_to,
            )));
        }
    };

    let authorized = state
        .guard
        .authorize(user_id, product_id, admin_force(viewer, query.force))
        .await?;
    let media = state.guard.resolve(&authorized.product).await?;

    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    tracing::debug!(user_id, product_id, range, "Delivering stream");

    let mut response = state.guard.deliver(&media.locator, range).await?;

    if state.settings.debug && query.dbg == Some(1) {
        let candidates = authorized
            .candidates
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        if let Ok(value) = HeaderValue::from_str(&candidates) {
            response.headers_mut().insert("x-vod-candidates", value);
        }
        if let Some(key) = media.resolution.key {
            response
                .headers_mut()
                .insert("x-vod-locator-key", HeaderValue::from_static(key));
        }
    }

    Ok(response)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/watch", get(watch_page))
        .route("/stream", get(stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_redirect_encodes_return_path() {
        assert_eq!(
            login_redirect("/login", "/watch?product_id=7"),
            "/login?redirect_to=%2Fwatch%3Fproduct_id%3D7"
        );
        assert_eq!(
            login_redirect("/wp-login.php?action=login", "/my-account/videos"),
            "/wp-login.php?action=login&redirect_to=%2Fmy-account%2Fvideos"
        );
    }

    #[test]
    fn test_force_requires_admin() {
        let admin = Viewer {
            user_id: 1,
            is_admin: true,
        };
        let member = Viewer {
            user_id: 2,
            is_admin: false,
        };
        assert!(admin_force(Some(admin), Some(1)));
        assert!(!admin_force(Some(admin), None));
        assert!(!admin_force(Some(member), Some(1)));
        assert!(!admin_force(None, Some(1)));
    }
}
