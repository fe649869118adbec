use axum::{
    extract::{Query, State},
    response::Html,
    routing::get,
    Router,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::middleware::{auth::current_viewer, session::AppState};
use crate::api::stream::login_redirect;
use crate::error::AppError;
use crate::services::entitlement::DEFAULT_PAGE_SIZE;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<u32>,
}

/// The viewer's purchased videos with watch links.
async fn my_videos(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, AppError> {
    let viewer = current_viewer(&session)
        .await
        .map_err(|_| AppError::Session("session read failed".into()))?
        .ok_or_else(|| {
            AppError::NotAuthenticated(login_redirect(
                &state.settings.login_url,
                "/my-account/videos",
            ))
        })?;

    let page = state
        .entitlements
        .list_for_user(viewer.user_id, query.page.unwrap_or(1), DEFAULT_PAGE_SIZE)
        .await?;

    let mut rows = String::new();
    for record in &page.records {
        let name = match state.catalog.product(record.product_id).await {
            Ok(Some(product)) => product.display_name(),
            _ => format!("Product #{}", record.product_id),
        };
        rows.push_str(&format!(
            r#"<tr><td>{}</td><td>{}</td><td><a href="/watch?product_id={}" class="button">Watch</a></td></tr>"#,
            html_escape::encode_text(&name),
            record.granted_at.format("%Y-%m-%d"),
            record.product_id
        ));
    }

    let body = if page.records.is_empty() {
        r#"<p class="empty">You have no videos yet.</p>"#.to_string()
    } else {
        format!(
            r#"<table><thead><tr><th>Video</th><th>Since</th><th></th></tr></thead><tbody>{}</tbody></table>{}"#,
            rows,
            pagination("/my-account/videos?", page.page, page.total_pages())
        )
    };

    let html = format!(
        r#"<!DOCTYPE html><html><head><title>My Videos</title><meta charset="UTF-8"><meta name="viewport" content="width=device-width, initial-scale=1.0"><style>body{{font-family:Arial,sans-serif;max-width:900px;margin:50px auto;padding:20px}}h1{{color:#333}}table{{width:100%;border-collapse:collapse}}td,th{{padding:10px;border-bottom:1px solid #ddd;text-align:left}}.button{{display:inline-block;background-color:#2196F3;color:white;padding:6px 14px;text-decoration:none;border-radius:4px}}.empty{{color:#666}}.pages a{{margin-right:8px}}</style></head><body><h1>My Videos</h1>{}</body></html>"#,
        body
    );

    Ok(Html(html))
}

/// Previous/next links; `base` ends with `?` or `&`.
pub fn pagination(base: &str, page: u32, total_pages: u32) -> String {
    if total_pages <= 1 {
        return String::new();
    }

    let mut links = String::from(r#"<div class="pages">"#);
    if page > 1 {
        links.push_str(&format!(r#"<a href="{}page={}">&laquo; Previous</a>"#, base, page - 1));
    }
    links.push_str(&format!("<span>Page {} of {}</span>", page, total_pages));
    if page < total_pages {
        links.push_str(&format!(r#"<a href="{}page={}">Next &raquo;</a>"#, base, page + 1));
    }
    links.push_str("</div>");
    links
}

pub fn router() -> Router<AppState> {
    Router::new().route("/my-account/videos", get(my_videos))
}
