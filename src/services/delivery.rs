//! Byte delivery for authorized stream requests.

use std::io;
use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use futures::TryStreamExt;
use serde::Deserialize;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use url::Url;

use crate::services::range::parse_range;

/// Read buffer size for local file bodies.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Response headers never copied from an upstream origin.
const SKIPPED_UPSTREAM_HEADERS: [&str; 10] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "set-cookie",
    "cache-control",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Send the client to the origin URL.
    #[default]
    Redirect,
    /// Relay the origin response through this server.
    Proxy,
}

#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("Media path escapes the storage root")]
    PathTraversalRejected,

    #[error("Media file not found")]
    NotFound,

    #[error("Media file unreadable: {0}")]
    FileUnreadable(#[from] io::Error),

    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),
}

/// Resolves `locator` against `root` and insists the canonical result stays
/// inside the canonical root.
pub async fn resolve_local_path(root: &Path, locator: &Path) -> Result<PathBuf, DeliveryError> {
    let root = tokio::fs::canonicalize(root)
        .await
        .map_err(|_| DeliveryError::NotFound)?;

    let joined = if locator.is_absolute() {
        locator.to_path_buf()
    } else {
        root.join(locator)
    };

    let resolved = tokio::fs::canonicalize(&joined)
        .await
        .map_err(|_| DeliveryError::NotFound)?;

    if !resolved.starts_with(&root) {
        tracing::warn!(
            locator = %locator.display(),
            resolved = %resolved.display(),
            "Rejected media path outside storage root"
        );
        return Err(DeliveryError::PathTraversalRejected);
    }

    Ok(resolved)
}

/// Serves a file under `root`, honouring a single byte range.
///
/// The client's range is normalised first so multi-range and malformed
/// headers fall back to a full response, and an end past EOF is clamped.
#[tracing::instrument(skip(root))]
pub async fn serve_file(
    root: &Path,
    locator: &Path,
    range_header: Option<&str>,
) -> Result<Response, DeliveryError> {
    let path = resolve_local_path(root, locator).await?;

    let metadata = tokio::fs::metadata(&path).await?;
    if !metadata.is_file() {
        return Err(DeliveryError::NotFound);
    }
    let total = metadata.len();

    let mut request = Request::new(Body::empty());
    if let Some(range) = parse_range(range_header, total).to_header(total) {
        if let Ok(value) = HeaderValue::from_str(&range) {
            request.headers_mut().insert(header::RANGE, value);
        }
    }

    tracing::debug!(path = %path.display(), total, "Streaming media file");

    let response = match ServeFile::new(&path)
        .with_buf_chunk_size(CHUNK_SIZE)
        .oneshot(request)
        .await
    {
        Ok(response) => response,
        Err(never) => match never {},
    };

    Ok(response.map(Body::new))
}

pub fn redirect(url: &Url) -> Response {
    Redirect::temporary(url.as_str()).into_response()
}

/// Relays `url` through this server, forwarding the client's `Range` header.
#[tracing::instrument(skip(client))]
pub async fn proxy(
    client: &reqwest::Client,
    url: &Url,
    range_header: Option<&str>,
) -> Result<Response, DeliveryError> {
    let mut request = client.get(url.as_str());
    if let Some(range) = range_header {
        request = request.header(reqwest::header::RANGE, range);
    }

    let upstream = request.send().await.map_err(|e| {
        tracing::error!(error = %e, "Upstream request failed");
        DeliveryError::UpstreamFailure(e.to_string())
    })?;

    let upstream_status = upstream.status().as_u16();
    if upstream_status >= 500 {
        return Err(DeliveryError::UpstreamFailure(format!(
            "origin returned HTTP {}",
            upstream_status
        )));
    }

    let status = StatusCode::from_u16(upstream_status)
        .map_err(|e| DeliveryError::UpstreamFailure(e.to_string()))?;

    let mut headers = HeaderMap::new();
    for (name, value) in upstream.headers() {
        if SKIPPED_UPSTREAM_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }

    tracing::debug!(status = upstream_status, "Relaying upstream response");

    let body = Body::from_stream(upstream.bytes_stream().map_err(io::Error::other));

    Ok((status, headers, body).into_response())
}

/// Marks a response as uncacheable by browsers and intermediaries.
pub fn no_store(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    response
}
