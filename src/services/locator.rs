//! Finds the media locator configured on a product.

use std::path::PathBuf;

use url::Url;

use crate::models::Product;

/// Meta keys probed in order; several historical naming conventions are in use.
pub const LOCATOR_KEYS: [&str; 7] = [
    "_vod_stream_url",
    "_video_url",
    "_video_src",
    "_stream_url",
    "_vod_mp4_url",
    "_vod_s3_url",
    "_dsi_vod_stream_url",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorSource {
    Product,
    Parent,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub locator: Option<String>,
    pub source: Option<LocatorSource>,
    pub key: Option<&'static str>,
    /// Every key looked at, parent keys prefixed with `parent:`.
    pub checked_keys: Vec<String>,
}

/// Probes [`LOCATOR_KEYS`] on the product, then on the parent of a variation.
/// The first non-empty value wins.
pub fn resolve_locator(product: &Product, parent: Option<&Product>) -> Resolution {
    let mut resolution = Resolution::default();

    if probe(product, LocatorSource::Product, &mut resolution) {
        return resolution;
    }

    if let Some(parent) = parent.filter(|_| product.is_variation()) {
        probe(parent, LocatorSource::Parent, &mut resolution);
    }

    resolution
}

fn probe(product: &Product, source: LocatorSource, resolution: &mut Resolution) -> bool {
    for key in LOCATOR_KEYS {
        resolution.checked_keys.push(match source {
            LocatorSource::Product => key.to_string(),
            LocatorSource::Parent => format!("parent:{}", key),
        });

        if let Some(value) = product.meta_value(key) {
            resolution.locator = Some(value.to_string());
            resolution.source = Some(source);
            resolution.key = Some(key);
            return true;
        }
    }
    false
}

/// Where the bytes for a locator come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaLocator {
    Remote(Url),
    Local(PathBuf),
}

impl MediaLocator {
    /// Absolute http(s) URLs with a host are remote; anything else is a path
    /// under the storage root.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {
                MediaLocator::Remote(url)
            }
            _ => MediaLocator::Local(PathBuf::from(raw)),
        }
    }

    pub fn is_hls(&self) -> bool {
        match self {
            MediaLocator::Remote(url) => url.path().to_ascii_lowercase().ends_with(".m3u8"),
            MediaLocator::Local(path) => path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("m3u8"))
                .unwrap_or(false),
        }
    }
}
