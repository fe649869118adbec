//! Decides whether an order line item is a streamable VOD purchase.

use std::collections::HashMap;

use crate::models::product::PRODUCT_TYPE_VOD;

/// Line-item meta keys that carry the video format attribute.
pub const FORMAT_ATTRIBUTE_KEYS: [&str; 2] = ["attribute_pa_video_format", "pa_video_format"];

/// Format attribute values that include streaming access.
pub const STREAMING_FORMATS: [&str; 2] =
    ["video_format_streaming", "video_format_dvd_plus_streaming"];

/// Normalized view of a line item for classification.
#[derive(Debug, Clone, Copy)]
pub struct LineItemView<'a> {
    pub attributes: &'a HashMap<String, String>,
    pub product_type: Option<&'a str>,
}

/// A streaming format attribute wins; otherwise the declared product type
/// must be `vod`.
pub fn is_vod_item(item: &LineItemView<'_>) -> bool {
    if has_streaming_format(item.attributes) {
        return true;
    }

    item.product_type
        .map(|t| t.trim().eq_ignore_ascii_case(PRODUCT_TYPE_VOD))
        .unwrap_or(false)
}

fn has_streaming_format(attributes: &HashMap<String, String>) -> bool {
    FORMAT_ATTRIBUTE_KEYS.iter().any(|key| {
        attributes
            .get(*key)
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .map(|v| STREAMING_FORMATS.contains(&v.as_str()))
            .unwrap_or(false)
    })
}
