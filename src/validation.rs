//! Input validation for the inspection API
//! Protects the pipeline from malformed VINs, media lists, and search inputs

use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;

use crate::constants::{
    MAX_CHUNK_CONTENT_LENGTH, MAX_MEDIA_ITEMS, MAX_SEARCH_LIMIT, MAX_SHOP_ID_LENGTH, VIN_LENGTH,
};
use crate::inspection::MediaItem;

lazy_static! {
    /// Restricted VIN alphabet: uppercase A-Z excluding I, O, Q, plus 0-9
    static ref VIN_PATTERN: Regex = Regex::new(r"^[A-HJ-NPR-Z0-9]{17}$").unwrap();
}

/// Validate a vehicle identification number
///
/// VINs are exactly 17 characters from the restricted alphanumeric set
/// (I, O, and Q are excluded because they read as 1 and 0).
pub fn validate_vin(vin: &str) -> Result<()> {
    if vin.len() != VIN_LENGTH {
        return Err(anyhow!(
            "VIN must be exactly {} characters, got {}",
            VIN_LENGTH,
            vin.len()
        ));
    }

    if !VIN_PATTERN.is_match(vin) {
        return Err(anyhow!(
            "VIN contains invalid characters (allowed: 0-9, A-Z excluding I/O/Q)"
        ));
    }

    Ok(())
}

/// Validate the media list attached to an inspection
pub fn validate_media(media: &[MediaItem]) -> Result<()> {
    if media.is_empty() {
        return Err(anyhow!("at least one media item is required"));
    }

    if media.len() > MAX_MEDIA_ITEMS {
        return Err(anyhow!(
            "too many media items: {} (max: {})",
            media.len(),
            MAX_MEDIA_ITEMS
        ));
    }

    for (idx, item) in media.iter().enumerate() {
        if item.url.trim().is_empty() {
            return Err(anyhow!("media[{idx}] has an empty url"));
        }
    }

    Ok(())
}

/// Validate a confidence threshold
pub fn validate_confidence_threshold(threshold: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(anyhow!(
            "confidence threshold must be between 0.0 and 1.0, got: {threshold}"
        ));
    }
    Ok(())
}

/// Validate a shop identifier
pub fn validate_shop_id(shop_id: &str) -> Result<()> {
    if shop_id.is_empty() {
        return Err(anyhow!("shop_id cannot be empty"));
    }

    if shop_id.len() > MAX_SHOP_ID_LENGTH {
        return Err(anyhow!(
            "shop_id too long: {} chars (max: {})",
            shop_id.len(),
            MAX_SHOP_ID_LENGTH
        ));
    }

    // Only allow alphanumeric, dash, underscore
    if !shop_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(anyhow!(
            "shop_id contains invalid characters (allowed: alphanumeric, -, _)"
        ));
    }

    Ok(())
}

/// Validate a similarity-search result limit
pub fn validate_search_limit(limit: usize) -> Result<()> {
    if limit == 0 {
        return Err(anyhow!("limit must be greater than 0"));
    }

    if limit > MAX_SEARCH_LIMIT {
        return Err(anyhow!("limit too large: {limit} (max: {MAX_SEARCH_LIMIT})"));
    }

    Ok(())
}

/// Validate knowledge-base chunk content
pub fn validate_chunk_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(anyhow!("content cannot be empty"));
    }

    if content.len() > MAX_CHUNK_CONTENT_LENGTH {
        return Err(anyhow!(
            "content too long: {} bytes (max: {})",
            content.len(),
            MAX_CHUNK_CONTENT_LENGTH
        ));
    }

    Ok(())
}
