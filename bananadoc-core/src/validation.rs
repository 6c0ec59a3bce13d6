//! Request input checks, run before any model or LLM call.

use base64::Engine as _;
use regex::Regex;
use std::sync::OnceLock;

use crate::error::InputError;

pub const MAX_QUERY_CHARS: usize = 1000;
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

const JPEG_MAGIC: &[u8] = b"\xff\xd8";
const PNG_MAGIC: &[u8] = b"\x89PNG";

fn unsafe_markup() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<script|javascript:|onerror=|onload=").expect("static regex")
    })
}

fn deficiency_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z\s]+$").expect("static regex"))
}

pub fn validate_query(query: &str) -> Result<(), InputError> {
    if query.trim().is_empty() {
        return Err(InputError::EmptyQuery);
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(InputError::QueryTooLong {
            max: MAX_QUERY_CHARS,
        });
    }
    if unsafe_markup().is_match(query) {
        return Err(InputError::UnsafeQuery);
    }
    Ok(())
}

/// Decode a base64 image payload (optionally a `data:` URL) and check size and format.
pub fn decode_image_payload(image_data: &str) -> Result<Vec<u8>, InputError> {
    if image_data.trim().is_empty() {
        return Err(InputError::EmptyImage);
    }

    let encoded = match image_data.split_once(',') {
        Some((_, rest)) => rest,
        None => image_data,
    };

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| InputError::InvalidBase64(e.to_string()))?;

    if decoded.len() > MAX_IMAGE_BYTES {
        return Err(InputError::ImageTooLarge {
            max_mb: MAX_IMAGE_BYTES / (1024 * 1024),
        });
    }

    if !decoded.starts_with(JPEG_MAGIC) && !decoded.starts_with(PNG_MAGIC) {
        return Err(InputError::UnsupportedImageFormat);
    }

    Ok(decoded)
}

pub fn validate_deficiency_name(name: &str) -> Result<(), InputError> {
    if deficiency_name().is_match(name) {
        Ok(())
    } else {
        Err(InputError::InvalidDeficiencyName)
    }
}
