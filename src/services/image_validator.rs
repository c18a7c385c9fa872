use std::borrow::Cow;
use std::sync::LazyLock;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::ImageFormat;
use regex::bytes::Regex;

/// File extensions accepted for item photos.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpeg", "png", "jpg"];

/// `data:image/<type>;base64,` header some clients send instead of raw bytes.
static DATA_URI_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^data:image/[a-zA-Z]+;base64,").unwrap());

/// An upload that passed validation, holding the bytes that should be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedImage {
    pub data: Vec<u8>,
    pub format: ImageFormat,
}

impl ValidatedImage {
    pub fn content_type(&self) -> &'static str {
        match self.format {
            ImageFormat::Png => "image/png",
            _ => "image/jpeg",
        }
    }
}

/// True when `data` is a complete JPEG or PNG and `filename` (if any) carries a
/// supported extension. Never fails; every problem is a `false`.
pub fn validate(data: &[u8], filename: Option<&str>) -> bool {
    inspect(data, filename).is_some()
}

/// Like [`validate`] but returns the normalized bytes and detected format.
pub fn inspect(data: &[u8], filename: Option<&str>) -> Option<ValidatedImage> {
    if let Some(name) = filename {
        if !has_supported_extension(name) {
            tracing::info!("Rejected upload {}: unsupported image format", name);
            return None;
        }
    }

    let content = normalize(data);
    match verify(&content) {
        Ok(format) => {
            tracing::debug!("Image successfully verified: format={:?}", format);
            Some(ValidatedImage {
                data: content.into_owned(),
                format,
            })
        }
        Err(reason) => {
            tracing::info!(
                "Rejected upload {}: {}",
                filename.unwrap_or("<unnamed>"),
                reason
            );
            None
        }
    }
}

/// Decodes a base64 data-URI payload. Anything else, including a data URI whose
/// payload fails to decode, is returned untouched.
pub fn normalize(data: &[u8]) -> Cow<'_, [u8]> {
    let Some(header) = DATA_URI_HEADER.find(data) else {
        return Cow::Borrowed(data);
    };

    let payload: Vec<u8> = data[header.end()..]
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    match BASE64.decode(payload) {
        Ok(decoded) => {
            tracing::debug!("Base64 header detected, decoded {} bytes", decoded.len());
            Cow::Owned(decoded)
        }
        Err(e) => {
            tracing::warn!("Failed to decode base64 image, using raw bytes: {}", e);
            Cow::Borrowed(data)
        }
    }
}

fn has_supported_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Sniffs the format and fully decodes the image so truncated or corrupted
/// payloads are caught before they reach storage.
fn verify(content: &[u8]) -> Result<ImageFormat, String> {
    let format =
        image::guess_format(content).map_err(|e| format!("unidentified image: {}", e))?;
    if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
        return Err(format!("unsupported image content: {:?}", format));
    }

    image::load_from_memory_with_format(content, format)
        .map_err(|e| format!("image failed to decode: {}", e))?;
    Ok(format)
}
