//! Turns a media token into an embeddable evidence image.
//!
//! Every failure along the way (lookup, download, non-image content) degrades
//! to a bundled placeholder so enrichment always produces a value.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::warn;

use crate::media::{MediaAsset, MediaGraphClient};

pub const PLACEHOLDER_IMAGE: &[u8] = include_bytes!("../../assets/evidence-placeholder.png");
pub const PLACEHOLDER_MIME: &str = "image/png";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceSource {
    Uploaded,
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
    pub source: EvidenceSource,
    pub mime: String,
    pub data_uri: String,
}

impl Evidence {
    pub fn placeholder() -> Self {
        Self {
            source: EvidenceSource::Placeholder,
            mime: PLACEHOLDER_MIME.to_string(),
            data_uri: data_uri(PLACEHOLDER_MIME, PLACEHOLDER_IMAGE),
        }
    }

    fn uploaded(mime: String, bytes: &[u8]) -> Self {
        Self {
            source: EvidenceSource::Uploaded,
            data_uri: data_uri(&mime, bytes),
            mime,
        }
    }
}

pub struct EvidenceResolver {
    media: MediaGraphClient,
}

impl EvidenceResolver {
    pub fn new(media: MediaGraphClient) -> Self {
        Self { media }
    }

    pub async fn resolve(&self, token: &str) -> Evidence {
        let url = match self.media.resolve(token).await {
            Ok(url) => url,
            Err(e) => {
                warn!(token = %token, error = %e, "Media lookup failed, using placeholder");
                return Evidence::placeholder();
            }
        };

        let asset = match self.media.download(&url).await {
            Ok(asset) => asset,
            Err(e) => {
                warn!(token = %token, error = %e, "Media download failed, using placeholder");
                return Evidence::placeholder();
            }
        };

        match image_mime(&asset) {
            Some(mime) => Evidence::uploaded(mime, &asset.bytes),
            None => {
                warn!(
                    token = %token,
                    content_type = ?asset.content_type,
                    "Media is not an image, using placeholder"
                );
                Evidence::placeholder()
            }
        }
    }
}

/// Image mime type of a download: the declared content type when present,
/// otherwise whatever the leading bytes identify.
pub fn image_mime(asset: &MediaAsset) -> Option<String> {
    if asset.bytes.is_empty() {
        return None;
    }

    match asset.content_type.as_deref() {
        Some(declared) => {
            let mime = declared
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();
            if mime.starts_with("image/") && mime.len() > "image/".len() {
                Some(mime)
            } else {
                None
            }
        }
        None => sniff_image(&asset.bytes).map(str::to_string),
    }
}

pub fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.starts_with(b"BM") {
        Some("image/bmp")
    } else {
        None
    }
}

pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}
