//! Upload validation: size ceiling, declared type and magic-byte sniffing

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Maximum accepted upload (10 MiB)
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Bytes inspected when sniffing the real file type
pub const SNIFF_WINDOW: usize = 4100;

/// Declared content types accepted for uploads
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/gif",
];

/// What to do when sniffing cannot classify the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SniffPolicy {
    /// Accept if the declared type already passed
    #[default]
    Lenient,
    /// Reject anything the signature table does not recognise
    Strict,
}

/// An uploaded file as received from the client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// Format detected from the leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedType {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
    Tiff,
    Ico,
    Avif,
    Heic,
    Pdf,
    Zip,
    Gzip,
    Elf,
    Exe,
    Mp4,
    Xml,
}

impl DetectedType {
    pub fn mime(&self) -> &'static str {
        match self {
            DetectedType::Jpeg => "image/jpeg",
            DetectedType::Png => "image/png",
            DetectedType::Gif => "image/gif",
            DetectedType::Webp => "image/webp",
            DetectedType::Bmp => "image/bmp",
            DetectedType::Tiff => "image/tiff",
            DetectedType::Ico => "image/x-icon",
            DetectedType::Avif => "image/avif",
            DetectedType::Heic => "image/heic",
            DetectedType::Pdf => "application/pdf",
            DetectedType::Zip => "application/zip",
            DetectedType::Gzip => "application/gzip",
            DetectedType::Elf => "application/x-elf",
            DetectedType::Exe => "application/x-msdownload",
            DetectedType::Mp4 => "video/mp4",
            DetectedType::Xml => "application/xml",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DetectedType::Jpeg => "jpg",
            DetectedType::Png => "png",
            DetectedType::Gif => "gif",
            DetectedType::Webp => "webp",
            DetectedType::Bmp => "bmp",
            DetectedType::Tiff => "tiff",
            DetectedType::Ico => "ico",
            DetectedType::Avif => "avif",
            DetectedType::Heic => "heic",
            DetectedType::Pdf => "pdf",
            DetectedType::Zip => "zip",
            DetectedType::Gzip => "gz",
            DetectedType::Elf => "elf",
            DetectedType::Exe => "exe",
            DetectedType::Mp4 => "mp4",
            DetectedType::Xml => "xml",
        }
    }

    fn is_allowed(&self) -> bool {
        ALLOWED_CONTENT_TYPES.contains(&self.mime())
    }
}

/// Identify a buffer by its magic bytes.
///
/// Only the first [`SNIFF_WINDOW`] bytes are inspected.
pub fn sniff(bytes: &[u8]) -> Option<DetectedType> {
    let head = &bytes[..bytes.len().min(SNIFF_WINDOW)];

    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(DetectedType::Jpeg);
    }
    if head.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(DetectedType::Png);
    }
    if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        return Some(DetectedType::Gif);
    }
    if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WEBP" {
        return Some(DetectedType::Webp);
    }
    if head.starts_with(b"%PDF-") {
        return Some(DetectedType::Pdf);
    }
    if head.starts_with(&[b'P', b'K', 0x03, 0x04]) || head.starts_with(&[b'P', b'K', 0x05, 0x06]) {
        return Some(DetectedType::Zip);
    }
    if head.starts_with(&[0x1F, 0x8B, 0x08]) {
        return Some(DetectedType::Gzip);
    }
    if head.starts_with(&[0x7F, b'E', b'L', b'F']) {
        return Some(DetectedType::Elf);
    }
    if head.starts_with(b"MZ") {
        return Some(DetectedType::Exe);
    }
    if head.starts_with(&[b'I', b'I', 0x2A, 0x00]) || head.starts_with(&[b'M', b'M', 0x00, 0x2A]) {
        return Some(DetectedType::Tiff);
    }
    if head.starts_with(&[0x00, 0x00, 0x01, 0x00]) && head.len() >= 6 && head[4] > 0 {
        return Some(DetectedType::Ico);
    }
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        return match &head[8..12] {
            b"avif" | b"avis" => Some(DetectedType::Avif),
            b"heic" | b"heix" | b"mif1" | b"msf1" => Some(DetectedType::Heic),
            _ => Some(DetectedType::Mp4),
        };
    }
    if head.starts_with(b"BM") && head.len() >= 14 {
        return Some(DetectedType::Bmp);
    }
    if looks_like_markup(head) {
        return Some(DetectedType::Xml);
    }

    None
}

fn looks_like_markup(head: &[u8]) -> bool {
    let text = head
        .strip_prefix(&[0xEF, 0xBB, 0xBF])
        .unwrap_or(head);
    let start = text.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(text.len());
    let text = &text[start..];

    text.starts_with(b"<?xml") || text.starts_with(b"<svg") || text.starts_with(b"<!DOCTYPE")
}

/// Result of [`UploadValidator::validate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Upload rejection reasons
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("File size exceeds the maximum allowed size of {}MB", .max_size / (1024 * 1024))]
    TooLarge { size: usize, max_size: usize },

    #[error("Invalid file type: {declared}. Allowed types: JPEG, PNG, WebP, GIF")]
    UnsupportedType { declared: String },

    #[error("File content does not match an allowed image type (detected {detected})")]
    ContentMismatch { detected: &'static str },

    #[error("File content could not be identified as an image")]
    Unrecognized,

    #[error("No file provided")]
    Missing,
}

/// Validates uploaded files before anything is persisted
#[derive(Debug, Clone, Default)]
pub struct UploadValidator {
    policy: SniffPolicy,
}

impl UploadValidator {
    pub fn new(policy: SniffPolicy) -> Self {
        Self { policy }
    }

    /// Run the checks in order; the first failure wins.
    ///
    /// Returns the sniffed type when one was recognised.
    pub fn check(&self, file: &UploadedFile) -> Result<Option<DetectedType>, UploadError> {
        let size = file.bytes.len();
        if size > MAX_UPLOAD_BYTES {
            warn!("Upload rejected: {} bytes exceeds {}", size, MAX_UPLOAD_BYTES);
            return Err(UploadError::TooLarge {
                size,
                max_size: MAX_UPLOAD_BYTES,
            });
        }

        let declared = file.content_type.trim().to_ascii_lowercase();
        if !ALLOWED_CONTENT_TYPES.contains(&declared.as_str()) {
            warn!("Upload rejected: declared type {} not allowed", declared);
            return Err(UploadError::UnsupportedType {
                declared: file.content_type.clone(),
            });
        }

        match sniff(&file.bytes) {
            Some(detected) if detected.is_allowed() => {
                debug!("Upload passed validation as {}", detected.mime());
                Ok(Some(detected))
            }
            Some(detected) => {
                warn!(
                    "Upload rejected: declared {} but content is {}",
                    declared,
                    detected.mime()
                );
                Err(UploadError::ContentMismatch {
                    detected: detected.mime(),
                })
            }
            None => match self.policy {
                SniffPolicy::Lenient => {
                    debug!("Upload content unrecognised; accepting declared {}", declared);
                    Ok(None)
                }
                SniffPolicy::Strict => {
                    warn!("Upload rejected: content unrecognised");
                    Err(UploadError::Unrecognized)
                }
            },
        }
    }

    /// Check a file, reporting `{ valid, error }`
    pub fn validate(&self, file: &UploadedFile) -> UploadValidation {
        match self.check(file) {
            Ok(_) => UploadValidation {
                valid: true,
                error: None,
            },
            Err(e) => UploadValidation {
                valid: false,
                error: Some(e.to_string()),
            },
        }
    }
}
