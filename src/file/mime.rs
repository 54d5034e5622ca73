//! Content type detection.

/// Number of leading bytes handed to a detector.
pub const SNIFF_LEN: usize = 512;

/// Fallback content type.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Detects the MIME type of a file from its first bytes and display name.
pub trait MimeDetector: Send + Sync {
    /// Detect a MIME type. `head` holds at most [`SNIFF_LEN`] bytes.
    fn detect(&self, head: &[u8], name: &str) -> String;
}

/// Magic numbers at offset 0.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"BM", "image/bmp"),
    (b"%PDF-", "application/pdf"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b", "application/gzip"),
    (b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed"),
    (b"Rar!\x1a\x07", "application/vnd.rar"),
    (b"\x1aE\xdf\xa3", "video/webm"),
    (b"OggS", "audio/ogg"),
    (b"fLaC", "audio/flac"),
    (b"ID3", "audio/mpeg"),
];

/// Sniffs well-known signatures, then falls back to the file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct SniffingDetector;

impl SniffingDetector {
    fn sniff(head: &[u8]) -> Option<&'static str> {
        if let Some((_, mime)) = SIGNATURES.iter().find(|(magic, _)| head.starts_with(magic)) {
            return Some(*mime);
        }

        // RIFF containers carry their format at offset 8.
        if head.len() >= 12 && head.starts_with(b"RIFF") {
            match &head[8..12] {
                b"WEBP" => return Some("image/webp"),
                b"WAVE" => return Some("audio/wav"),
                b"AVI " => return Some("video/x-msvideo"),
                _ => {}
            }
        }

        // ISO base media: size, then "ftyp".
        if head.len() >= 12 && &head[4..8] == b"ftyp" {
            return Some(match &head[8..12] {
                b"qt  " => "video/quicktime",
                b"avif" => "image/avif",
                b"heic" | b"heix" => "image/heic",
                _ => "video/mp4",
            });
        }

        None
    }
}

impl MimeDetector for SniffingDetector {
    fn detect(&self, head: &[u8], name: &str) -> String {
        if let Some(mime) = Self::sniff(head) {
            return mime.to_string();
        }
        mime_guess::from_path(name)
            .first_raw()
            .unwrap_or(OCTET_STREAM)
            .to_string()
    }
}
