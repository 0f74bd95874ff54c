//! Content-addressed artifact keys.

use atelier_core::job::MediaKind;
use sha2::{Digest, Sha256};

/// Build the storage key for an artifact from its bytes.
///
/// Layout: `{kind}/{first two hex chars}/{sha256}.{ext}`. Identical bytes
/// map to the same key, so a retried upload overwrites rather than
/// duplicates.
pub fn artifact_key(kind: MediaKind, bytes: &[u8], content_type: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(bytes));
    format!(
        "{}/{}/{}.{}",
        kind.as_str(),
        &digest[..2],
        digest,
        extension_for(content_type)
    )
}

/// File extension for a MIME type, `bin` when unknown.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        _ => "bin",
    }
}
