use anyhow::Context;
use bytes::Bytes;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{error::AppError, storage::StorageClient};

/// An image file received in a multipart body.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub body: Bytes,
    pub content_type: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub key: String,
    pub url: String,
}

/// Decides which pre-hosted image URLs a post may reference: the configured
/// hosting pattern, or something already under our own upload base.
#[derive(Debug, Clone)]
pub struct ImageUrlPolicy {
    pattern: Regex,
    own_base: String,
}

impl ImageUrlPolicy {
    pub fn new(pattern: &str, own_base: &str) -> anyhow::Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern).context("compile image url pattern")?,
            own_base: own_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn allows(&self, url: &str) -> bool {
        if url.chars().any(|c| c.is_whitespace() || c == '"' || c == '<' || c == '>') {
            return false;
        }
        self.pattern.is_match(url) || self.own_key(url).is_some()
    }

    /// Storage key of a URL that points into our own uploads.
    pub fn own_key<'a>(&self, url: &'a str) -> Option<&'a str> {
        let key = url.strip_prefix(&self.own_base)?.strip_prefix('/')?;
        let plain = !key.is_empty()
            && key
                .split('/')
                .all(|seg| !seg.is_empty() && seg != "." && seg != "..");
        plain.then_some(key)
    }
}

pub(crate) fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// Validates the upload and writes it under a generated `news/` key.
pub async fn store_image(
    storage: &dyn StorageClient,
    upload: ImageUpload,
) -> Result<StoredImage, AppError> {
    let content_type = upload
        .content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let ext = ext_from_mime(&content_type)
        .ok_or_else(|| AppError::validation("Invalid image format"))?;
    if upload.body.is_empty() {
        return Err(AppError::validation("Image file is empty"));
    }

    let key = format!("news/{}.{}", Uuid::new_v4(), ext);
    storage
        .put_object(&key, upload.body, &content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;

    info!(key = %key, original = ?upload.file_name, "image stored");
    Ok(StoredImage {
        url: storage.public_url(&key),
        key,
    })
}

/// Best-effort removal of an object nothing references any more.
pub async fn discard_image(storage: &dyn StorageClient, key: &str) {
    if let Err(e) = storage.delete_object(key).await {
        warn!(error = %e, key = %key, "failed to delete image");
    }
}
