//! Turns an uploaded file into a transport-ready image and a local preview.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::body::Bytes;
use axum::extract::multipart::Field;
use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;

use crate::error::CodecError;

/// Media types offered by the file picker. A hint only; other types pass through.
pub const ACCEPTED_MEDIA_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];

/// Value for the picker's `accept` attribute.
pub fn accept_attribute() -> String {
    ACCEPTED_MEDIA_TYPES.join(", ")
}

#[derive(Debug, Clone)]
pub struct Preview {
    pub bytes: Bytes,
    pub media_type: String,
}

/// Registry of previewable images, keyed by handle id.
#[derive(Clone, Default)]
pub struct PreviewStore {
    inner: Arc<PreviewStoreInner>,
}

#[derive(Default)]
struct PreviewStoreInner {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Preview>>,
}

impl PreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u64, Preview>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a preview. The entry lives as long as the returned handle.
    pub fn acquire(&self, bytes: Bytes, media_type: &str) -> PreviewHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.entries().insert(
            id,
            Preview {
                bytes,
                media_type: media_type.to_string(),
            },
        );
        tracing::debug!(id, "preview acquired");
        PreviewHandle {
            id,
            store: self.clone(),
        }
    }

    pub fn get(&self, id: u64) -> Option<Preview> {
        self.entries().get(&id).cloned()
    }

    /// Number of live previews.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, id: u64) {
        if self.entries().remove(&id).is_some() {
            tracing::debug!(id, "preview released");
        }
    }
}

/// Scoped reference to a preview. Dropping it releases the entry.
pub struct PreviewHandle {
    id: u64,
    store: PreviewStore,
}

impl PreviewHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Path the page uses to display the preview.
    pub fn url(&self) -> String {
        format!("/preview/{}", self.id)
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle").field("id", &self.id).finish()
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.store.release(self.id);
    }
}

/// An image ready to be sent for analysis.
///
/// `payload` and `media_type` come from the same bytes the preview serves.
#[derive(Debug)]
pub struct UploadedImage {
    pub preview: PreviewHandle,
    /// Base64 without any `data:` prefix.
    pub payload: String,
    pub media_type: String,
    pub size: usize,
}

/// Encodes `bytes` and registers a preview for them.
pub fn encode(bytes: Bytes, declared_type: Option<&str>, store: &PreviewStore) -> UploadedImage {
    let media_type = resolve_media_type(declared_type, &bytes);
    let payload = general_purpose::STANDARD.encode(&bytes);
    let size = bytes.len();
    let preview = store.acquire(bytes, &media_type);

    UploadedImage {
        preview,
        payload,
        media_type,
        size,
    }
}

/// Reads one multipart file field. `Ok(None)` means the picker was submitted empty.
pub async fn read_upload(
    field: Field<'_>,
    store: &PreviewStore,
) -> Result<Option<UploadedImage>, CodecError> {
    let declared = field.content_type().map(str::to_owned);
    let file_name = field.file_name().map(str::to_owned);

    let bytes = field
        .bytes()
        .await
        .map_err(|e| CodecError::Read(e.body_text()))?;

    if bytes.is_empty() {
        return Ok(None);
    }

    let image = encode(bytes, declared.as_deref(), store);
    tracing::info!(
        file = file_name.as_deref().unwrap_or("<unnamed>"),
        media_type = %image.media_type,
        size = image.size,
        "image loaded"
    );
    Ok(Some(image))
}

/// Keeps a declared `image/*` type verbatim, otherwise sniffs the bytes.
pub fn resolve_media_type(declared: Option<&str>, bytes: &[u8]) -> String {
    if let Some(declared) = declared.map(str::trim) {
        if declared.starts_with("image/") {
            return declared.to_string();
        }
    }

    let sniffed = image::guess_format(bytes).ok().and_then(|format| match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::Bmp => Some("image/bmp"),
        _ => None,
    });

    match (sniffed, declared) {
        (Some(mime), _) => mime.to_string(),
        (None, Some(declared)) if !declared.trim().is_empty() => declared.trim().to_string(),
        _ => "application/octet-stream".to_string(),
    }
}
