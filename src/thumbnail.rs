//! Lazy thumbnail generation with failure memoization.
//!
//! Thumbnails live in the file's metadata record. A failed generation is
//! stored as a negative record (no data, no MIME type) so the generator is
//! not called again for that file until the retry window has passed.
//! Persisting patches only the thumbnail of the stored record.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::file::{File, FileStore, ThumbnailRecord};
use crate::{Result, StoreError};

/// Output of a [`ThumbnailGenerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedThumbnail {
    /// Encoded image bytes.
    pub data: Vec<u8>,
    /// MIME type of `data`.
    pub mime: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Produces thumbnail bytes for a stored blob.
///
/// Implementations typically shell out to an image or video codec. Any
/// error, or empty output, counts as a failed generation.
pub trait ThumbnailGenerator: Send + Sync {
    /// Render the blob at `path` no wider than `max_width`.
    fn generate(
        &self,
        path: &Path,
        mime: &str,
        max_width: u32,
    ) -> impl Future<Output = Result<GeneratedThumbnail>> + Send;
}

/// Whether a negative record is still inside its backoff window.
fn in_backoff(record: &ThumbnailRecord, retry_after: Duration) -> bool {
    match (Utc::now() - record.generated_at).to_std() {
        Ok(elapsed) => elapsed < retry_after,
        // Stamped in the future: clock skew, keep backing off.
        Err(_) => true,
    }
}

/// Serves thumbnails from file metadata, generating them on demand.
#[derive(Debug, Clone)]
pub struct ThumbnailCache {
    files: FileStore,
}

impl ThumbnailCache {
    /// Create a thumbnail cache persisting through `files`.
    pub fn new(files: FileStore) -> Self {
        Self { files }
    }

    /// Return the cached thumbnail of `file`, generating it if needed.
    ///
    /// Never takes the resource lock: concurrent generations for one file
    /// both persist and the last write wins. A result for content that was
    /// replaced or deleted meanwhile is returned but not persisted.
    pub async fn get_or_generate<G>(
        &self,
        file: &mut File,
        max_width: u32,
        retry_after: Duration,
        generator: &G,
    ) -> Result<ThumbnailRecord>
    where
        G: ThumbnailGenerator,
    {
        if let Some(record) = &file.thumbnail {
            if record.has_data() {
                debug!(file = %file.lower_path(), "thumbnail cache hit");
                return Ok(record.clone());
            }
            if record.is_negative() && in_backoff(record, retry_after) {
                debug!(file = %file.lower_path(), "thumbnail generation backing off");
                return Err(StoreError::UnsupportedFormat);
            }
        }

        let blob = self.files.blob_path(file);
        let outcome = generator.generate(&blob, &file.mime, max_width).await;

        match outcome {
            Ok(generated) if !generated.data.is_empty() => {
                let record = ThumbnailRecord {
                    data: generated.data,
                    mime: generated.mime,
                    width: generated.width,
                    height: generated.height,
                    generated_at: Utc::now(),
                };
                file.thumbnail = Some(record.clone());
                self.persist(file, &record).await;
                debug!(file = %file.lower_path(), width = record.width, "thumbnail generated");
                Ok(record)
            }
            other => {
                let record = ThumbnailRecord::failed();
                file.thumbnail = Some(record.clone());
                self.persist(file, &record).await;

                let err = match other {
                    Err(e) => e,
                    Ok(_) => StoreError::UnsupportedFormat,
                };
                debug!(file = %file.lower_path(), error = %err, "thumbnail generation failed");
                Err(err)
            }
        }
    }

    async fn persist(&self, file: &File, record: &ThumbnailRecord) {
        match self.files.set_thumbnail(file, record).await {
            Ok(true) => {}
            Ok(false) => debug!(file = %file.lower_path(), "file replaced, thumbnail not persisted"),
            Err(StoreError::NotFound(_)) => {
                debug!(file = %file.lower_path(), "file deleted, thumbnail not persisted")
            }
            Err(e) => warn!(error = %e, file = %file.lower_path(), "cannot persist thumbnail record"),
        }
    }
}
