//! Contracts for the media collaborators
//!
//! Ingestion (upload + transcoding) and byte storage are external systems;
//! the playback engine only consumes these traits. Neither is ever called
//! while a room's command lock is held.

use async_trait::async_trait;

use crate::{models::MediaDescriptor, Result};

/// An uploaded file handed to the ingestion collaborator.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub name: String,
    pub size_bytes: i64,
    /// Where the raw upload currently sits (staging area, temp file, URL).
    pub source: String,
}

/// Produces a playable `MediaDescriptor` from an upload, converting
/// incompatible codecs along the way. Failures surface to the caller of
/// `play` as `Error::MediaIngestFailed`.
#[async_trait]
pub trait MediaIngest: Send + Sync {
    async fn ingest(&self, upload: MediaUpload) -> Result<MediaDescriptor>;
}

/// File-system collaborator that owns the stored media bytes. `remove` is
/// invoked with the locator a stop orphaned; best-effort.
#[async_trait]
pub trait MediaStorage: Send + Sync {
    async fn remove(&self, storage_locator: &str) -> Result<()>;
}
