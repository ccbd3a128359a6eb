//! Passthrough media ingestion
//!
//! The real ingestion collaborator transcodes incompatible codecs before
//! handing back a descriptor. This implementation covers deployments where
//! media arrives pre-transcoded: it gates on container format and derives a
//! storage locator, leaving byte movement to the upload pipeline.

use async_trait::async_trait;
use roomplay_core::ingest::{MediaIngest, MediaUpload};
use roomplay_core::models::MediaDescriptor;
use roomplay_core::{Error, Result};

/// Container formats accepted without conversion.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "aac", "m4a", "ogg", "wav", "flac", "mp4", "webm", "mkv",
];

pub struct PassthroughIngest {
    /// Prefix under which stored media is addressed, e.g. `media`.
    root: String,
}

impl PassthroughIngest {
    #[must_use]
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    fn extension(name: &str) -> Option<&str> {
        name.rsplit_once('.').map(|(_, ext)| ext)
    }
}

#[async_trait]
impl MediaIngest for PassthroughIngest {
    async fn ingest(&self, upload: MediaUpload) -> Result<MediaDescriptor> {
        if upload.name.trim().is_empty() {
            return Err(Error::MediaIngestFailed("Upload has no name".to_string()));
        }
        if upload.size_bytes <= 0 {
            return Err(Error::MediaIngestFailed(format!(
                "Upload '{}' is empty",
                upload.name
            )));
        }

        let ext = Self::extension(&upload.name)
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(Error::MediaIngestFailed(format!(
                "Unsupported container format: '{}'",
                upload.name
            )));
        }

        let locator = format!("{}/{}-{}", self.root, nanoid::nanoid!(12), upload.name);
        tracing::debug!(name = %upload.name, locator = %locator, "Media ingested");
        Ok(MediaDescriptor {
            name: upload.name,
            size_bytes: upload.size_bytes,
            storage_locator: locator,
        })
    }
}
