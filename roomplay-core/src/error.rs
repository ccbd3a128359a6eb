use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A transport command was issued while no media is loaded in the room.
    #[error("No media loaded")]
    NoMediaLoaded,

    /// Pause was requested while playback is not running.
    #[error("Not playing")]
    NotPlaying,

    /// Resume was requested while playback is already running.
    #[error("Already playing")]
    AlreadyPlaying,

    /// The caller is not the room's controlling user.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Transient durable-store failure. The in-memory transition has been
    /// rolled back; the caller may retry.
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// The media ingestion collaborator rejected or failed the upload.
    /// Not retried automatically.
    #[error("Media ingest failed: {0}")]
    MediaIngestFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::RoomNotFound("Resource not found".to_string()),
            _ => Self::Persistence(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
