use crate::catalog::TrackId;

/// Result alias that carries the custom [`DaggerwalkError`] type.
pub type Result<T> = std::result::Result<T, DaggerwalkError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum DaggerwalkError {
    /// A category filter named something outside the known category set.
    #[error("invalid category `{0}`; available categories: all, world, dungeon, battle, misc, off")]
    InvalidCategory(String),
    /// The requested track has no catalog entry.
    #[error("track {0} is not in the catalog")]
    UnknownTrack(TrackId),
    /// The active filter matches no catalog entries.
    #[error("no tracks match the requested categories")]
    EmptyPool,
    /// A console command could not be parsed.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON encoding and decoding errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl DaggerwalkError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for DaggerwalkError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for DaggerwalkError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
