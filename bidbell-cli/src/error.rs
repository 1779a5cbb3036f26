use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to render configuration: {0}")]
    ConfigRender(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error(transparent)]
    Client(#[from] bidbell::Error),

    #[error("No token configured; pass --token or set BIDBELL_TOKEN")]
    MissingToken,

    #[error("Failed to initialise logging: {0}")]
    Logging(String),

    #[error("Session ended: {0}")]
    SessionEnded(String),
}

impl From<bidbell::SyncError> for AppError {
    fn from(error: bidbell::SyncError) -> Self {
        AppError::Client(error.into())
    }
}
