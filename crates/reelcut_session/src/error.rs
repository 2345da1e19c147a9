use thiserror::Error;

use reelcut_core::CoreError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("document '{0}' is no longer loaded")]
    DocumentNotLoaded(String),

    #[error("selection must contain two or four items, got {0}")]
    InvalidSelection(usize),

    #[error("unknown remote command '{0}'")]
    UnknownCommand(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
