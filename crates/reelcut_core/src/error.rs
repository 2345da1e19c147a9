use thiserror::Error;

use crate::time::RationalTime;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no item at time {0}")]
    NoItemAtTime(RationalTime),

    #[error("child index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("item has no source range")]
    NoSourceRange,

    #[error("items are not adjacent on the track")]
    NotAdjacent,

    #[error("transition offsets would be shorter than one frame")]
    TransitionTooShort,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
