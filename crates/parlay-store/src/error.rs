//! error types for trade storage

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no trade set stored for bet {0}")]
    NotFound(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] parlay_codec::CodecError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
