//! error types for the wire codec

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("gzip error: {0}")]
    Gzip(#[from] std::io::Error),

    #[error("hex error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("integer out of range: {0}")]
    IntRange(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;
