//! error types for peer networking

use thiserror::Error;

#[derive(Error, Debug)]
pub enum P2pError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("peer rejected request: {0}")]
    Rejected(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("directory error: {0}")]
    Directory(String),

    #[error("codec error: {0}")]
    Codec(#[from] parlay_codec::CodecError),
}

pub type Result<T> = std::result::Result<T, P2pError>;
