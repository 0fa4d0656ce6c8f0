//! error types for bet primitives

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("too many trades for a merkle commitment: {0}")]
    TooManyTrades(usize),

    #[error("trade index {index} out of range for {len} trades")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("commitment field missing: {0}")]
    MissingField(&'static str),

    #[error("commitment root mismatch")]
    RootMismatch,

    #[error("trade blob codec: {0}")]
    Codec(#[from] parlay_codec::CodecError),

    #[error("trade blob json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Crypto(#[from] parlay_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
