//! error types for chain access

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("timeout waiting for {0}")]
    Timeout(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("signing failed: {0}")]
    Signing(#[from] parlay_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, ChainError>;
