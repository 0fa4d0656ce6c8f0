//! error types for key handling

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("bad keystore: {0}")]
    BadKeystore(String),

    #[error("bad signature: {0}")]
    BadSignature(String),

    #[error("bad curve point: {0}")]
    BadCurvePoint(String),

    #[error("kdf failure: {0}")]
    Kdf(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
