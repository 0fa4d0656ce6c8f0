//! parlay-crypto: key handling for betting agents
//!
//! wraps the settlement chain's signing primitives behind an opaque
//! [`AgentSigner`] handle. key material never appears in logs or errors,
//! and imported key bytes are zeroized after use.

pub mod error;
pub mod keystore;
pub mod signer;

pub use error::{CryptoError, Result};
pub use keystore::{decrypt_keystore, encrypt_keystore, KdfParams};
pub use signer::{recover_address, sha256, AgentSigner};

pub use alloy_primitives::keccak256;
