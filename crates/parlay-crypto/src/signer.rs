//! opaque signer handle
//!
//! every agent holds exactly one signing key. the handle exposes the
//! derived address and hash-signing; the key itself stays private to
//! this module.

use crate::error::{CryptoError, Result};
use alloy_primitives::{keccak256, Address, Signature, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use zeroize::Zeroizing;

/// signing handle for one agent identity
pub struct AgentSigner {
    inner: PrivateKeySigner,
    address: Address,
    pubkey_hash: B256,
}

impl AgentSigner {
    fn from_inner(inner: PrivateKeySigner) -> Self {
        let address = inner.address();
        // keccak of the uncompressed public key, sans the 0x04 prefix byte
        let point = inner.credential().verifying_key().to_encoded_point(false);
        let pubkey_hash = keccak256(&point.as_bytes()[1..]);
        Self { inner, address, pubkey_hash }
    }

    /// import a raw hex-encoded private key (0x prefix optional)
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let stripped = key_hex.trim().trim_start_matches("0x");
        let bytes = Zeroizing::new(
            hex::decode(stripped).map_err(|e| CryptoError::BadCurvePoint(e.to_string()))?,
        );
        let inner = PrivateKeySigner::from_slice(&bytes)
            .map_err(|e| CryptoError::BadCurvePoint(e.to_string()))?;
        Ok(Self::from_inner(inner))
    }

    /// unlock an encrypted keystore file
    pub fn from_keystore(path: impl AsRef<Path>, passphrase: &str) -> Result<Self> {
        let key = crate::keystore::decrypt_keystore(path, passphrase)?;
        let inner = PrivateKeySigner::from_slice(&key)
            .map_err(|e| CryptoError::BadCurvePoint(e.to_string()))?;
        Ok(Self::from_inner(inner))
    }

    /// fresh random key (tests and dev mode)
    pub fn random() -> Self {
        Self::from_inner(PrivateKeySigner::random())
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// keccak256 of the uncompressed public key
    pub fn pubkey_hash(&self) -> B256 {
        self.pubkey_hash
    }

    /// deterministic ecdsa over a 32-byte digest
    pub fn sign_hash(&self, digest: &B256) -> Result<Signature> {
        self.inner
            .sign_hash_sync(digest)
            .map_err(|e| CryptoError::BadSignature(e.to_string()))
    }
}

impl fmt::Debug for AgentSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// recover the signing address from a digest and signature
pub fn recover_address(digest: &B256, sig: &Signature) -> Result<Address> {
    sig.recover_address_from_prehash(digest)
        .map_err(|e| CryptoError::BadSignature(e.to_string()))
}

/// plain sha-256
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}
