//! encrypted keystore (web3 secret storage v3)
//!
//! scrypt key derivation, aes-128-ctr cipher, keccak mac. parameters are
//! parsed from the keystore json and honored as stored; only the scrypt
//! kdf is supported.

use crate::error::{CryptoError, Result};
use aes::cipher::{KeyIvInit, StreamCipher};
use alloy_primitives::keccak256;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use zeroize::Zeroizing;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// default scrypt cost parameters for newly written keystores
pub const DEFAULT_SCRYPT_N: u32 = 1 << 17;
pub const DEFAULT_SCRYPT_R: u32 = 8;
pub const DEFAULT_SCRYPT_P: u32 = 1;

const DK_LEN: usize = 32;
const CIPHER: &str = "aes-128-ctr";

#[derive(Serialize, Deserialize)]
struct KeystoreJson {
    crypto: CryptoSection,
    version: u32,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct CryptoSection {
    cipher: String,
    ciphertext: String,
    cipherparams: CipherParams,
    kdf: String,
    kdfparams: KdfParams,
    mac: String,
}

#[derive(Serialize, Deserialize)]
struct CipherParams {
    iv: String,
}

/// scrypt parameters as stored in the keystore json
#[derive(Clone, Serialize, Deserialize)]
pub struct KdfParams {
    pub dklen: usize,
    pub n: u32,
    pub r: u32,
    pub p: u32,
    pub salt: String,
}

impl KdfParams {
    fn log_n(&self) -> Result<u8> {
        if self.n < 2 || !self.n.is_power_of_two() {
            return Err(CryptoError::BadKeystore(format!(
                "scrypt n must be a power of two, got {}",
                self.n
            )));
        }
        Ok(self.n.trailing_zeros() as u8)
    }
}

fn derive_key(passphrase: &str, params: &KdfParams) -> Result<Zeroizing<Vec<u8>>> {
    let salt = hex::decode(&params.salt)
        .map_err(|e| CryptoError::BadKeystore(format!("bad salt hex: {e}")))?;
    let scrypt_params = scrypt::Params::new(params.log_n()?, params.r, params.p, params.dklen)
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    let mut dk = Zeroizing::new(vec![0u8; params.dklen]);
    scrypt::scrypt(passphrase.as_bytes(), &salt, &scrypt_params, &mut dk)
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    Ok(dk)
}

fn mac_bytes(dk: &[u8], ciphertext: &[u8]) -> [u8; 32] {
    keccak256([&dk[16..32], ciphertext].concat()).0
}

/// unlock a keystore file, returning the raw private key bytes
pub fn decrypt_keystore(path: impl AsRef<Path>, passphrase: &str) -> Result<Zeroizing<Vec<u8>>> {
    let raw = fs::read(path.as_ref())
        .map_err(|e| CryptoError::BadKeystore(format!("read failed: {e}")))?;
    let ks: KeystoreJson = serde_json::from_slice(&raw)
        .map_err(|e| CryptoError::BadKeystore(format!("malformed json: {e}")))?;

    if ks.version != 3 {
        return Err(CryptoError::BadKeystore(format!(
            "unsupported version {}",
            ks.version
        )));
    }
    if ks.crypto.kdf != "scrypt" {
        return Err(CryptoError::BadKeystore(format!(
            "unsupported kdf {}",
            ks.crypto.kdf
        )));
    }
    if ks.crypto.cipher != CIPHER {
        return Err(CryptoError::BadKeystore(format!(
            "unsupported cipher {}",
            ks.crypto.cipher
        )));
    }
    if ks.crypto.kdfparams.dklen < DK_LEN {
        return Err(CryptoError::BadKeystore("dklen too short".into()));
    }

    let ciphertext = hex::decode(&ks.crypto.ciphertext)
        .map_err(|e| CryptoError::BadKeystore(format!("bad ciphertext hex: {e}")))?;
    let iv = hex::decode(&ks.crypto.cipherparams.iv)
        .map_err(|e| CryptoError::BadKeystore(format!("bad iv hex: {e}")))?;
    let mac = hex::decode(&ks.crypto.mac)
        .map_err(|e| CryptoError::BadKeystore(format!("bad mac hex: {e}")))?;
    if iv.len() != 16 {
        return Err(CryptoError::BadKeystore("iv must be 16 bytes".into()));
    }

    let dk = derive_key(passphrase, &ks.crypto.kdfparams)?;
    if !constant_time_eq(&mac_bytes(&dk, &ciphertext), &mac) {
        return Err(CryptoError::BadKeystore("mac mismatch".into()));
    }

    let mut key = Zeroizing::new(ciphertext);
    let mut cipher = Aes128Ctr::new(dk[..16].into(), iv.as_slice().into());
    cipher.apply_keystream(&mut key);
    Ok(key)
}

/// write `key` encrypted under `passphrase` to `path`
///
/// used by the registration flow and the test suite; cost parameters are
/// caller-supplied so tests stay fast.
pub fn encrypt_keystore(
    path: impl AsRef<Path>,
    key: &[u8],
    passphrase: &str,
    iv: [u8; 16],
    salt: [u8; 32],
    n: u32,
    r: u32,
    p: u32,
) -> Result<()> {
    let params = KdfParams {
        dklen: DK_LEN,
        n,
        r,
        p,
        salt: hex::encode(salt),
    };
    let dk = derive_key(passphrase, &params)?;

    let mut ciphertext = key.to_vec();
    let mut cipher = Aes128Ctr::new(dk[..16].into(), iv.as_slice().into());
    cipher.apply_keystream(&mut ciphertext);

    let ks = KeystoreJson {
        crypto: CryptoSection {
            cipher: CIPHER.into(),
            ciphertext: hex::encode(&ciphertext),
            cipherparams: CipherParams { iv: hex::encode(iv) },
            kdf: "scrypt".into(),
            kdfparams: params,
            mac: hex::encode(mac_bytes(&dk, &ciphertext)),
        },
        version: 3,
        address: None,
    };
    let raw = serde_json::to_vec_pretty(&ks)
        .map_err(|e| CryptoError::BadKeystore(e.to_string()))?;
    fs::write(path.as_ref(), raw).map_err(|e| CryptoError::BadKeystore(e.to_string()))?;
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x11; 32];

    fn write_fixture(dir: &tempfile::TempDir, pass: &str) -> std::path::PathBuf {
        let path = dir.path().join("key.json");
        // tiny cost parameters keep the test fast; production default is 2^17
        encrypt_keystore(&path, &KEY, pass, [7u8; 16], [9u8; 32], 8, 2, 1).unwrap();
        path
    }

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "hunter2");
        let key = decrypt_keystore(&path, "hunter2").unwrap();
        assert_eq!(&key[..], &KEY[..]);
    }

    #[test]
    fn wrong_passphrase_is_mac_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "hunter2");
        let err = decrypt_keystore(&path, "hunter3").unwrap_err();
        assert!(matches!(err, CryptoError::BadKeystore(ref m) if m.contains("mac")));
    }

    #[test]
    fn rejects_pbkdf2() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "x");
        let mut raw: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        raw["crypto"]["kdf"] = "pbkdf2".into();
        fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();
        let err = decrypt_keystore(&path, "x").unwrap_err();
        assert!(matches!(err, CryptoError::BadKeystore(ref m) if m.contains("kdf")));
    }

    #[test]
    fn rejects_non_power_of_two_n() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        assert!(encrypt_keystore(&path, &KEY, "x", [0; 16], [0; 32], 9, 2, 1).is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            decrypt_keystore(&path, "x").unwrap_err(),
            CryptoError::BadKeystore(_)
        ));
    }
}
