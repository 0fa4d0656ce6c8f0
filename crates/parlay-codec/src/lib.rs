//! parlay-codec: wire encoding for betting agents
//!
//! three concerns share this crate:
//!
//! - canonical json: struct fields keep declaration order, 256-bit
//!   integers travel as decimal strings (decoding also accepts plain
//!   numbers), byte arrays as 0x-prefixed lowercase hex
//! - gzip level 1 for trade blobs, on the wire and on disk
//! - rlp for raw settlement-chain transactions (eip-155)

pub mod error;
pub mod gzip;
pub mod json;
pub mod rlp;

pub use error::{CodecError, Result};
pub use gzip::{gzip_compress, gzip_decompress};
pub use rlp::LegacyTx;
