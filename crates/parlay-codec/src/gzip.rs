//! gzip level 1 for trade blobs
//!
//! level 1 ("fastest") because blobs run to millions of trades and the
//! bet tick budget is dominated by hashing, not io.

use crate::error::Result;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

pub fn gzip_compress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

pub fn gzip_decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let payload = br#"[{"ticker":"BTC","method":"up:0"}]"#.repeat(100);
        let packed = gzip_compress(&payload).unwrap();
        assert!(packed.len() < payload.len());
        assert_eq!(gzip_decompress(&packed).unwrap(), payload);
    }

    #[test]
    fn empty_roundtrip() {
        let packed = gzip_compress(b"").unwrap();
        assert_eq!(gzip_decompress(&packed).unwrap(), b"");
    }

    #[test]
    fn rejects_truncated_stream() {
        let packed = gzip_compress(b"some trades").unwrap();
        assert!(gzip_decompress(&packed[..packed.len() - 4]).is_err());
    }
}
