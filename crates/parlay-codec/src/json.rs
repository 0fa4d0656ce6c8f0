//! canonical json adapters
//!
//! 256-bit integers are decimal strings on the wire. decoding accepts a
//! json number or a decimal string; encoding always emits the string so
//! values above 2^53 survive every peer's json parser.

use alloy_primitives::U256;
use serde::{de, Deserialize, Deserializer, Serializer};
use std::fmt;

/// serde adapter for a `U256` field carried as a decimal string
pub mod u256_dec {
    use super::*;

    pub fn serialize<S: Serializer>(value: &U256, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<U256, D::Error> {
        de.deserialize_any(U256Visitor)
    }
}

/// serde adapter for `Vec<U256>` carried as decimal strings
pub mod u256_dec_vec {
    use super::*;

    pub fn serialize<S: Serializer>(values: &[U256], ser: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;
        let mut seq = ser.serialize_seq(Some(values.len()))?;
        for v in values {
            seq.serialize_element(&v.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<U256>, D::Error> {
        struct VecVisitor;
        impl<'de> de::Visitor<'de> for VecVisitor {
            type Value = Vec<U256>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a sequence of decimal strings or numbers")
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(v) = seq.next_element::<DecU256>()? {
                    out.push(v.0);
                }
                Ok(out)
            }
        }
        de.deserialize_seq(VecVisitor)
    }
}

/// newtype wrapper when a bare `U256` value (not a struct field) needs
/// the decimal representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecU256(pub U256);

impl serde::Serialize for DecU256 {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for DecU256 {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        de.deserialize_any(U256Visitor).map(DecU256)
    }
}

struct U256Visitor;

impl<'de> de::Visitor<'de> for U256Visitor {
    type Value = U256;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal string or unsigned integer")
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<U256, E> {
        U256::from_str_radix(s.trim(), 10)
            .map_err(|_| E::invalid_value(de::Unexpected::Str(s), &self))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<U256, E> {
        Ok(U256::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<U256, E> {
        u64::try_from(v)
            .map(U256::from)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
    }
}
