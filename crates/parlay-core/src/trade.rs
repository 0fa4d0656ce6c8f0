//! trade and trade-set model
//!
//! a trade is one asset/method/entry-price leg of a bet. the set is
//! ordered and immutable after construction; position feeds the
//! commitment, so reordering trades is a protocol violation.

use crate::error::{CoreError, Result};
use crate::hasher::{self, CommitmentMode};
use alloy_primitives::{keccak256, B256, U256};
use parlay_codec::json::u256_dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// resolution rule for one trade
///
/// the threshold `K` is an integer percentage in `[0, 100]`. strings the
/// counterparty sends that do not parse stay representable as `Unknown`
/// so resolution can cancel the trade instead of failing the whole set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Up(u8),
    Down(u8),
    Flat(u8),
    Unknown(String),
}

impl Method {
    pub fn parse(raw: &str) -> Self {
        let Some((kind, threshold)) = raw.split_once(':') else {
            return Method::Unknown(raw.to_string());
        };
        let Ok(k) = u8::from_str(threshold) else {
            return Method::Unknown(raw.to_string());
        };
        if k > 100 {
            return Method::Unknown(raw.to_string());
        }
        match kind {
            "up" => Method::Up(k),
            "down" => Method::Down(k),
            "flat" => Method::Flat(k),
            _ => Method::Unknown(raw.to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Method::Unknown(_))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Up(k) => write!(f, "up:{k}"),
            Method::Down(k) => write!(f, "down:{k}"),
            Method::Flat(k) => write!(f, "flat:{k}"),
            Method::Unknown(raw) => f.write_str(raw),
        }
    }
}

impl Serialize for Method {
    fn serialize<S: serde::Serializer>(&self, ser: S) -> std::result::Result<S::Ok, S::Error> {
        ser.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Method {
    fn deserialize<D: serde::Deserializer<'de>>(de: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(de)?;
        Ok(Method::parse(&raw))
    }
}

/// one leg of a bet's portfolio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub trade_id: B256,
    pub ticker: String,
    pub source: String,
    pub method: Method,
    #[serde(with = "u256_dec")]
    pub entry_price: U256,
    #[serde(with = "u256_dec")]
    pub exit_price: U256,
    pub won: bool,
    pub cancelled: bool,
}

/// deterministic per-trade identifier
pub fn trade_id(snapshot_id: &str, index: u64) -> B256 {
    let mut preimage = Vec::with_capacity(snapshot_id.len() + 9);
    preimage.extend_from_slice(snapshot_id.as_bytes());
    preimage.push(b':');
    preimage.extend_from_slice(&index.to_be_bytes());
    keccak256(preimage)
}

/// priced asset straight from the oracle snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: String,
    pub source: String,
    #[serde(with = "u256_dec")]
    pub price: U256,
}

/// ordered trade list plus its commitment root
///
/// immutable after construction; resolution produces a resolved copy via
/// [`crate::outcome::resolve_trades`] rather than mutating in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSet {
    snapshot_id: String,
    trades: Vec<Trade>,
    root: B256,
    mode: CommitmentMode,
}

impl TradeSet {
    /// build a fresh set from an oracle snapshot, one trade per quote,
    /// all with the same method and zeroed exit state
    pub fn build(
        snapshot_id: &str,
        quotes: &[Quote],
        method: &Method,
        fast_hash_threshold: usize,
    ) -> Result<Self> {
        let trades: Vec<Trade> = quotes
            .iter()
            .enumerate()
            .map(|(i, q)| Trade {
                trade_id: trade_id(snapshot_id, i as u64),
                ticker: q.ticker.clone(),
                source: q.source.clone(),
                method: method.clone(),
                entry_price: q.price,
                exit_price: U256::ZERO,
                won: false,
                cancelled: false,
            })
            .collect();
        let mode = CommitmentMode::for_len(trades.len(), fast_hash_threshold);
        Self::from_trades(snapshot_id, trades, mode)
    }

    /// reassemble a set from decoded trades, recomputing the root
    pub fn from_trades(snapshot_id: &str, trades: Vec<Trade>, mode: CommitmentMode) -> Result<Self> {
        let root = hasher::commitment_root(snapshot_id, &trades, mode)?;
        Ok(Self { snapshot_id: snapshot_id.to_string(), trades, root, mode })
    }

    pub fn snapshot_id(&self) -> &str {
        &self.snapshot_id
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn root(&self) -> B256 {
        self.root
    }

    pub fn mode(&self) -> CommitmentMode {
        self.mode
    }

    /// tickers in position order, for exit-price lookups
    pub fn tickers(&self) -> Vec<String> {
        self.trades.iter().map(|t| t.ticker.clone()).collect()
    }

    /// a copy with resolution fields filled in; the root is recomputed
    /// over the resolved trades in merkle mode (exit prices and outcome
    /// flags are leaf inputs), and unchanged in fast-hash mode (entry
    /// records only)
    pub fn into_resolved(self, trades: Vec<Trade>) -> Result<Self> {
        if trades.len() != self.trades.len() {
            return Err(CoreError::RootMismatch);
        }
        Self::from_trades(&self.snapshot_id, trades, self.mode)
    }
}

/// gzipped canonical-json trade list, the blob format used on the wire
pub fn encode_trades_blob(trades: &[Trade]) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(trades)?;
    Ok(parlay_codec::gzip_compress(&json)?)
}

pub fn decode_trades_blob(bytes: &[u8]) -> Result<Vec<Trade>> {
    let json = parlay_codec::gzip_decompress(bytes)?;
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quotes(n: usize) -> Vec<Quote> {
        (0..n)
            .map(|i| Quote {
                ticker: format!("TKR{i}"),
                source: "test".into(),
                price: U256::from(100 + i as u64),
            })
            .collect()
    }

    #[test]
    fn method_parses_valid_forms() {
        assert_eq!(Method::parse("up:0"), Method::Up(0));
        assert_eq!(Method::parse("down:25"), Method::Down(25));
        assert_eq!(Method::parse("flat:100"), Method::Flat(100));
    }

    #[test]
    fn method_keeps_junk_as_unknown() {
        for raw in ["sideways:5", "up:101", "up:-1", "up", "up:abc", ""] {
            assert!(!Method::parse(raw).is_known(), "{raw} should be unknown");
        }
    }

    #[test]
    fn method_display_roundtrip() {
        for raw in ["up:0", "down:25", "flat:100"] {
            assert_eq!(Method::parse(raw).to_string(), raw);
        }
    }

    #[test]
    fn trade_ids_are_position_sensitive() {
        assert_ne!(trade_id("snap", 0), trade_id("snap", 1));
        assert_ne!(trade_id("snap", 0), trade_id("snap2", 0));
    }

    #[test]
    fn build_assigns_ids_and_zero_exits() {
        let set = TradeSet::build("snap-1", &quotes(4), &Method::Up(0), 1_000).unwrap();
        assert_eq!(set.len(), 4);
        assert_eq!(set.mode(), CommitmentMode::Merkle);
        for (i, t) in set.trades().iter().enumerate() {
            assert_eq!(t.trade_id, trade_id("snap-1", i as u64));
            assert_eq!(t.exit_price, U256::ZERO);
            assert!(!t.won && !t.cancelled);
        }
    }

    #[test]
    fn threshold_switches_mode() {
        let set = TradeSet::build("snap-1", &quotes(10), &Method::Up(0), 10).unwrap();
        assert_eq!(set.mode(), CommitmentMode::FastHash);
    }

    #[test]
    fn blob_roundtrip_preserves_commitment() {
        let set = TradeSet::build("snap-1", &quotes(8), &Method::Up(0), 1_000).unwrap();
        let blob = encode_trades_blob(set.trades()).unwrap();
        let decoded = decode_trades_blob(&blob).unwrap();
        let rebuilt = TradeSet::from_trades("snap-1", decoded, set.mode()).unwrap();
        assert_eq!(rebuilt.root(), set.root());
    }

    #[test]
    fn serde_roundtrip_preserves_root() {
        let set = TradeSet::build("snap-1", &quotes(4), &Method::Up(0), 1_000).unwrap();
        let json = serde_json::to_string(&set).unwrap();
        let back: TradeSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
        assert_eq!(back.root(), set.root());
    }
}
