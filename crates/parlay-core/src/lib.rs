//! parlay-core: bilateral bet primitives
//!
//! everything both sides of a bet must compute identically lives here:
//! the trade model, the two trade-set commitments (merkle with proofs,
//! fast hash without), the outcome resolution rule, and the eip-712
//! structs the parties co-sign. a single byte of disagreement anywhere
//! in this crate breaks the whole protocol, so the hashing inputs are
//! fixed down to field order and integer widths.

pub mod abi;
pub mod commitment;
pub mod error;
pub mod hasher;
pub mod outcome;
pub mod trade;

pub use commitment::{
    sign_agreement, sign_commitment, vault_domain, verify_agreement, verify_commitment,
    BilateralBetBuilder, CommitmentParams,
};
pub use error::{CoreError, Result};
pub use hasher::{MerkleProof, MerkleTree, CommitmentMode};
pub use outcome::{resolve_trades, tally, BetOutcome};
pub use trade::{decode_trades_blob, encode_trades_blob, Method, Quote, Trade, TradeSet};

/// trade count at which the maker switches from merkle to fast-hash mode
pub const FAST_HASH_THRESHOLD: usize = 1_000;

/// hard cap on merkle-committed trades (2^20 leaves)
pub const MAX_MERKLE_TRADES: usize = 1 << 20;
