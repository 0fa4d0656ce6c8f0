//! parlay-chain: settlement chain access
//!
//! thin json-rpc wrapper plus typed calls into the collateral vault.
//! reads go straight out in parallel; the write path is serialized
//! behind one mutex so a single agent never races itself on the
//! transaction nonce.

pub mod client;
pub mod error;
pub mod rpc;
pub mod tx;

pub use client::{BetInfo, ChainClient, CommitResult, VaultBalance};
pub use error::{ChainError, Result};
pub use rpc::RpcClient;
