//! parlay-store: on-disk trade sets
//!
//! file per bet under one directory. sets at or above the compression
//! threshold are gzipped; writes go through a temp file and an atomic
//! rename so readers never observe a partial set. the resolution record
//! lands alongside the trade file at settlement.

pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{ResolutionRecord, StoreStats, TradeStore};
