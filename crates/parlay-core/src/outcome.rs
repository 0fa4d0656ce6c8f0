//! outcome resolution
//!
//! both parties run this over identical inputs and must reach identical
//! results. arithmetic is integer-only: `exit * 100` against
//! `entry * (100 ± K)` avoids every rounding hazard. `up`/`down`
//! thresholds are exclusive (an `up:0` trade with `exit == entry`
//! loses), `flat` is inclusive (a `flat:0` trade with `exit == entry`
//! wins). ties go to the filler.

use crate::trade::{Method, Trade};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// did the creator win this trade?
///
/// `None` means the trade is cancelled: zero entry, zero exit, or a
/// method outside `{up|down|flat}:K`.
pub fn trade_outcome(method: &Method, entry: U256, exit: U256) -> Option<bool> {
    if entry.is_zero() || exit.is_zero() {
        return None;
    }
    let hundred = U256::from(100u64);
    match method {
        Method::Up(k) => {
            Some(exit * hundred > entry * (hundred + U256::from(*k)))
        }
        Method::Down(k) => {
            Some(exit * hundred < entry * (hundred - U256::from(*k)))
        }
        Method::Flat(k) => {
            let diff = if exit >= entry { exit - entry } else { entry - exit };
            Some(diff * hundred <= entry * U256::from(*k))
        }
        Method::Unknown(_) => None,
    }
}

/// fill in `exit_price`, `won`, `cancelled` from an exit-price table
///
/// a ticker missing from the table resolves with a zero exit price,
/// which cancels the trade.
pub fn resolve_trades(trades: &[Trade], exits: &HashMap<String, U256>) -> Vec<Trade> {
    trades
        .iter()
        .map(|t| {
            let exit = exits.get(&t.ticker).copied().unwrap_or(U256::ZERO);
            let mut resolved = t.clone();
            resolved.exit_price = exit;
            match trade_outcome(&t.method, t.entry_price, exit) {
                Some(won) => {
                    resolved.won = won;
                    resolved.cancelled = false;
                }
                None => {
                    resolved.won = false;
                    resolved.cancelled = true;
                }
            }
            resolved
        })
        .collect()
}

/// aggregate outcome of a resolved bet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetOutcome {
    pub winner: Address,
    pub wins_count: u64,
    pub valid_trades: u64,
    pub is_tie: bool,
}

/// tally resolved trades into the bet outcome
///
/// `wins_count` counts creator wins over non-cancelled trades. the
/// creator must win strictly more than half; an exact split, and the
/// zero-valid-trades case, go to the filler.
pub fn tally(resolved: &[Trade], creator: Address, filler: Address) -> BetOutcome {
    let valid_trades = resolved.iter().filter(|t| !t.cancelled).count() as u64;
    let wins_count = resolved.iter().filter(|t| !t.cancelled && t.won).count() as u64;
    let filler_wins = valid_trades - wins_count;
    let is_tie = wins_count == filler_wins;
    let winner = if wins_count > filler_wins { creator } else { filler };
    BetOutcome { winner, wins_count, valid_trades, is_tie }
}
