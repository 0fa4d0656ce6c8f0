//! in-memory bet lifecycle state
//!
//! two maps behind std mutexes: active bets by on-chain id, pending
//! proposals by trades root. locks are held for map operations only,
//! never across an await point; loops snapshot what they need and
//! release.

use crate::config::Role;
use alloy_primitives::{Address, B256};
use parlay_core::abi::BetCommitment;
use parlay_core::{BetOutcome, TradeSet};
use parlay_p2p::messages::ProposalRequest;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// local lifecycle of one bet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetState {
    Pending,
    Committed,
    Settling,
    Settled,
}

#[derive(Debug, Clone)]
pub struct ActiveBet {
    pub bet_id: u64,
    pub commitment: BetCommitment,
    pub trade_set: TradeSet,
    pub counterparty: Address,
    pub role: Role,
    pub deadline: u64,
    pub state: BetState,
    pub outcome: Option<BetOutcome>,
}

/// accepted proposal waiting for the on-chain commit notification
#[derive(Debug, Clone)]
pub struct PendingProposal {
    pub proposal: ProposalRequest,
    pub trade_set: TradeSet,
    pub received_at: Instant,
}

/// process-wide counters; mirrored to the metrics exporter by the loops
#[derive(Debug, Default)]
pub struct Counters {
    pub bets_created: AtomicU64,
    pub bets_settled: AtomicU64,
    pub errors: AtomicU64,
    pub peak_rss_bytes: AtomicU64,
}

impl Counters {
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("parlay_errors_total").increment(1);
    }
}

#[derive(Default)]
pub struct AgentState {
    active: Mutex<HashMap<u64, ActiveBet>>,
    pending: Mutex<HashMap<B256, PendingProposal>>,
    pub counters: Counters,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    // === active bets ===

    /// insert a bet; refuses to overwrite an existing id
    pub fn insert_active(&self, bet: ActiveBet) -> bool {
        let mut active = self.active.lock().unwrap();
        if active.contains_key(&bet.bet_id) {
            return false;
        }
        active.insert(bet.bet_id, bet);
        metrics::gauge!("parlay_active_bets").set(active.len() as f64);
        true
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    pub fn get_active(&self, bet_id: u64) -> Option<ActiveBet> {
        self.active.lock().unwrap().get(&bet_id).cloned()
    }

    /// apply `f` to one bet under the lock; returns false when missing
    pub fn update_active<F: FnOnce(&mut ActiveBet)>(&self, bet_id: u64, f: F) -> bool {
        let mut active = self.active.lock().unwrap();
        match active.get_mut(&bet_id) {
            Some(bet) => {
                f(bet);
                true
            }
            None => false,
        }
    }

    /// ids of committed bets whose deadline has passed
    pub fn due_for_settlement(&self, now: u64) -> Vec<u64> {
        self.active
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.state == BetState::Committed && b.deadline <= now)
            .map(|b| b.bet_id)
            .collect()
    }

    /// ids currently waiting for the chain to report settled
    pub fn settling(&self) -> Vec<u64> {
        self.active
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.state == BetState::Settling)
            .map(|b| b.bet_id)
            .collect()
    }

    /// drop settled bets, returning their ids
    pub fn remove_settled(&self) -> Vec<u64> {
        let mut active = self.active.lock().unwrap();
        let settled: Vec<u64> = active
            .values()
            .filter(|b| b.state == BetState::Settled)
            .map(|b| b.bet_id)
            .collect();
        for id in &settled {
            active.remove(id);
        }
        metrics::gauge!("parlay_active_bets").set(active.len() as f64);
        settled
    }

    /// evict earliest-deadline bets until the map fits the cap
    pub fn evict_over_cap(&self, max_active: usize) -> Vec<u64> {
        let mut active = self.active.lock().unwrap();
        let mut evicted = Vec::new();
        while active.len() > max_active {
            let Some(id) = active
                .values()
                .min_by_key(|b| b.deadline)
                .map(|b| b.bet_id)
            else {
                break;
            };
            active.remove(&id);
            evicted.push(id);
        }
        if !evicted.is_empty() {
            metrics::gauge!("parlay_active_bets").set(active.len() as f64);
        }
        evicted
    }

    // === pending proposals ===

    pub fn insert_pending(&self, root: B256, pending: PendingProposal) {
        let mut map = self.pending.lock().unwrap();
        map.insert(root, pending);
        metrics::gauge!("parlay_pending_proposals").set(map.len() as f64);
    }

    /// remove and return the pending proposal for a trades root
    pub fn take_pending(&self, root: &B256) -> Option<PendingProposal> {
        let mut map = self.pending.lock().unwrap();
        let taken = map.remove(root);
        metrics::gauge!("parlay_pending_proposals").set(map.len() as f64);
        taken
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// drop pending proposals older than the ttl
    pub fn evict_stale_pending(&self, ttl: Duration) -> usize {
        let mut map = self.pending.lock().unwrap();
        let before = map.len();
        let now = Instant::now();
        map.retain(|_, p| now.duration_since(p.received_at) < ttl);
        let evicted = before - map.len();
        if evicted > 0 {
            metrics::gauge!("parlay_pending_proposals").set(map.len() as f64);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use parlay_core::{CommitmentMode, Method, Quote};

    fn bet(id: u64, deadline: u64, state: BetState) -> ActiveBet {
        let trade_set = TradeSet::build(
            "snap",
            &[Quote { ticker: "BTC".into(), source: "t".into(), price: U256::from(1u64) }],
            &Method::Up(0),
            1_000,
        )
        .unwrap();
        ActiveBet {
            bet_id: id,
            commitment: BetCommitment::default(),
            trade_set,
            counterparty: Address::ZERO,
            role: Role::Maker,
            deadline,
            state,
            outcome: None,
        }
    }

    #[test]
    fn duplicate_bet_ids_are_refused() {
        let state = AgentState::new();
        assert!(state.insert_active(bet(1, 100, BetState::Committed)));
        assert!(!state.insert_active(bet(1, 200, BetState::Committed)));
        assert_eq!(state.active_count(), 1);
        assert_eq!(state.get_active(1).unwrap().deadline, 100);
    }

    #[test]
    fn due_for_settlement_filters_state_and_deadline() {
        let state = AgentState::new();
        state.insert_active(bet(1, 100, BetState::Committed));
        state.insert_active(bet(2, 900, BetState::Committed));
        state.insert_active(bet(3, 50, BetState::Settling));
        let mut due = state.due_for_settlement(150);
        due.sort_unstable();
        assert_eq!(due, vec![1]);
    }

    #[test]
    fn remove_settled_only_touches_settled() {
        let state = AgentState::new();
        state.insert_active(bet(1, 100, BetState::Settled));
        state.insert_active(bet(2, 100, BetState::Committed));
        assert_eq!(state.remove_settled(), vec![1]);
        assert_eq!(state.active_count(), 1);
    }

    #[test]
    fn eviction_takes_earliest_deadlines_first() {
        let state = AgentState::new();
        state.insert_active(bet(1, 300, BetState::Committed));
        state.insert_active(bet(2, 100, BetState::Committed));
        state.insert_active(bet(3, 200, BetState::Committed));
        let evicted = state.evict_over_cap(1);
        assert_eq!(evicted, vec![2, 3]);
        assert_eq!(state.active_count(), 1);
        assert!(state.get_active(1).is_some());
    }

    #[test]
    fn stale_pending_evicts_by_age() {
        let state = AgentState::new();
        let set = bet(1, 1, BetState::Pending).trade_set;
        let proposal = ProposalRequest {
            commitment: parlay_p2p::messages::CommitmentWire {
                trades_root: set.root(),
                creator: Address::ZERO,
                filler: Address::ZERO,
                creator_amount: U256::ZERO,
                filler_amount: U256::ZERO,
                deadline: 0,
                nonce: U256::ZERO,
                expiry: 0,
            },
            snapshot_id: "snap".into(),
            mode: CommitmentMode::Merkle,
            trade_count: 1,
            trades_gz: Default::default(),
            signer: Address::ZERO,
            signature: Default::default(),
            expiry: 0,
        };
        state.insert_pending(
            set.root(),
            PendingProposal {
                proposal,
                trade_set: set.clone(),
                received_at: Instant::now() - Duration::from_secs(120),
            },
        );
        assert_eq!(state.evict_stale_pending(Duration::from_secs(60)), 1);
        assert_eq!(state.pending_count(), 0);
        assert!(state.take_pending(&set.root()).is_none());
    }

    #[test]
    fn remove_settled_in_update_flow() {
        let state = AgentState::new();
        state.insert_active(bet(4, 10, BetState::Settling));
        assert!(state.update_active(4, |b| b.state = BetState::Settled));
        assert_eq!(state.settling(), Vec::<u64>::new());
        assert_eq!(state.remove_settled(), vec![4]);
        assert!(!state.update_active(4, |_| {}));
    }
}
