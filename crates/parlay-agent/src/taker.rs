//! taker-side handler callbacks
//!
//! policy behind the p2p transport: admission gates, commitment
//! recomputation, counter-signing, and the settlement vote. the server
//! has already verified freshness and signatures by the time these run.

use crate::config::{AgentConfig, Role};
use crate::maker::now_secs;
use crate::memory::MemoryMonitor;
use crate::oracle::OracleClient;
use crate::state::{ActiveBet, AgentState, BetState, PendingProposal};
use async_trait::async_trait;
use parlay_chain::ChainClient;
use parlay_core::{
    decode_trades_blob, encode_trades_blob, outcome, sign_agreement, sign_commitment, MerkleTree,
    TradeSet,
};
use parlay_crypto::AgentSigner;
use parlay_p2p::handlers::BetHandlers;
use parlay_p2p::messages::{
    AckResponse, BetCommittedNotice, CommitmentSignRequest, OutcomeWire, ProposalRequest,
    ProposalResponse, SettlementProposal, SettlementResponse, SettlementView,
    TradesBlobResponse, TradesPush,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct TakerHandlers {
    config: Arc<AgentConfig>,
    signer: Arc<AgentSigner>,
    state: Arc<AgentState>,
    chain: Arc<ChainClient>,
    oracle: OracleClient,
    store: parlay_store::TradeStore,
    monitor: Arc<MemoryMonitor>,
}

impl TakerHandlers {
    pub fn new(
        config: Arc<AgentConfig>,
        signer: Arc<AgentSigner>,
        state: Arc<AgentState>,
        chain: Arc<ChainClient>,
        oracle: OracleClient,
        store: parlay_store::TradeStore,
        monitor: Arc<MemoryMonitor>,
    ) -> Self {
        Self { config, signer, state, chain, oracle, store, monitor }
    }

    /// recompute the commitment root from the proposal's trade blob
    fn rebuild_trade_set(&self, proposal: &ProposalRequest) -> Result<TradeSet, String> {
        let trades = decode_trades_blob(&proposal.trades_gz)
            .map_err(|e| format!("trade blob does not decode: {e}"))?;
        if trades.len() != proposal.trade_count as usize {
            return Err("trade count does not match blob".into());
        }
        let set = TradeSet::from_trades(&proposal.snapshot_id, trades, proposal.mode)
            .map_err(|e| format!("trade set rebuild failed: {e}"))?;
        if set.root() != proposal.commitment.trades_root {
            return Err("recomputed root does not match commitment".into());
        }
        Ok(set)
    }

    async fn admission_reason(&self, filler_amount: alloy_primitives::U256) -> Option<String> {
        if self.config.role != Role::Taker {
            return Some("not accepting proposals".into());
        }
        if self.monitor.over_soft_limit() {
            return Some("memory pressure".into());
        }
        if self.state.active_count() >= self.config.max_active_bets {
            return Some("active bet cap reached".into());
        }
        match self.chain.vault_balance(self.signer.address()).await {
            Ok(balance) if balance.available >= filler_amount => None,
            Ok(_) => Some("insufficient vault balance".into()),
            Err(e) => {
                warn!("balance check failed: {e}");
                Some("balance unavailable".into())
            }
        }
    }

    /// recompute our view of a bet's outcome at settlement time
    async fn recompute_outcome(&self, bet: &ActiveBet) -> anyhow::Result<outcome::BetOutcome> {
        let exits = self.oracle.exit_prices(&bet.trade_set.tickers()).await?;
        let resolved = outcome::resolve_trades(bet.trade_set.trades(), &exits);
        Ok(outcome::tally(&resolved, bet.commitment.creator, bet.commitment.filler))
    }
}

#[async_trait]
impl BetHandlers for TakerHandlers {
    async fn on_proposal(&self, proposal: ProposalRequest) -> ProposalResponse {
        if proposal.commitment.filler != self.signer.address() {
            return ProposalResponse::rejected("proposal names a different filler");
        }
        if let Some(reason) = self.admission_reason(proposal.commitment.filler_amount).await {
            return ProposalResponse::rejected(reason);
        }
        let trade_set = match self.rebuild_trade_set(&proposal) {
            Ok(set) => set,
            Err(reason) => return ProposalResponse::rejected(reason),
        };

        let commitment = proposal.commitment.to_commitment();
        let sig = match sign_commitment(
            &self.signer,
            &commitment,
            self.config.vault_address,
            self.config.chain_id,
        ) {
            Ok(sig) => sig,
            Err(e) => {
                warn!("counter-signing failed: {e}");
                return ProposalResponse::rejected("signing failure");
            }
        };

        let root = trade_set.root();
        self.state.insert_pending(
            root,
            PendingProposal { proposal, trade_set, received_at: Instant::now() },
        );
        info!(%root, "proposal accepted, waiting for on-chain commit");
        ProposalResponse::accepted(sig, self.signer.address())
    }

    async fn on_bet_committed(&self, notice: BetCommittedNotice) -> AckResponse {
        if notice.filler != self.signer.address() {
            warn!(bet_id = notice.bet_id, "commit notice for a different filler");
            return AckResponse { acknowledged: false };
        }
        let Some(pending) = self.state.take_pending(&notice.trades_root) else {
            warn!(bet_id = notice.bet_id, root = %notice.trades_root, "no pending proposal for commit notice");
            return AckResponse { acknowledged: false };
        };

        let commitment = pending.proposal.commitment.to_commitment();
        let deadline = pending.proposal.commitment.deadline;
        let inserted = self.state.insert_active(ActiveBet {
            bet_id: notice.bet_id,
            commitment,
            trade_set: pending.trade_set.clone(),
            counterparty: notice.creator,
            role: Role::Taker,
            deadline,
            state: BetState::Committed,
            outcome: None,
        });
        if !inserted {
            warn!(bet_id = notice.bet_id, "bet id already tracked");
            return AckResponse { acknowledged: false };
        }

        if let Err(e) = self.store.store(notice.bet_id, pending.trade_set).await {
            warn!(bet_id = notice.bet_id, "failed to persist taker trade set: {e}");
        }
        info!(bet_id = notice.bet_id, "bet mirrored from commit notice");
        AckResponse { acknowledged: true }
    }

    async fn on_trades(&self, push: TradesPush) {
        let trades = match decode_trades_blob(&push.trades_gz) {
            Ok(trades) => trades,
            Err(e) => {
                warn!(bet_id = push.bet_id, "pushed trade blob does not decode: {e}");
                return;
            }
        };
        let set = match TradeSet::from_trades(&push.snapshot_id, trades, push.mode) {
            Ok(set) => set,
            Err(e) => {
                warn!(bet_id = push.bet_id, "pushed trade set rebuild failed: {e}");
                return;
            }
        };
        if let Err(e) = self.store.store(push.bet_id, set).await {
            warn!(bet_id = push.bet_id, "failed to persist pushed trades: {e}");
        }
    }

    async fn on_settlement_proposal(&self, proposal: SettlementProposal) -> SettlementResponse {
        let Some(bet) = self.state.get_active(proposal.bet_id) else {
            return SettlementResponse::disagree(None);
        };
        if proposal.signer != bet.counterparty {
            warn!(bet_id = proposal.bet_id, "settlement proposal from a stranger");
            return SettlementResponse::disagree(None);
        }
        if bet.deadline > now_secs() {
            return SettlementResponse::disagree(None);
        }

        let ours = match self.recompute_outcome(&bet).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(bet_id = proposal.bet_id, "outcome recompute failed: {e}");
                return SettlementResponse::disagree(None);
            }
        };

        let matches = ours.winner == proposal.winner
            && ours.wins_count == proposal.wins_count
            && ours.valid_trades == proposal.valid_trades
            && ours.is_tie == proposal.is_tie;
        let our_wire = OutcomeWire {
            winner: ours.winner,
            wins_count: ours.wins_count,
            valid_trades: ours.valid_trades,
            is_tie: ours.is_tie,
        };
        if !matches {
            info!(bet_id = proposal.bet_id, "settlement disagreement");
            return SettlementResponse::disagree(Some(our_wire));
        }

        let agreement = proposal.to_agreement();
        match sign_agreement(
            &self.signer,
            &agreement,
            self.config.vault_address,
            self.config.chain_id,
        ) {
            Ok(sig) => {
                self.state.update_active(proposal.bet_id, |b| {
                    b.state = BetState::Settling;
                    b.outcome = Some(ours.clone());
                });
                info!(bet_id = proposal.bet_id, "settlement agreement co-signed");
                SettlementResponse::agree(sig)
            }
            Err(e) => {
                warn!(bet_id = proposal.bet_id, "agreement signing failed: {e}");
                SettlementResponse::disagree(Some(our_wire))
            }
        }
    }

    async fn on_commitment_sign(&self, request: CommitmentSignRequest) -> ProposalResponse {
        if request.commitment.filler != self.signer.address() {
            return ProposalResponse::rejected("commitment names a different filler");
        }
        if let Some(reason) = self.admission_reason(request.commitment.filler_amount).await {
            return ProposalResponse::rejected(reason);
        }
        let commitment = request.commitment.to_commitment();
        match sign_commitment(
            &self.signer,
            &commitment,
            self.config.vault_address,
            self.config.chain_id,
        ) {
            Ok(sig) => ProposalResponse::accepted(sig, self.signer.address()),
            Err(e) => {
                warn!("co-sign request failed: {e}");
                ProposalResponse::rejected("signing failure")
            }
        }
    }

    async fn trades_blob(&self, bet_id: u64, indices: &[u64]) -> Option<TradesBlobResponse> {
        let set = match self.store.load(bet_id).await {
            Ok(set) => set,
            Err(parlay_store::StoreError::NotFound(_)) => return None,
            Err(e) => {
                warn!(bet_id, "trade set load failed: {e}");
                return None;
            }
        };

        let mut proofs = Vec::new();
        if set.mode() == parlay_core::CommitmentMode::Merkle && !indices.is_empty() {
            let tree = MerkleTree::build(set.trades()).ok()?;
            for &index in indices {
                let proof = tree.proof(index as usize).ok()?;
                proofs.push((&proof).into());
            }
        }

        let blob = encode_trades_blob(set.trades()).ok()?;
        Some(TradesBlobResponse {
            bet_id,
            snapshot_id: set.snapshot_id().to_string(),
            mode: set.mode(),
            root: set.root(),
            trades_gz: blob.into(),
            proofs,
        })
    }

    async fn settlement_view(&self, bet_id: u64) -> Option<SettlementView> {
        if let Some(bet) = self.state.get_active(bet_id) {
            let state = match bet.state {
                BetState::Pending => "pending",
                BetState::Committed => "committed",
                BetState::Settling => "settling",
                BetState::Settled => "settled",
            };
            return Some(SettlementView {
                bet_id,
                state: state.into(),
                deadline: bet.deadline,
                outcome: bet.outcome.map(|o| OutcomeWire {
                    winner: o.winner,
                    wins_count: o.wins_count,
                    valid_trades: o.valid_trades,
                    is_tie: o.is_tie,
                }),
            });
        }

        // evicted from memory but settled on disk
        let record = self.store.load_resolution(bet_id).await.ok()?;
        Some(SettlementView {
            bet_id,
            state: "settled".into(),
            deadline: 0,
            outcome: Some(OutcomeWire {
                winner: record.winner,
                wins_count: record.wins_count,
                valid_trades: record.valid_trades,
                is_tie: record.is_tie,
            }),
        })
    }
}
