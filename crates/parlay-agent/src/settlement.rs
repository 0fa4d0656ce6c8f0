//! settlement scanner
//!
//! runs on both roles. for every committed bet past its deadline:
//! fetch exits, resolve, persist the resolution record, sign the
//! agreement and offer it to the counterparty. if they co-sign, settle
//! by agreement; if they are silent or disagree and we won, request
//! arbitration. a bet that fails a step stays committed and retries on
//! the next tick; a settling bet is polled until the chain reports
//! settled.

use crate::config::AgentConfig;
use crate::maker::now_secs;
use crate::oracle::OracleClient;
use crate::state::{ActiveBet, AgentState, BetState};
use anyhow::{Context, Result};
use parlay_chain::ChainClient;
use parlay_core::abi::{BetStatus, SettlementAgreement};
use parlay_core::{outcome, sign_agreement, verify_agreement};
use parlay_crypto::AgentSigner;
use parlay_p2p::messages::{parse_signature, SettlementProposal, SettlementVote};
use parlay_p2p::PeerClient;
use parlay_store::{ResolutionRecord, TradeStore};
use alloy_primitives::{Signature, U256};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

const AGREEMENT_EXPIRY_SECS: u64 = 300;

pub struct SettlementScanner {
    config: Arc<AgentConfig>,
    signer: Arc<AgentSigner>,
    state: Arc<AgentState>,
    chain: Arc<ChainClient>,
    oracle: OracleClient,
    store: TradeStore,
    peers: PeerClient,
}

impl SettlementScanner {
    pub fn new(
        config: Arc<AgentConfig>,
        signer: Arc<AgentSigner>,
        state: Arc<AgentState>,
        chain: Arc<ChainClient>,
        oracle: OracleClient,
        store: TradeStore,
    ) -> Self {
        Self { config, signer, state, chain, oracle, store, peers: PeerClient::new() }
    }

    /// one scanner pass; per-bet errors are contained
    pub async fn tick(&self) {
        let now = now_secs();
        for bet_id in self.state.due_for_settlement(now) {
            if let Err(e) = self.settle_bet(bet_id).await {
                // back to committed so the next tick retries from scratch
                self.state.update_active(bet_id, |b| {
                    if b.state == BetState::Settling {
                        b.state = BetState::Committed;
                    }
                });
                self.state.counters.record_error();
                warn!(bet_id, "settlement attempt failed, will retry: {e:#}");
            }
        }
        for bet_id in self.state.settling() {
            if let Err(e) = self.poll_settled(bet_id).await {
                warn!(bet_id, "settled poll failed: {e:#}");
            }
        }
    }

    async fn settle_bet(&self, bet_id: u64) -> Result<()> {
        let Some(bet) = self.state.get_active(bet_id) else {
            return Ok(());
        };

        // the chain may already be ahead of us: the counterparty can
        // settle or arbitrate without our help
        match self.chain.get_bet(bet_id).await.context("bet status")?.status {
            BetStatus::Settled => {
                self.state.update_active(bet_id, |b| b.state = BetState::Settled);
                self.state.counters.bets_settled.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("parlay_bets_settled_total").increment(1);
                return Ok(());
            }
            BetStatus::InArbitration => {
                self.state.update_active(bet_id, |b| b.state = BetState::Settling);
                return Ok(());
            }
            _ => {}
        }

        let exits = self
            .oracle
            .exit_prices(&bet.trade_set.tickers())
            .await
            .context("exit prices")?;
        let resolved = outcome::resolve_trades(bet.trade_set.trades(), &exits);
        let ours = outcome::tally(&resolved, bet.commitment.creator, bet.commitment.filler);
        info!(
            bet_id,
            winner = %ours.winner,
            wins = ours.wins_count,
            valid = ours.valid_trades,
            "outcome computed"
        );

        let record = ResolutionRecord {
            bet_id,
            winner: ours.winner,
            wins_count: ours.wins_count,
            valid_trades: ours.valid_trades,
            is_tie: ours.is_tie,
            exit_prices: resolved.iter().map(|t| t.exit_price).collect(),
            maker_won: resolved.iter().map(|t| !t.cancelled && t.won).collect(),
            settled_at: now_secs(),
        };
        self.store
            .store_resolution(record)
            .await
            .context("persisting resolution record")?;

        self.state.update_active(bet_id, |b| {
            b.state = BetState::Settling;
            b.outcome = Some(ours.clone());
        });

        let agreement = SettlementAgreement {
            betId: U256::from(bet_id),
            winner: ours.winner,
            winsCount: U256::from(ours.wins_count),
            validTrades: U256::from(ours.valid_trades),
            isTie: ours.is_tie,
            expiry: U256::from(now_secs() + AGREEMENT_EXPIRY_SECS),
            settlementNonce: self
                .chain
                .vault_nonce(self.signer.address())
                .await
                .context("settlement nonce")?,
        };
        let our_sig = sign_agreement(
            &self.signer,
            &agreement,
            self.config.vault_address,
            self.config.chain_id,
        )?;

        match self.collect_counterparty_sig(&bet, &agreement, &our_sig).await {
            Some(their_sig) => {
                // sigA is the creator's signature, sigB the filler's
                let (sig_a, sig_b) = if bet.commitment.creator == self.signer.address() {
                    (our_sig, their_sig)
                } else {
                    (their_sig, our_sig)
                };
                self.chain
                    .settle_by_agreement(&agreement, &sig_a, &sig_b)
                    .await
                    .context("settle by agreement")?;
                info!(bet_id, "settled by mutual agreement");
            }
            None if ours.winner == self.signer.address() => {
                self.chain
                    .request_arbitration(bet_id)
                    .await
                    .context("arbitration request")?;
                info!(bet_id, "arbitration requested");
            }
            None => {
                // the loser never escalates; drop back to committed and
                // re-offer the agreement next tick until the winner's
                // arbitration shows up on-chain
                self.state.update_active(bet_id, |b| b.state = BetState::Committed);
                info!(bet_id, "no agreement collected, will re-offer next tick");
            }
        }
        Ok(())
    }

    /// offer the signed agreement to the counterparty; any failure is a
    /// silent no, the conservative path handles it
    async fn collect_counterparty_sig(
        &self,
        bet: &ActiveBet,
        agreement: &SettlementAgreement,
        our_sig: &Signature,
    ) -> Option<Signature> {
        let endpoint = match self.chain.bot_endpoint(bet.counterparty).await {
            Ok(endpoint) if !endpoint.is_empty() => endpoint,
            Ok(_) => {
                warn!(bet_id = bet.bet_id, "counterparty has no registered endpoint");
                return None;
            }
            Err(e) => {
                warn!(bet_id = bet.bet_id, "endpoint lookup failed: {e}");
                return None;
            }
        };

        let proposal = SettlementProposal {
            bet_id: bet.bet_id,
            winner: agreement.winner,
            wins_count: agreement.winsCount.to::<u64>(),
            valid_trades: agreement.validTrades.to::<u64>(),
            is_tie: agreement.isTie,
            expiry: agreement.expiry.to::<u64>(),
            settlement_nonce: agreement.settlementNonce,
            signer: self.signer.address(),
            signature: our_sig.as_bytes().to_vec().into(),
        };

        let response = match self.peers.propose_settlement(&endpoint, &proposal).await {
            Ok(response) => response,
            Err(e) => {
                warn!(bet_id = bet.bet_id, "settlement proposal failed: {e}");
                return None;
            }
        };
        if response.status != SettlementVote::Agree {
            info!(bet_id = bet.bet_id, "counterparty disagreed with outcome");
            return None;
        }
        let raw = response.signature?;
        let sig = parse_signature(&raw).ok()?;
        if !verify_agreement(
            agreement,
            &sig,
            bet.counterparty,
            self.config.vault_address,
            self.config.chain_id,
        ) {
            warn!(bet_id = bet.bet_id, "counterparty agreement signature invalid");
            return None;
        }
        Some(sig)
    }

    /// settling -> settled once the chain says so
    async fn poll_settled(&self, bet_id: u64) -> Result<()> {
        let info = self.chain.get_bet(bet_id).await.context("bet status")?;
        match info.status {
            BetStatus::Settled => {
                self.state.update_active(bet_id, |b| b.state = BetState::Settled);
                self.state.counters.bets_settled.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("parlay_bets_settled_total").increment(1);
                info!(bet_id, "bet settled on-chain");
            }
            BetStatus::InArbitration => {
                // the arbitrator is working; keep polling
            }
            status => {
                warn!(bet_id, ?status, "unexpected on-chain status while settling");
            }
        }
        Ok(())
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(self.config.settlement_check_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            interval_secs = self.config.settlement_check_interval.as_secs(),
            "settlement scanner started"
        );
        loop {
            tokio::select! {
                _ = tick.tick() => self.tick().await,
                _ = shutdown.changed() => break,
            }
        }
    }
}
