//! maker loop
//!
//! one tick: gates (overlap, memory, balance), pick the first healthy
//! peer, snapshot prices, build and sign the commitment, propose,
//! commit on-chain, mirror to the taker. any failure aborts the tick;
//! the next tick starts clean.

use crate::config::AgentConfig;
use crate::memory::MemoryMonitor;
use crate::oracle::OracleClient;
use crate::state::{ActiveBet, AgentState, BetState};
use anyhow::{anyhow, bail, Context, Result};
use parlay_chain::ChainClient;
use parlay_core::abi::BetCommitment;
use parlay_core::{
    encode_trades_blob, sign_commitment, verify_commitment, CommitmentParams, Method, TradeSet,
};
use parlay_crypto::AgentSigner;
use parlay_p2p::messages::{
    parse_signature, BetCommittedNotice, CommitmentWire, ProposalRequest, TradesPush,
};
use parlay_p2p::{Peer, PeerClient, PeerDiscovery};
use parlay_store::TradeStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::{info, warn};

pub struct MakerLoop {
    config: Arc<AgentConfig>,
    signer: Arc<AgentSigner>,
    state: Arc<AgentState>,
    chain: Arc<ChainClient>,
    oracle: OracleClient,
    discovery: Arc<PeerDiscovery>,
    peers: PeerClient,
    store: TradeStore,
    monitor: Arc<MemoryMonitor>,
    in_flight: AtomicBool,
}

impl MakerLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<AgentConfig>,
        signer: Arc<AgentSigner>,
        state: Arc<AgentState>,
        chain: Arc<ChainClient>,
        oracle: OracleClient,
        discovery: Arc<PeerDiscovery>,
        store: TradeStore,
        monitor: Arc<MemoryMonitor>,
    ) -> Self {
        Self {
            config,
            signer,
            state,
            chain,
            oracle,
            discovery,
            peers: PeerClient::new(),
            store,
            monitor,
            in_flight: AtomicBool::new(false),
        }
    }

    /// one trading tick; never propagates errors past the boundary
    pub async fn tick(&self) {
        if self.in_flight.swap(true, Ordering::Acquire) {
            warn!("previous trading tick still running, skipping");
            return;
        }
        match self.try_create_bet().await {
            Ok(Some(bet_id)) => info!(bet_id, "bet created"),
            Ok(None) => {}
            Err(e) => {
                self.state.counters.record_error();
                warn!("trading tick failed: {e:#}");
            }
        }
        self.in_flight.store(false, Ordering::Release);
    }

    async fn try_create_bet(&self) -> Result<Option<u64>> {
        if self.monitor.over_soft_limit() {
            warn!("memory pressure, skipping bet creation");
            return Ok(None);
        }
        if self.state.active_count() >= self.config.max_active_bets {
            return Ok(None);
        }

        let me = self.signer.address();
        let balance = self.chain.vault_balance(me).await.context("vault balance")?;
        if balance.available < self.config.stake_amount {
            info!(
                available = %balance.available,
                needed = %self.config.stake_amount,
                "insufficient vault balance, skipping tick"
            );
            return Ok(None);
        }

        let Some(peer) = self.discovery.healthy_peers().into_iter().next() else {
            info!("no healthy peers, skipping tick");
            return Ok(None);
        };

        let snapshot = self.oracle.snapshot(self.config.num_assets).await.context("oracle")?;
        let method = Method::parse(&self.config.default_method);
        let trade_set = TradeSet::build(
            &snapshot.snapshot_id,
            &snapshot.prices,
            &method,
            self.config.fast_hash_threshold,
        )?;

        let now = now_secs();
        let nonce = self.chain.vault_nonce(me).await.context("vault nonce")?;
        let commitment = BetCommitment::from_params(
            CommitmentParams {
                trades_root: trade_set.root(),
                creator: me,
                filler: peer.address,
                creator_stake: self.config.stake_amount,
                odds: None,
                deadline: now + self.config.deadline_offset_secs,
                nonce,
                expiry: None,
            },
            now,
        );

        let bet_id = self.propose_and_commit(&peer, commitment, &trade_set).await?;
        Ok(Some(bet_id))
    }

    async fn propose_and_commit(
        &self,
        peer: &Peer,
        commitment: BetCommitment,
        trade_set: &TradeSet,
    ) -> Result<u64> {
        let vault = self.config.vault_address;
        let chain_id = self.config.chain_id;
        let our_sig = sign_commitment(&self.signer, &commitment, vault, chain_id)?;

        let proposal = ProposalRequest {
            commitment: CommitmentWire::from(&commitment),
            snapshot_id: trade_set.snapshot_id().to_string(),
            mode: trade_set.mode(),
            trade_count: trade_set.len() as u64,
            trades_gz: encode_trades_blob(trade_set.trades())?.into(),
            signer: self.signer.address(),
            signature: our_sig.as_bytes().to_vec().into(),
            expiry: commitment.expiry.to::<u64>(),
        };

        let decision = self
            .peers
            .send_proposal(&peer.endpoint, &proposal)
            .await
            .context("sending proposal")?;
        if !decision.accepted {
            bail!(
                "peer {} declined: {}",
                peer.address,
                decision.reason.unwrap_or_else(|| "no reason".into())
            );
        }
        let their_sig = decision
            .signature
            .as_ref()
            .ok_or_else(|| anyhow!("acceptance without signature"))?;
        let their_sig = parse_signature(their_sig)?;
        let their_signer = decision
            .signer
            .ok_or_else(|| anyhow!("acceptance without signer"))?;
        if their_signer != peer.address
            || !verify_commitment(&commitment, &their_sig, commitment.filler, vault, chain_id)
        {
            bail!("taker signature does not verify against filler {}", commitment.filler);
        }

        let commit = self
            .chain
            .commit_bilateral_bet(&commitment, &our_sig, &their_sig)
            .await
            .context("on-chain commit")?;

        // local mirror before telling the counterparty, so a settle tick
        // can never observe the chain ahead of our own state
        if let Err(e) = self.store.store(commit.bet_id, trade_set.clone()).await {
            warn!(bet_id = commit.bet_id, "failed to persist trade set: {e}");
        }
        self.state.insert_active(ActiveBet {
            bet_id: commit.bet_id,
            commitment: commitment.clone(),
            trade_set: trade_set.clone(),
            counterparty: peer.address,
            role: crate::config::Role::Maker,
            deadline: commitment.deadline.to::<u64>(),
            state: BetState::Committed,
            outcome: None,
        });
        self.state.counters.bets_created.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("parlay_bets_created_total").increment(1);

        self.notify_committed(peer, &commitment, commit.bet_id, commit.tx_hash).await;

        // fast-hash commitments carry no proofs, so a dispute needs the
        // full list on both sides; push it while the peer is reachable
        if trade_set.mode() == parlay_core::CommitmentMode::FastHash {
            self.push_trades(peer, commit.bet_id, trade_set).await;
        }
        Ok(commit.bet_id)
    }

    async fn push_trades(&self, peer: &Peer, bet_id: u64, trade_set: &TradeSet) {
        let blob = match encode_trades_blob(trade_set.trades()) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(bet_id, "trade blob encode failed: {e}");
                return;
            }
        };
        let mut push = TradesPush {
            bet_id,
            snapshot_id: trade_set.snapshot_id().to_string(),
            mode: trade_set.mode(),
            trades_gz: blob.into(),
            expiry: now_secs() + 300,
            signer: self.signer.address(),
            signature: Default::default(),
        };
        match self.signer.sign_hash(&push.digest()) {
            Ok(sig) => push.signature = sig.as_bytes().to_vec().into(),
            Err(e) => {
                warn!(bet_id, "trade push signing failed: {e}");
                return;
            }
        }
        if let Err(e) = self.peers.push_trades(&peer.endpoint, &push).await {
            warn!(bet_id, peer = %peer.address, "trade push failed: {e}");
        }
    }

    /// best-effort mirror notification; the taker can also discover the
    /// commit from the chain
    async fn notify_committed(
        &self,
        peer: &Peer,
        commitment: &BetCommitment,
        bet_id: u64,
        tx_hash: alloy_primitives::B256,
    ) {
        let mut notice = BetCommittedNotice {
            bet_id,
            trades_root: commitment.tradesRoot,
            creator: commitment.creator,
            filler: commitment.filler,
            tx_hash,
            expiry: now_secs() + 300,
            signer: self.signer.address(),
            signature: Default::default(),
        };
        match self.signer.sign_hash(&notice.digest()) {
            Ok(sig) => notice.signature = sig.as_bytes().to_vec().into(),
            Err(e) => {
                warn!(bet_id, "failed to sign commit notice: {e}");
                return;
            }
        }
        match self.peers.notify_committed(&peer.endpoint, &notice).await {
            Ok(ack) if ack.acknowledged => {}
            Ok(_) => warn!(bet_id, peer = %peer.address, "taker did not acknowledge commit"),
            Err(e) => warn!(bet_id, peer = %peer.address, "commit notification failed: {e}"),
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(self.config.trading_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            interval_secs = self.config.trading_interval.as_secs(),
            "maker loop started"
        );
        loop {
            tokio::select! {
                _ = tick.tick() => self.tick().await,
                _ = shutdown.changed() => break,
            }
        }
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
