//! handler callbacks
//!
//! one method per route, so bet policy is testable without an http
//! client. every method has a rejecting default; an agent wires in only
//! the roles it plays.

use crate::messages::{
    AckResponse, BetCommittedNotice, CommitmentSignRequest, ProposalRequest, ProposalResponse,
    SettlementProposal, SettlementResponse, SettlementView, TradesBlobResponse, TradesPush,
};
use async_trait::async_trait;

#[async_trait]
pub trait BetHandlers: Send + Sync {
    /// bilateral proposal; an accepting taker returns its signature
    async fn on_proposal(&self, _proposal: ProposalRequest) -> ProposalResponse {
        ProposalResponse::rejected("proposals not accepted")
    }

    /// maker's notification that the bet is committed on-chain
    async fn on_bet_committed(&self, _notice: BetCommittedNotice) -> AckResponse {
        AckResponse { acknowledged: false }
    }

    /// signed trade blob push; fire and forget
    async fn on_trades(&self, _push: TradesPush) {}

    /// counterparty's settlement outcome proposal
    async fn on_settlement_proposal(&self, _proposal: SettlementProposal) -> SettlementResponse {
        SettlementResponse::disagree(None)
    }

    /// co-signing request for a pre-specified commitment
    async fn on_commitment_sign(&self, _request: CommitmentSignRequest) -> ProposalResponse {
        ProposalResponse::rejected("co-signing not available")
    }

    /// trade blob (plus proofs for `indices`) for an authenticated pull
    async fn trades_blob(&self, _bet_id: u64, _indices: &[u64]) -> Option<TradesBlobResponse> {
        None
    }

    /// local settlement status
    async fn settlement_view(&self, _bet_id: u64) -> Option<SettlementView> {
        None
    }
}

/// all-defaults handler set, used by probes and tests
pub struct NoopHandlers;

#[async_trait]
impl BetHandlers for NoopHandlers {}
