//! wire messages
//!
//! canonical json: camelCase field names, uint256 values as decimal
//! strings, byte blobs as 0x-hex. every inbound type is promoted to
//! strong types here; nothing downstream touches raw json.

use alloy_primitives::{keccak256, Address, Bytes, Signature, B256, U256};
use parlay_codec::json::u256_dec;
use parlay_core::abi::{BetCommitment, SettlementAgreement};
use parlay_core::{CommitmentMode, MerkleProof};
use serde::{Deserialize, Serialize};

/// commitment as it travels between peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentWire {
    pub trades_root: B256,
    pub creator: Address,
    pub filler: Address,
    #[serde(with = "u256_dec")]
    pub creator_amount: U256,
    #[serde(with = "u256_dec")]
    pub filler_amount: U256,
    pub deadline: u64,
    #[serde(with = "u256_dec")]
    pub nonce: U256,
    pub expiry: u64,
}

impl From<&BetCommitment> for CommitmentWire {
    fn from(c: &BetCommitment) -> Self {
        Self {
            trades_root: c.tradesRoot,
            creator: c.creator,
            filler: c.filler,
            creator_amount: c.creatorAmount,
            filler_amount: c.fillerAmount,
            deadline: c.deadline.to::<u64>(),
            nonce: c.nonce,
            expiry: c.expiry.to::<u64>(),
        }
    }
}

impl CommitmentWire {
    pub fn to_commitment(&self) -> BetCommitment {
        BetCommitment {
            tradesRoot: self.trades_root,
            creator: self.creator,
            filler: self.filler,
            creatorAmount: self.creator_amount,
            fillerAmount: self.filler_amount,
            deadline: U256::from(self.deadline),
            nonce: self.nonce,
            expiry: U256::from(self.expiry),
        }
    }
}

/// maker -> taker: bilateral bet proposal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalRequest {
    pub commitment: CommitmentWire,
    pub snapshot_id: String,
    pub mode: CommitmentMode,
    pub trade_count: u64,
    /// gzipped canonical-json trade list
    pub trades_gz: Bytes,
    pub signer: Address,
    /// typed-data signature over the commitment
    pub signature: Bytes,
    pub expiry: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ProposalResponse {
    pub fn accepted(signature: Signature, signer: Address) -> Self {
        Self {
            accepted: true,
            signature: Some(signature.as_bytes().to_vec().into()),
            signer: Some(signer),
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self { accepted: false, signature: None, signer: None, reason: Some(reason.into()) }
    }
}

/// maker -> taker: the bet is on-chain, mirror it locally
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetCommittedNotice {
    pub bet_id: u64,
    pub trades_root: B256,
    pub creator: Address,
    pub filler: Address,
    pub tx_hash: B256,
    pub expiry: u64,
    pub signer: Address,
    pub signature: Bytes,
}

impl BetCommittedNotice {
    /// digest the maker signs; binds every field that matters to the
    /// taker's local record
    pub fn digest(&self) -> B256 {
        let mut preimage = Vec::with_capacity(14 + 8 + 32 + 20 + 20 + 32 + 8);
        preimage.extend_from_slice(b"bet-committed:");
        preimage.extend_from_slice(&self.bet_id.to_be_bytes());
        preimage.extend_from_slice(self.trades_root.as_slice());
        preimage.extend_from_slice(self.creator.as_slice());
        preimage.extend_from_slice(self.filler.as_slice());
        preimage.extend_from_slice(self.tx_hash.as_slice());
        preimage.extend_from_slice(&self.expiry.to_be_bytes());
        keccak256(preimage)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    pub acknowledged: bool,
}

/// authenticated push of a trade blob
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradesPush {
    pub bet_id: u64,
    pub snapshot_id: String,
    pub mode: CommitmentMode,
    pub trades_gz: Bytes,
    pub expiry: u64,
    pub signer: Address,
    pub signature: Bytes,
}

impl TradesPush {
    pub fn digest(&self) -> B256 {
        let mut preimage = Vec::new();
        preimage.extend_from_slice(b"trades-push:");
        preimage.extend_from_slice(&self.bet_id.to_be_bytes());
        preimage.extend_from_slice(self.snapshot_id.as_bytes());
        preimage.extend_from_slice(&self.expiry.to_be_bytes());
        preimage.extend_from_slice(&keccak256(&self.trades_gz).0);
        keccak256(preimage)
    }
}

/// authenticated pull: digest covered by the `X-Signature` header on
/// `GET /p2p/trades/{betId}`
pub fn trades_pull_digest(bet_id: u64, timestamp: u64) -> B256 {
    keccak256(format!("trades-pull:{bet_id}:{timestamp}"))
}

/// trade blob with optional per-trade proofs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradesBlobResponse {
    pub bet_id: u64,
    pub snapshot_id: String,
    pub mode: CommitmentMode,
    pub root: B256,
    pub trades_gz: Bytes,
    /// proofs for the indices the caller asked for; merkle mode only
    pub proofs: Vec<ProofWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofWire {
    pub index: u64,
    pub siblings: Vec<B256>,
}

impl From<&MerkleProof> for ProofWire {
    fn from(p: &MerkleProof) -> Self {
        Self { index: p.index as u64, siblings: p.siblings.clone() }
    }
}

/// settlement outcome proposal, signed over the eip-712 agreement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementProposal {
    pub bet_id: u64,
    pub winner: Address,
    pub wins_count: u64,
    pub valid_trades: u64,
    pub is_tie: bool,
    pub expiry: u64,
    #[serde(with = "u256_dec")]
    pub settlement_nonce: U256,
    pub signer: Address,
    pub signature: Bytes,
}

impl SettlementProposal {
    pub fn to_agreement(&self) -> SettlementAgreement {
        SettlementAgreement {
            betId: U256::from(self.bet_id),
            winner: self.winner,
            winsCount: U256::from(self.wins_count),
            validTrades: U256::from(self.valid_trades),
            isTie: self.is_tie,
            expiry: U256::from(self.expiry),
            settlementNonce: self.settlement_nonce,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResponse {
    pub status: SettlementVote,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub our_outcome: Option<OutcomeWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Bytes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementVote {
    Agree,
    Disagree,
}

impl SettlementResponse {
    pub fn agree(signature: Signature) -> Self {
        Self {
            status: SettlementVote::Agree,
            our_outcome: None,
            signature: Some(signature.as_bytes().to_vec().into()),
        }
    }

    pub fn disagree(our_outcome: Option<OutcomeWire>) -> Self {
        Self { status: SettlementVote::Disagree, our_outcome, signature: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeWire {
    pub winner: Address,
    pub wins_count: u64,
    pub valid_trades: u64,
    pub is_tie: bool,
}

/// ask a peer to co-sign a pre-specified commitment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentSignRequest {
    pub commitment: CommitmentWire,
    pub expiry: u64,
    pub signer: Address,
    pub signature: Bytes,
}

/// local settlement view for `GET /p2p/settlement/{betId}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementView {
    pub bet_id: u64,
    pub state: String,
    pub deadline: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub address: Address,
    pub endpoint: String,
    pub pubkey_hash: B256,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub uptime_secs: u64,
}

/// parse a 65-byte wire signature
pub fn parse_signature(raw: &Bytes) -> Result<Signature, crate::P2pError> {
    Signature::from_raw(raw)
        .map_err(|e| crate::P2pError::InvalidMessage(format!("bad signature: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_wire_roundtrip() {
        let commitment = BetCommitment {
            tradesRoot: keccak256(b"root"),
            creator: Address::from([1; 20]),
            filler: Address::from([2; 20]),
            creatorAmount: U256::from(10).pow(U256::from(17)),
            fillerAmount: U256::from(10).pow(U256::from(17)),
            deadline: U256::from(1_700_000_100u64),
            nonce: U256::from(3u64),
            expiry: U256::from(1_700_000_400u64),
        };
        let wire = CommitmentWire::from(&commitment);
        assert_eq!(wire.to_commitment(), commitment);

        let json = serde_json::to_string(&wire).unwrap();
        // amounts travel as decimal strings
        assert!(json.contains("\"creatorAmount\":\"100000000000000000\""));
        let back: CommitmentWire = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wire);
    }

    #[test]
    fn notice_digest_binds_fields() {
        let notice = BetCommittedNotice {
            bet_id: 7,
            trades_root: keccak256(b"r"),
            creator: Address::from([1; 20]),
            filler: Address::from([2; 20]),
            tx_hash: keccak256(b"tx"),
            expiry: 100,
            signer: Address::from([1; 20]),
            signature: Bytes::new(),
        };
        let base = notice.digest();
        let mut other = notice.clone();
        other.bet_id = 8;
        assert_ne!(base, other.digest());
        let mut other = notice;
        other.expiry = 101;
        assert_ne!(base, other.digest());
    }

    #[test]
    fn pull_digest_varies_by_bet_and_time() {
        assert_ne!(trades_pull_digest(1, 10), trades_pull_digest(2, 10));
        assert_ne!(trades_pull_digest(1, 10), trades_pull_digest(1, 11));
    }

    #[test]
    fn parse_signature_rejects_short_input() {
        assert!(parse_signature(&Bytes::from(vec![0u8; 10])).is_err());
    }

    #[test]
    fn settlement_proposal_maps_to_agreement() {
        let proposal = SettlementProposal {
            bet_id: 9,
            winner: Address::from([5; 20]),
            wins_count: 3,
            valid_trades: 4,
            is_tie: false,
            expiry: 1_700_000_000,
            settlement_nonce: U256::from(2u64),
            signer: Address::from([5; 20]),
            signature: Bytes::new(),
        };
        let agreement = proposal.to_agreement();
        assert_eq!(agreement.betId, U256::from(9u64));
        assert_eq!(agreement.winsCount, U256::from(3u64));
        assert!(!agreement.isTie);
    }
}
