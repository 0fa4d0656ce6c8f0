//! bet commitment construction and signing
//!
//! the commitment binds both parties to the trade-set root and the
//! stakes. hashing goes through the sol! struct in [`crate::abi`], so
//! the bytes agents sign are the bytes the vault contract verifies.

use crate::abi::{BetCommitment, SettlementAgreement};
use crate::error::{CoreError, Result};
use alloy_primitives::{Address, Signature, B256, U256};
use alloy_sol_types::{eip712_domain, Eip712Domain, SolStruct};
use parlay_crypto::{recover_address, AgentSigner};

/// typed-data domain shared by every signed struct in the protocol
pub fn vault_domain(chain_id: u64, vault: Address) -> Eip712Domain {
    eip712_domain! {
        name: "CollateralVault",
        version: "1",
        chain_id: chain_id,
        verifying_contract: vault,
    }
}

/// default signature validity window when the caller gives none
pub const DEFAULT_EXPIRY_SECS: u64 = 300;

/// inputs for building a fresh commitment on the maker side
#[derive(Debug, Clone)]
pub struct CommitmentParams {
    pub trades_root: B256,
    pub creator: Address,
    pub filler: Address,
    pub creator_stake: U256,
    /// filler stake as a ratio of the creator stake; `None` means even money
    pub odds: Option<(u64, u64)>,
    pub deadline: u64,
    pub nonce: U256,
    /// unix seconds; defaults to `now + DEFAULT_EXPIRY_SECS`
    pub expiry: Option<u64>,
}

impl BetCommitment {
    /// build from params, deriving the filler amount from the odds
    pub fn from_params(params: CommitmentParams, now: u64) -> Self {
        let filler_amount = match params.odds {
            Some((num, den)) if den != 0 => {
                params.creator_stake * U256::from(num) / U256::from(den)
            }
            _ => params.creator_stake,
        };
        BetCommitment {
            tradesRoot: params.trades_root,
            creator: params.creator,
            filler: params.filler,
            creatorAmount: params.creator_stake,
            fillerAmount: filler_amount,
            deadline: U256::from(params.deadline),
            nonce: params.nonce,
            expiry: U256::from(params.expiry.unwrap_or(now + DEFAULT_EXPIRY_SECS)),
        }
    }
}

/// typed-data signature over a commitment
pub fn sign_commitment(
    signer: &AgentSigner,
    commitment: &BetCommitment,
    vault: Address,
    chain_id: u64,
) -> Result<Signature> {
    let digest = commitment.eip712_signing_hash(&vault_domain(chain_id, vault));
    Ok(signer.sign_hash(&digest)?)
}

/// recover-and-compare verification of a commitment signature
pub fn verify_commitment(
    commitment: &BetCommitment,
    sig: &Signature,
    expected: Address,
    vault: Address,
    chain_id: u64,
) -> bool {
    let digest = commitment.eip712_signing_hash(&vault_domain(chain_id, vault));
    matches!(recover_address(&digest, sig), Ok(addr) if addr == expected)
}

/// typed-data signature over a settlement agreement
pub fn sign_agreement(
    signer: &AgentSigner,
    agreement: &SettlementAgreement,
    vault: Address,
    chain_id: u64,
) -> Result<Signature> {
    let digest = agreement.eip712_signing_hash(&vault_domain(chain_id, vault));
    Ok(signer.sign_hash(&digest)?)
}

pub fn verify_agreement(
    agreement: &SettlementAgreement,
    sig: &Signature,
    expected: Address,
    vault: Address,
    chain_id: u64,
) -> bool {
    let digest = agreement.eip712_signing_hash(&vault_domain(chain_id, vault));
    matches!(recover_address(&digest, sig), Ok(addr) if addr == expected)
}

/// chainable commitment assembly
///
/// collects the required fields one call at a time and refuses to build
/// until all of them are present; also tracks the two signatures so a
/// coordinator can ask `is_fully_signed` before going on-chain.
#[derive(Debug, Default, Clone)]
pub struct BilateralBetBuilder {
    trades_root: Option<B256>,
    creator: Option<Address>,
    filler: Option<Address>,
    creator_amount: Option<U256>,
    filler_amount: Option<U256>,
    deadline: Option<u64>,
    nonce: Option<U256>,
    expiry: Option<u64>,
    creator_sig: Option<Signature>,
    filler_sig: Option<Signature>,
}

impl BilateralBetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trades_root(mut self, root: B256) -> Self {
        self.trades_root = Some(root);
        self
    }

    pub fn creator(mut self, addr: Address) -> Self {
        self.creator = Some(addr);
        self
    }

    pub fn filler(mut self, addr: Address) -> Self {
        self.filler = Some(addr);
        self
    }

    pub fn creator_amount(mut self, amount: U256) -> Self {
        self.creator_amount = Some(amount);
        self
    }

    pub fn filler_amount(mut self, amount: U256) -> Self {
        self.filler_amount = Some(amount);
        self
    }

    pub fn deadline(mut self, unix_secs: u64) -> Self {
        self.deadline = Some(unix_secs);
        self
    }

    pub fn nonce(mut self, nonce: U256) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn expiry(mut self, unix_secs: u64) -> Self {
        self.expiry = Some(unix_secs);
        self
    }

    pub fn creator_signature(mut self, sig: Signature) -> Self {
        self.creator_sig = Some(sig);
        self
    }

    pub fn filler_signature(mut self, sig: Signature) -> Self {
        self.filler_sig = Some(sig);
        self
    }

    pub fn is_fully_signed(&self) -> bool {
        self.creator_sig.is_some() && self.filler_sig.is_some()
    }

    pub fn signatures(&self) -> (Option<Signature>, Option<Signature>) {
        (self.creator_sig, self.filler_sig)
    }

    pub fn build(&self) -> Result<BetCommitment> {
        Ok(BetCommitment {
            tradesRoot: self.trades_root.ok_or(CoreError::MissingField("tradesRoot"))?,
            creator: self.creator.ok_or(CoreError::MissingField("creator"))?,
            filler: self.filler.ok_or(CoreError::MissingField("filler"))?,
            creatorAmount: self
                .creator_amount
                .ok_or(CoreError::MissingField("creatorAmount"))?,
            fillerAmount: self
                .filler_amount
                .ok_or(CoreError::MissingField("fillerAmount"))?,
            deadline: U256::from(self.deadline.ok_or(CoreError::MissingField("deadline"))?),
            nonce: self.nonce.ok_or(CoreError::MissingField("nonce"))?,
            expiry: U256::from(self.expiry.ok_or(CoreError::MissingField("expiry"))?),
        })
    }
}
