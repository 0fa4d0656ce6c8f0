//! typed vault client
//!
//! reads are plain eth_calls and may run concurrently. writes hold the
//! nonce lock across read-nonce, sign, and broadcast so nonces from one
//! signer land strictly increasing; a revert never consumes the local
//! view of the nonce because the next write re-reads the counter.

use crate::error::{ChainError, Result};
use crate::rpc::{RpcClient, TxReceipt};
use crate::tx::build_signed_call;
use alloy_primitives::{Address, Signature, B256, U256};
use alloy_sol_types::{SolCall, SolEvent};
use parlay_core::abi::{BetStatus, IBotRegistry, ICollateralVault};
use parlay_core::abi::{BetCommitment, SettlementAgreement};
use parlay_crypto::AgentSigner;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const RECEIPT_POLL_ATTEMPTS: u32 = 60;

/// vault balance split
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VaultBalance {
    pub available: U256,
    pub locked: U256,
}

/// on-chain view of a bet
#[derive(Debug, Clone)]
pub struct BetInfo {
    pub status: BetStatus,
    pub creator: Address,
    pub filler: Address,
    pub trades_root: B256,
    pub deadline: u64,
}

/// result of a successful commit
#[derive(Debug, Clone, Copy)]
pub struct CommitResult {
    pub tx_hash: B256,
    pub bet_id: u64,
}

pub struct ChainClient {
    rpc: RpcClient,
    signer: Arc<AgentSigner>,
    vault: Address,
    registry: Address,
    chain_id: u64,
    // guards read-nonce -> sign -> broadcast -> receipt
    tx_lock: Mutex<()>,
}

impl ChainClient {
    pub fn new(
        rpc: RpcClient,
        signer: Arc<AgentSigner>,
        vault: Address,
        registry: Address,
        chain_id: u64,
    ) -> Self {
        Self { rpc, signer, vault, registry, chain_id, tx_lock: Mutex::new(()) }
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn read<C: SolCall>(&self, to: Address, call: C) -> Result<C::Return> {
        let data = call.abi_encode().into();
        let raw = self.rpc.eth_call(to, &data).await?;
        C::abi_decode_returns(&raw).map_err(|e| ChainError::Decode(e.to_string()))
    }

    // === vault reads ===

    pub async fn vault_balance(&self, addr: Address) -> Result<VaultBalance> {
        let ret = self.read(self.vault, ICollateralVault::balancesCall { account: addr }).await?;
        Ok(VaultBalance { available: ret.available, locked: ret.locked })
    }

    pub async fn vault_nonce(&self, addr: Address) -> Result<U256> {
        self.read(self.vault, ICollateralVault::noncesCall { account: addr }).await
    }

    pub async fn get_bet(&self, bet_id: u64) -> Result<BetInfo> {
        let ret = self.read(self.vault, ICollateralVault::getBetCall { betId: bet_id }).await?;
        let status = BetStatus::from_u8(ret.status)
            .ok_or_else(|| ChainError::Decode(format!("unknown bet status {}", ret.status)))?;
        Ok(BetInfo {
            status,
            creator: ret.creator,
            filler: ret.filler,
            trades_root: ret.tradesRoot,
            deadline: ret.deadline.to::<u64>(),
        })
    }

    pub async fn active_keeper_count(&self) -> Result<U256> {
        self.read(self.vault, ICollateralVault::getActiveKeeperCountCall {}).await
    }

    // === registry reads ===

    pub async fn is_registered(&self, addr: Address) -> Result<bool> {
        self.read(self.registry, IBotRegistry::isRegisteredCall { bot: addr }).await
    }

    pub async fn registered_bots(&self) -> Result<Vec<Address>> {
        self.read(self.registry, IBotRegistry::getRegisteredBotsCall {}).await
    }

    pub async fn bot_endpoint(&self, addr: Address) -> Result<String> {
        self.read(self.registry, IBotRegistry::getBotEndpointCall { bot: addr }).await
    }

    // === vault writes ===

    /// post the co-signed commitment; returns the chain-assigned bet id
    pub async fn commit_bilateral_bet(
        &self,
        commitment: &BetCommitment,
        creator_sig: &Signature,
        filler_sig: &Signature,
    ) -> Result<CommitResult> {
        let call = ICollateralVault::commitBilateralBetCall {
            commitment: commitment.clone(),
            sigCreator: creator_sig.as_bytes().to_vec().into(),
            sigFiller: filler_sig.as_bytes().to_vec().into(),
        };
        let receipt = self.submit(call.abi_encode()).await?;
        let bet_id = decode_committed_bet_id(&receipt)
            .ok_or_else(|| ChainError::Decode("no Committed event in receipt".into()))?;
        info!(bet_id, tx = %receipt.transaction_hash, "bet committed on-chain");
        Ok(CommitResult { tx_hash: receipt.transaction_hash, bet_id })
    }

    pub async fn settle_by_agreement(
        &self,
        agreement: &SettlementAgreement,
        sig_a: &Signature,
        sig_b: &Signature,
    ) -> Result<B256> {
        let call = ICollateralVault::settleByAgreementCall {
            agreement: agreement.clone(),
            sigA: sig_a.as_bytes().to_vec().into(),
            sigB: sig_b.as_bytes().to_vec().into(),
        };
        let receipt = self.submit(call.abi_encode()).await?;
        info!(tx = %receipt.transaction_hash, "bet settled by agreement");
        Ok(receipt.transaction_hash)
    }

    pub async fn request_arbitration(&self, bet_id: u64) -> Result<B256> {
        let call = ICollateralVault::requestArbitrationCall { betId: bet_id };
        let receipt = self.submit(call.abi_encode()).await?;
        info!(bet_id, tx = %receipt.transaction_hash, "arbitration requested");
        Ok(receipt.transaction_hash)
    }

    /// serialized write path; the lock spans nonce read to receipt so a
    /// concurrent write cannot reuse the nonce
    async fn submit(&self, calldata: Vec<u8>) -> Result<TxReceipt> {
        let _guard = self.tx_lock.lock().await;

        let sender = self.signer.address();
        let nonce = self.rpc.transaction_count(sender).await?;
        let gas_price = self.rpc.gas_price().await?;
        let raw = build_signed_call(
            &self.signer,
            self.chain_id,
            nonce,
            gas_price,
            self.vault,
            calldata,
        )?;

        let tx_hash = self.rpc.send_raw_transaction(&raw).await?;
        debug!(%tx_hash, nonce, "transaction broadcast");

        for _ in 0..RECEIPT_POLL_ATTEMPTS {
            if let Some(receipt) = self.rpc.transaction_receipt(tx_hash).await? {
                if receipt.succeeded() {
                    return Ok(receipt);
                }
                warn!(%tx_hash, "transaction reverted");
                return Err(ChainError::Reverted(format!("{tx_hash}")));
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
        Err(ChainError::Timeout(format!("receipt for {tx_hash}")))
    }
}

/// pull the bet id out of the vault's `Committed` event
fn decode_committed_bet_id(receipt: &TxReceipt) -> Option<u64> {
    receipt.logs.iter().find_map(|log| {
        if log.topics.first() != Some(&ICollateralVault::Committed::SIGNATURE_HASH) {
            return None;
        }
        // first indexed param, abi-encoded as a 32-byte big-endian word
        let topic = log.topics.get(1)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&topic.as_slice()[24..]);
        Some(u64::from_be_bytes(raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::LogEntry;
    use alloy_primitives::Bytes;

    fn committed_log(bet_id: u64) -> LogEntry {
        let mut topic = [0u8; 32];
        topic[24..].copy_from_slice(&bet_id.to_be_bytes());
        LogEntry {
            address: Address::ZERO,
            topics: vec![
                ICollateralVault::Committed::SIGNATURE_HASH,
                B256::from(topic),
                B256::ZERO,
                B256::ZERO,
            ],
            data: Bytes::new(),
        }
    }

    #[test]
    fn decodes_bet_id_from_committed_event() {
        let receipt = TxReceipt {
            transaction_hash: B256::ZERO,
            status: U256::from(1u64),
            logs: vec![committed_log(4242)],
        };
        assert_eq!(decode_committed_bet_id(&receipt), Some(4242));
    }

    #[test]
    fn ignores_unrelated_events() {
        let mut log = committed_log(1);
        log.topics[0] = B256::ZERO;
        let receipt = TxReceipt {
            transaction_hash: B256::ZERO,
            status: U256::from(1u64),
            logs: vec![log],
        };
        assert_eq!(decode_committed_bet_id(&receipt), None);
    }

    #[test]
    fn commit_calldata_has_selector() {
        let call = ICollateralVault::commitBilateralBetCall {
            commitment: BetCommitment::default(),
            sigCreator: vec![0u8; 65].into(),
            sigFiller: vec![0u8; 65].into(),
        };
        let encoded = call.abi_encode();
        assert_eq!(&encoded[..4], ICollateralVault::commitBilateralBetCall::SELECTOR);
        assert!(encoded.len() > 4 + 8 * 32);
    }
}
