//! raw transaction assembly
//!
//! the vault chain accepts legacy (pre-1559) transactions; calldata in,
//! signed rlp out. nothing here touches the network.

use crate::error::Result;
use alloy_primitives::{Address, Bytes, U256};
use parlay_codec::LegacyTx;
use parlay_crypto::AgentSigner;

/// default gas limit for vault writes; commits dominate and are bounded
/// by the fixed-size commitment struct, not the trade count
pub const DEFAULT_GAS_LIMIT: u64 = 1_500_000;

/// sign a contract call into broadcast-ready rlp
pub fn build_signed_call(
    signer: &AgentSigner,
    chain_id: u64,
    nonce: u64,
    gas_price: U256,
    to: Address,
    calldata: Vec<u8>,
) -> Result<Vec<u8>> {
    let tx = LegacyTx {
        nonce,
        gas_price,
        gas: DEFAULT_GAS_LIMIT,
        to: Some(to),
        value: U256::ZERO,
        data: Bytes::from(calldata),
    };
    let sig = signer.sign_hash(&tx.signing_hash(chain_id))?;
    Ok(tx.encode_signed(&sig, chain_id))
}
