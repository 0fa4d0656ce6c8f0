//! trade-set commitments
//!
//! two alternates over the same ordered trade list:
//!
//! - merkle: keccak leaves over the full trade record, balanced binary
//!   tree padded to a power of two, per-trade inclusion proofs. capped
//!   at 2^20 trades.
//! - fast hash: one streaming sha-256 over compact entry records. no
//!   proofs; disputes reveal the whole list.
//!
//! the maker picks the mode by trade count and the taker recomputes with
//! the same mode. both sides must land on the same 32 bytes.

use crate::error::{CoreError, Result};
use crate::trade::Trade;
use crate::MAX_MERKLE_TRADES;
use alloy_primitives::{keccak256, B256};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// which commitment a trade set carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentMode {
    Merkle,
    #[serde(rename = "fasthash")]
    FastHash,
}

impl CommitmentMode {
    pub fn for_len(len: usize, fast_hash_threshold: usize) -> Self {
        if len >= fast_hash_threshold {
            CommitmentMode::FastHash
        } else {
            CommitmentMode::Merkle
        }
    }
}

/// padding leaf for non-power-of-two trade counts; also the root of an
/// empty set
pub fn empty_leaf() -> B256 {
    keccak256([])
}

/// leaf preimage: every field of the trade record, fixed widths
pub fn leaf_hash(trade: &Trade) -> B256 {
    let method = trade.method.to_string();
    let mut preimage = Vec::with_capacity(
        32 + trade.ticker.len() + trade.source.len() + method.len() + 32 + 32 + 2,
    );
    preimage.extend_from_slice(trade.trade_id.as_slice());
    preimage.extend_from_slice(trade.ticker.as_bytes());
    preimage.extend_from_slice(trade.source.as_bytes());
    preimage.extend_from_slice(method.as_bytes());
    preimage.extend_from_slice(&trade.entry_price.to_be_bytes::<32>());
    preimage.extend_from_slice(&trade.exit_price.to_be_bytes::<32>());
    preimage.push(trade.won as u8);
    preimage.push(trade.cancelled as u8);
    keccak256(preimage)
}

fn hash_siblings(left: &B256, right: &B256) -> B256 {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(left.as_slice());
    preimage[32..].copy_from_slice(right.as_slice());
    keccak256(preimage)
}

/// balanced binary merkle tree over trade leaves
#[derive(Debug, Clone)]
pub struct MerkleTree {
    layers: Vec<Vec<B256>>,
}

/// inclusion proof: sibling path bottom-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub index: usize,
    pub siblings: Vec<B256>,
}

impl MerkleTree {
    /// build over a trade list; empty input yields the empty-leaf root
    pub fn build(trades: &[Trade]) -> Result<Self> {
        if trades.len() > MAX_MERKLE_TRADES {
            return Err(CoreError::TooManyTrades(trades.len()));
        }
        let mut leaves: Vec<B256> = trades.iter().map(leaf_hash).collect();
        if leaves.is_empty() {
            leaves.push(empty_leaf());
        }
        let padded = leaves.len().next_power_of_two();
        leaves.resize(padded, empty_leaf());

        let mut layers = vec![leaves];
        while layers.last().unwrap().len() > 1 {
            let prev = layers.last().unwrap();
            let next: Vec<B256> = prev
                .chunks_exact(2)
                .map(|pair| hash_siblings(&pair[0], &pair[1]))
                .collect();
            layers.push(next);
        }
        Ok(Self { layers })
    }

    pub fn root(&self) -> B256 {
        self.layers.last().unwrap()[0]
    }

    pub fn leaves(&self) -> &[B256] {
        &self.layers[0]
    }

    pub fn depth(&self) -> usize {
        self.layers.len() - 1
    }

    /// sibling path for the leaf at `index`
    pub fn proof(&self, index: usize) -> Result<MerkleProof> {
        let leaf_count = self.layers[0].len();
        if index >= leaf_count {
            return Err(CoreError::IndexOutOfRange { index, len: leaf_count });
        }
        let mut siblings = Vec::with_capacity(self.depth());
        let mut pos = index;
        for layer in &self.layers[..self.layers.len() - 1] {
            siblings.push(layer[pos ^ 1]);
            pos >>= 1;
        }
        Ok(MerkleProof { index, siblings })
    }
}

/// recompute the root from a leaf and its sibling path
pub fn verify_proof(leaf: &B256, proof: &MerkleProof, root: &B256) -> bool {
    let mut acc = *leaf;
    let mut pos = proof.index;
    for sibling in &proof.siblings {
        acc = if pos & 1 == 0 {
            hash_siblings(&acc, sibling)
        } else {
            hash_siblings(sibling, &acc)
        };
        pos >>= 1;
    }
    constant_time_eq(acc.as_slice(), root.as_slice())
}

/// streaming commitment for large sets: sha-256 over the snapshot id
/// followed by `ticker ‖ method ‖ entry:32be` per trade
pub fn fast_hash(snapshot_id: &str, trades: &[Trade]) -> B256 {
    let mut hasher = Sha256::new();
    hasher.update(snapshot_id.as_bytes());
    for trade in trades {
        hasher.update(trade.ticker.as_bytes());
        hasher.update(trade.method.to_string().as_bytes());
        hasher.update(trade.entry_price.to_be_bytes::<32>());
    }
    B256::from(<[u8; 32]>::from(hasher.finalize()))
}

/// the commitment both parties sign over
pub fn commitment_root(snapshot_id: &str, trades: &[Trade], mode: CommitmentMode) -> Result<B256> {
    match mode {
        CommitmentMode::Merkle => Ok(MerkleTree::build(trades)?.root()),
        CommitmentMode::FastHash => Ok(fast_hash(snapshot_id, trades)),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::{trade_id, Method, Quote, TradeSet};
    use alloy_primitives::U256;
    use proptest::prelude::*;

    fn mock_trades(n: usize) -> Vec<Trade> {
        (0..n)
            .map(|i| Trade {
                trade_id: trade_id("snap", i as u64),
                ticker: format!("TKR{i}"),
                source: "oracle".into(),
                method: Method::Up(0),
                entry_price: U256::from((i as u64 + 1) * 100),
                exit_price: U256::ZERO,
                won: false,
                cancelled: false,
            })
            .collect()
    }

    #[test]
    fn empty_set_hashes_to_empty_leaf() {
        let tree = MerkleTree::build(&[]).unwrap();
        assert_eq!(tree.root(), empty_leaf());
    }

    #[test]
    fn single_leaf_root_is_the_leaf() {
        let trades = mock_trades(1);
        let tree = MerkleTree::build(&trades).unwrap();
        assert_eq!(tree.root(), leaf_hash(&trades[0]));
    }

    #[test]
    fn non_power_of_two_pads_with_empty_leaf() {
        let trades = mock_trades(3);
        let tree = MerkleTree::build(&trades).unwrap();
        assert_eq!(tree.leaves().len(), 4);
        assert_eq!(tree.leaves()[3], empty_leaf());
    }

    #[test]
    fn proofs_verify_for_every_index() {
        for n in [1usize, 2, 3, 7, 8, 33, 100] {
            let trades = mock_trades(n);
            let tree = MerkleTree::build(&trades).unwrap();
            let root = tree.root();
            for i in 0..n {
                let proof = tree.proof(i).unwrap();
                assert!(verify_proof(&leaf_hash(&trades[i]), &proof, &root), "n={n} i={i}");
            }
        }
    }

    #[test]
    fn mutated_leaf_sibling_or_root_fails() {
        let trades = mock_trades(8);
        let tree = MerkleTree::build(&trades).unwrap();
        let root = tree.root();
        let proof = tree.proof(3).unwrap();
        let leaf = leaf_hash(&trades[3]);

        let mut bad_leaf = leaf;
        bad_leaf.0[0] ^= 1;
        assert!(!verify_proof(&bad_leaf, &proof, &root));

        let mut bad_proof = proof.clone();
        bad_proof.siblings[1].0[31] ^= 1;
        assert!(!verify_proof(&leaf, &bad_proof, &root));

        let mut bad_root = root;
        bad_root.0[16] ^= 1;
        assert!(!verify_proof(&leaf, &proof, &bad_root));
    }

    #[test]
    fn proof_index_out_of_range() {
        let tree = MerkleTree::build(&mock_trades(4)).unwrap();
        assert!(tree.proof(4).is_err());
    }

    #[test]
    fn rejects_oversized_tree() {
        let blank = Trade {
            trade_id: B256::ZERO,
            ticker: String::new(),
            source: String::new(),
            method: Method::Up(0),
            entry_price: U256::ZERO,
            exit_price: U256::ZERO,
            won: false,
            cancelled: false,
        };
        let trades = vec![blank; crate::MAX_MERKLE_TRADES + 1];
        assert!(matches!(
            MerkleTree::build(&trades),
            Err(crate::CoreError::TooManyTrades(_))
        ));
    }

    #[test]
    fn mode_threshold_boundary() {
        assert_eq!(CommitmentMode::for_len(999, 1_000), CommitmentMode::Merkle);
        assert_eq!(CommitmentMode::for_len(1_000, 1_000), CommitmentMode::FastHash);
    }

    #[test]
    fn fast_hash_is_deterministic_and_input_sensitive() {
        let trades = mock_trades(5);
        let a = fast_hash("snap", &trades);
        assert_eq!(a, fast_hash("snap", &trades));
        assert_ne!(a, fast_hash("snap2", &trades));

        let mut reordered = trades.clone();
        reordered.swap(0, 1);
        assert_ne!(a, fast_hash("snap", &reordered));
    }

    #[test]
    fn fast_hash_ignores_exit_state() {
        // entry records only: resolution must not move the commitment
        let trades = mock_trades(5);
        let mut resolved = trades.clone();
        for t in &mut resolved {
            t.exit_price = U256::from(1u64);
            t.won = true;
        }
        assert_eq!(fast_hash("snap", &trades), fast_hash("snap", &resolved));
    }

    #[test]
    fn two_independent_builds_agree() {
        // the hash-agreement property: same inputs, same root, both modes
        let quotes: Vec<Quote> = (0..50)
            .map(|i| Quote {
                ticker: format!("A{i}"),
                source: "feed".into(),
                price: U256::from(1_000u64 + i),
            })
            .collect();
        for threshold in [1_000usize, 10] {
            let a = TradeSet::build("snap-7", &quotes, &Method::Up(0), threshold).unwrap();
            let b = TradeSet::build("snap-7", &quotes, &Method::Up(0), threshold).unwrap();
            assert_eq!(a.root(), b.root());
        }
    }

    proptest! {
        #[test]
        fn prop_proofs_roundtrip(n in 1usize..64, seed in 0usize..64) {
            let trades = mock_trades(n);
            let tree = MerkleTree::build(&trades).unwrap();
            let i = seed % n;
            let proof = tree.proof(i).unwrap();
            prop_assert!(verify_proof(&leaf_hash(&trades[i]), &proof, &tree.root()));
        }

        #[test]
        fn prop_single_bit_flip_breaks_proof(n in 2usize..32, seed in 0usize..32, bit in 0usize..256) {
            let trades = mock_trades(n);
            let tree = MerkleTree::build(&trades).unwrap();
            let i = seed % n;
            let proof = tree.proof(i).unwrap();
            let mut leaf = leaf_hash(&trades[i]);
            leaf.0[bit / 8] ^= 1 << (bit % 8);
            prop_assert!(!verify_proof(&leaf, &proof, &tree.root()));
        }
    }
}
