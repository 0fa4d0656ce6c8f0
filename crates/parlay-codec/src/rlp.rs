//! legacy transaction rlp (eip-155)
//!
//! the settlement chain accepts pre-1559 transactions; the signing hash
//! encodes `(nonce, gasPrice, gas, to, value, data, chainId, 0, 0)` and
//! the signed wire form replaces the trailing triple with
//! `(v = 35 + 2*chainId + parity, r, s)`.

use alloy_primitives::{keccak256, Address, Bytes, Signature, B256, U256};
use alloy_rlp::{BufMut, Encodable, Header, EMPTY_STRING_CODE};

/// unsigned legacy transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyTx {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
}

impl LegacyTx {
    fn base_payload_length(&self) -> usize {
        self.nonce.length()
            + self.gas_price.length()
            + self.gas.length()
            + self.to.map_or(1, |a| a.length())
            + self.value.length()
            + self.data.length()
    }

    fn encode_base(&self, out: &mut Vec<u8>) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas.encode(out);
        match self.to {
            Some(addr) => addr.encode(out),
            None => out.put_u8(EMPTY_STRING_CODE),
        }
        self.value.encode(out);
        self.data.encode(out);
    }

    /// rlp of the eip-155 signing payload
    pub fn encode_for_signing(&self, chain_id: u64) -> Vec<u8> {
        let payload_length =
            self.base_payload_length() + chain_id.length() + 0u8.length() + 0u8.length();
        let mut out = Vec::with_capacity(payload_length + 4);
        Header { list: true, payload_length }.encode(&mut out);
        self.encode_base(&mut out);
        chain_id.encode(&mut out);
        0u8.encode(&mut out);
        0u8.encode(&mut out);
        out
    }

    /// keccak of the signing payload; this is the digest handed to the signer
    pub fn signing_hash(&self, chain_id: u64) -> B256 {
        keccak256(self.encode_for_signing(chain_id))
    }

    /// rlp of the broadcast-ready signed transaction
    pub fn encode_signed(&self, sig: &Signature, chain_id: u64) -> Vec<u8> {
        let v: u64 = 35 + 2 * chain_id + u64::from(sig.v());
        let r = sig.r();
        let s = sig.s();
        let payload_length = self.base_payload_length() + v.length() + r.length() + s.length();
        let mut out = Vec::with_capacity(payload_length + 4);
        Header { list: true, payload_length }.encode(&mut out);
        self.encode_base(&mut out);
        v.encode(&mut out);
        r.encode(&mut out);
        s.encode(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // the eip-155 reference transaction
    fn eip155_example() -> LegacyTx {
        LegacyTx {
            nonce: 9,
            gas_price: U256::from(20_000_000_000u64),
            gas: 21_000,
            to: Some("0x3535353535353535353535353535353535353535".parse().unwrap()),
            value: U256::from(10).pow(U256::from(18)),
            data: Bytes::new(),
        }
    }

    #[test]
    fn eip155_signing_payload() {
        let tx = eip155_example();
        assert_eq!(
            hex::encode(tx.encode_for_signing(1)),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
    }

    #[test]
    fn eip155_signing_hash() {
        let tx = eip155_example();
        assert_eq!(
            hex::encode(tx.signing_hash(1)),
            "daf5a779ae972f972197303d7b574746c7ef83eabadc8ba73f0a02f8ae0daa18"
        );
    }

    #[test]
    fn contract_creation_encodes_empty_to() {
        let tx = LegacyTx { to: None, ..eip155_example() };
        let encoded = tx.encode_for_signing(1);
        // the `to` slot is a bare 0x80 between gas and value
        assert!(encoded.windows(2).any(|w| w == [0x52, 0x08]));
        assert_ne!(encoded, eip155_example().encode_for_signing(1));
    }

    #[test]
    fn v_encodes_chain_id_and_parity() {
        let tx = eip155_example();
        let sig = Signature::from_scalars_and_parity(
            B256::from(U256::from(1)),
            B256::from(U256::from(2)),
            true,
        );
        let signed = tx.encode_signed(&sig, 1);
        // v = 35 + 2*1 + 1 = 38 = 0x26
        assert!(signed.contains(&0x26));
        let signed0 = tx.encode_signed(
            &Signature::from_scalars_and_parity(
                B256::from(U256::from(1)),
                B256::from(U256::from(2)),
                false,
            ),
            1,
        );
        assert!(signed0.contains(&0x25));
    }
}
