//! settlement vault abi
//!
//! the sol! structs are the byte-level source of truth for typed-data
//! hashing and calldata. field order is normative; reordering a field
//! changes every signature in the system.

use alloy_sol_types::sol;

sol! {
    /// the bilateral contract both parties co-sign
    #[derive(Debug, Default, PartialEq, Eq)]
    struct BetCommitment {
        bytes32 tradesRoot;
        address creator;
        address filler;
        uint256 creatorAmount;
        uint256 fillerAmount;
        uint256 deadline;
        uint256 nonce;
        uint256 expiry;
    }

    /// co-signed settlement outcome
    #[derive(Debug, Default, PartialEq, Eq)]
    struct SettlementAgreement {
        uint256 betId;
        address winner;
        uint256 winsCount;
        uint256 validTrades;
        bool isTie;
        uint256 expiry;
        uint256 settlementNonce;
    }

    interface ICollateralVault {
        function commitBilateralBet(BetCommitment commitment, bytes sigCreator, bytes sigFiller) external returns (uint64 betId);
        function settleByAgreement(SettlementAgreement agreement, bytes sigA, bytes sigB) external;
        function requestArbitration(uint64 betId) external;
        function getBet(uint64 betId) external view returns (uint8 status, address creator, address filler, bytes32 tradesRoot, uint256 deadline);
        function nonces(address account) external view returns (uint256);
        function balances(address account) external view returns (uint256 available, uint256 locked);
        function getActiveKeeperCount() external view returns (uint256);

        event Committed(uint64 indexed betId, address indexed creator, address indexed filler, bytes32 tradesRoot);
        event Settled(uint64 indexed betId, address indexed winner);
    }

    interface IBotRegistry {
        function isRegistered(address bot) external view returns (bool);
        function getRegisteredBots() external view returns (address[] memory);
        function getBotEndpoint(address bot) external view returns (string memory);
    }
}

/// on-chain bet status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetStatus {
    Pending,
    Committed,
    InArbitration,
    Settled,
}

impl BetStatus {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Pending),
            1 => Some(Self::Committed),
            2 => Some(Self::InArbitration),
            3 => Some(Self::Settled),
            _ => None,
        }
    }
}
