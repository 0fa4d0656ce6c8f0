//! parlay-agent: the betting agent runtime
//!
//! boots the whole stack from environment configuration and runs the
//! ticking loops: maker (propose and commit bets), settlement scanner
//! (resolve, agree or arbitrate), discovery, and the memory manager.
//! every tick catches its own errors; a failed tick is a log line and a
//! metrics bump, never a crash.

pub mod agent;
pub mod config;
pub mod maker;
pub mod memory;
pub mod oracle;
pub mod settlement;
pub mod state;
pub mod taker;

pub use agent::Agent;
pub use config::{AgentConfig, ConfigError, KeySource, Role};
pub use state::{ActiveBet, AgentState, BetState, PendingProposal};
