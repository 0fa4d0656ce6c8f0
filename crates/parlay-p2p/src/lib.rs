//! parlay-p2p: direct peer networking
//!
//! one inbound http listener per agent plus an outbound client for the
//! same surface. the server is transport only: it enforces rate limits,
//! freshness and signatures, then hands typed requests to the
//! [`handlers::BetHandlers`] callbacks where bet policy lives.

pub mod client;
pub mod discovery;
pub mod error;
pub mod handlers;
pub mod messages;
pub mod ratelimit;
pub mod server;

pub use client::PeerClient;
pub use discovery::{BotDirectory, BotRecord, Peer, PeerDiscovery};
pub use error::{P2pError, Result};
pub use handlers::BetHandlers;
pub use ratelimit::RateLimiter;
pub use server::{P2pServer, ServerConfig};
