//! peer discovery
//!
//! the registry contract is the source of truth for who exists; health
//! probes decide who is usable. probe failures are logged and the peer
//! just goes stale, discovery itself never fails a tick.

use crate::client::PeerClient;
use crate::error::Result;
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

/// default freshness window for `healthy_peers`
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(180);

/// one registered agent as the registry reports it
#[derive(Debug, Clone)]
pub struct BotRecord {
    pub address: Address,
    pub endpoint: String,
}

/// the on-chain bot directory, seen through a narrow seam so discovery
/// is testable without a chain
#[async_trait]
pub trait BotDirectory: Send + Sync {
    async fn enumerate(&self) -> Result<Vec<BotRecord>>;
}

/// a known peer and its probe state
#[derive(Debug, Clone)]
pub struct Peer {
    pub address: Address,
    pub endpoint: String,
    pub pubkey_hash: B256,
    pub last_healthy_at: Option<Instant>,
}

pub struct PeerDiscovery {
    directory: Box<dyn BotDirectory>,
    client: PeerClient,
    self_address: Address,
    peers: Mutex<HashMap<Address, Peer>>,
    freshness: Duration,
}

impl PeerDiscovery {
    pub fn new(directory: Box<dyn BotDirectory>, self_address: Address) -> Self {
        Self {
            directory,
            client: PeerClient::new(),
            self_address,
            peers: Mutex::new(HashMap::new()),
            freshness: DEFAULT_FRESHNESS,
        }
    }

    /// one discovery pass: enumerate the registry, probe everyone
    pub async fn refresh(&self) -> Result<()> {
        let records = self.directory.enumerate().await?;
        debug!(count = records.len(), "registry enumerated");

        for record in records {
            if record.address == self.self_address || record.endpoint.is_empty() {
                continue;
            }
            self.probe(record).await;
        }
        Ok(())
    }

    async fn probe(&self, record: BotRecord) {
        let healthy = match self.client.health(&record.endpoint).await {
            Ok(health) => health.status == "healthy",
            Err(e) => {
                warn!(peer = %record.address, "health probe failed: {e}");
                false
            }
        };

        // info gives us the pubkey hash; tolerate probes that fail after
        // a healthy response by keeping the previous value
        let pubkey_hash = match self.client.info(&record.endpoint).await {
            Ok(info) => Some(info.pubkey_hash),
            Err(e) => {
                warn!(peer = %record.address, "info probe failed: {e}");
                None
            }
        };

        let mut peers = self.peers.lock().unwrap();
        let entry = peers.entry(record.address).or_insert_with(|| Peer {
            address: record.address,
            endpoint: record.endpoint.clone(),
            pubkey_hash: B256::ZERO,
            last_healthy_at: None,
        });
        entry.endpoint = record.endpoint;
        if let Some(hash) = pubkey_hash {
            entry.pubkey_hash = hash;
        }
        if healthy {
            entry.last_healthy_at = Some(Instant::now());
        }
    }

    /// peers whose last successful probe is inside the freshness window
    pub fn healthy_peers(&self) -> Vec<Peer> {
        let now = Instant::now();
        let peers = self.peers.lock().unwrap();
        let mut healthy: Vec<Peer> = peers
            .values()
            .filter(|p| {
                p.last_healthy_at
                    .is_some_and(|at| now.duration_since(at) <= self.freshness)
            })
            .cloned()
            .collect();
        healthy.sort_by_key(|p| p.address);
        healthy
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    /// discovery loop; runs until shutdown flips
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.refresh().await {
                        warn!("discovery refresh failed: {e}");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticDirectory(Vec<BotRecord>);

    #[async_trait]
    impl BotDirectory for StaticDirectory {
        async fn enumerate(&self) -> Result<Vec<BotRecord>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn excludes_self_and_unreachable_peers() {
        let me = Address::from([1; 20]);
        let other = Address::from([2; 20]);
        let discovery = PeerDiscovery::new(
            Box::new(StaticDirectory(vec![
                BotRecord { address: me, endpoint: "http://127.0.0.1:1".into() },
                // unroutable port; the probe fails fast and the peer
                // stays unhealthy
                BotRecord { address: other, endpoint: "http://127.0.0.1:1".into() },
            ])),
            me,
        );
        discovery.refresh().await.unwrap();
        assert_eq!(discovery.peer_count(), 1);
        assert!(discovery.healthy_peers().is_empty());
    }

    #[tokio::test]
    async fn skips_empty_endpoints() {
        let discovery = PeerDiscovery::new(
            Box::new(StaticDirectory(vec![BotRecord {
                address: Address::from([3; 20]),
                endpoint: String::new(),
            }])),
            Address::from([1; 20]),
        );
        discovery.refresh().await.unwrap();
        assert_eq!(discovery.peer_count(), 0);
    }
}
