//! agent orchestrator
//!
//! boots every component from configuration, wires the handler
//! callbacks into the p2p server, and runs the tickers until a signal
//! arrives. shutdown stops tickers in reverse start order, then the
//! listener; in-flight requests may complete, no new work starts.

use crate::config::{AgentConfig, KeySource, Role};
use crate::maker::MakerLoop;
use crate::memory::{MemoryManager, MemoryMonitor};
use crate::oracle::OracleClient;
use crate::settlement::SettlementScanner;
use crate::state::AgentState;
use crate::taker::TakerHandlers;
use anyhow::{Context, Result};
use async_trait::async_trait;
use parlay_chain::{ChainClient, RpcClient};
use parlay_crypto::AgentSigner;
use parlay_p2p::{BotDirectory, BotRecord, P2pError, P2pServer, PeerDiscovery, ServerConfig};
use parlay_store::TradeStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// bot directory view over the registry contract
struct ChainDirectory {
    chain: Arc<ChainClient>,
}

#[async_trait]
impl BotDirectory for ChainDirectory {
    async fn enumerate(&self) -> parlay_p2p::Result<Vec<BotRecord>> {
        let addresses = self
            .chain
            .registered_bots()
            .await
            .map_err(|e| P2pError::Directory(e.to_string()))?;
        let mut records = Vec::with_capacity(addresses.len());
        for address in addresses {
            match self.chain.bot_endpoint(address).await {
                Ok(endpoint) => records.push(BotRecord { address, endpoint }),
                Err(e) => warn!(bot = %address, "endpoint lookup failed: {e}"),
            }
        }
        Ok(records)
    }
}

pub struct Agent {
    config: Arc<AgentConfig>,
    server: P2pServer,
    discovery: Arc<PeerDiscovery>,
    maker: Option<Arc<MakerLoop>>,
    scanner: Arc<SettlementScanner>,
    manager: Arc<MemoryManager>,
    shutdown_tx: watch::Sender<bool>,
}

impl Agent {
    /// construct every component; fails fast on config or key problems
    pub async fn boot(config: AgentConfig) -> Result<Self> {
        let config = Arc::new(config);

        let signer = Arc::new(match &config.key {
            KeySource::PrivateKey(hex) => {
                AgentSigner::from_hex(hex).context("loading private key")?
            }
            KeySource::Keystore { path, password } => {
                AgentSigner::from_keystore(path, password).context("unlocking keystore")?
            }
        });
        info!(address = %signer.address(), role = ?config.role, "agent identity loaded");

        let rpc = RpcClient::new(&config.rpc_url).context("rpc client")?;
        let chain = Arc::new(ChainClient::new(
            rpc,
            signer.clone(),
            config.vault_address,
            config.registry_address,
            config.chain_id,
        ));

        match chain.is_registered(signer.address()).await {
            Ok(true) => info!("agent is registered on-chain"),
            Ok(false) => warn!(
                "agent is NOT registered on-chain; peers will not discover it \
                 (run the registration flow first)"
            ),
            Err(e) => warn!("registration check failed: {e}"),
        }

        let oracle = OracleClient::new(&config.oracle_url, &config.data_source)?;
        let store = TradeStore::open(&config.trade_storage_dir, config.compression_threshold)
            .context("opening trade store")?;
        let state = Arc::new(AgentState::new());
        let monitor = Arc::new(MemoryMonitor::new(config.max_memory_gb));

        let handlers = Arc::new(TakerHandlers::new(
            config.clone(),
            signer.clone(),
            state.clone(),
            chain.clone(),
            oracle.clone(),
            store.clone(),
            monitor.clone(),
        ));

        let server = P2pServer::new(
            ServerConfig {
                port: config.p2p_port,
                bind: config.p2p_bind.clone(),
                endpoint: config.p2p_endpoint.clone(),
                address: signer.address(),
                pubkey_hash: signer.pubkey_hash(),
                rate_limit_per_second: config.rate_limit_per_second,
                vault: config.vault_address,
                chain_id: config.chain_id,
            },
            handlers,
        );

        let discovery = Arc::new(PeerDiscovery::new(
            Box::new(ChainDirectory { chain: chain.clone() }),
            signer.address(),
        ));

        let maker = match config.role {
            Role::Maker => Some(Arc::new(MakerLoop::new(
                config.clone(),
                signer.clone(),
                state.clone(),
                chain.clone(),
                oracle.clone(),
                discovery.clone(),
                store.clone(),
                monitor.clone(),
            ))),
            Role::Taker => None,
        };

        let scanner = Arc::new(SettlementScanner::new(
            config.clone(),
            signer.clone(),
            state.clone(),
            chain.clone(),
            oracle,
            store.clone(),
        ));

        let manager = Arc::new(MemoryManager::new(state, monitor, store, &config));

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self { config, server, discovery, maker, scanner, manager, shutdown_tx })
    }

    /// run until sigint/sigterm
    pub async fn run(self) -> Result<()> {
        let shutdown = self.shutdown_tx.subscribe();

        let server_task = {
            let rx = shutdown.clone();
            let server = self.server;
            tokio::spawn(async move {
                if let Err(e) = server.serve(rx).await {
                    warn!("p2p server exited with error: {e}");
                }
            })
        };

        // start order: discovery, maker, settlement, memory manager;
        // shutdown walks the same list in reverse
        let mut tasks: Vec<(&str, JoinHandle<()>)> = Vec::new();

        let discovery = self.discovery.clone();
        let discovery_interval = self.config.discovery_interval;
        let rx = shutdown.clone();
        tasks.push((
            "discovery",
            tokio::spawn(async move { discovery.run(discovery_interval, rx).await }),
        ));

        if let Some(maker) = self.maker {
            let rx = shutdown.clone();
            tasks.push(("maker", tokio::spawn(async move { maker.run(rx).await })));
        }

        let scanner = self.scanner;
        let rx = shutdown.clone();
        tasks.push(("settlement", tokio::spawn(async move { scanner.run(rx).await })));

        let manager = self.manager;
        let rx = shutdown.clone();
        tasks.push(("memory", tokio::spawn(async move { manager.run(rx).await })));

        info!(
            role = ?self.config.role,
            port = self.config.p2p_port,
            "agent running"
        );
        wait_for_signal().await;
        info!("shutdown signal received");

        self.shutdown_tx.send(true).ok();
        for (name, task) in tasks.into_iter().rev() {
            if task.await.is_err() {
                warn!("{name} task panicked during shutdown");
            }
        }
        // listener last so in-flight requests can finish
        server_task.await.ok();
        info!("shutdown complete");
        Ok(())
    }
}

async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(e) => {
            warn!("sigterm handler unavailable: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}
