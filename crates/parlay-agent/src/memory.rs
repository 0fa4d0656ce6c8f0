//! memory and lifecycle management
//!
//! one place enforces the caps: settled bets leave the map, stale
//! proposals age out, the active-bet cap evicts earliest-deadline
//! first, and rss gets sampled for the admission gates in the maker and
//! taker paths.

use crate::config::AgentConfig;
use crate::state::AgentState;
use parlay_store::TradeStore;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// fraction of `max_memory_gb` that trips the admission gates
const SOFT_LIMIT_RATIO: f64 = 0.85;

pub const MANAGER_INTERVAL: Duration = Duration::from_secs(10);

/// rss sampler shared by the manager and the admission gates
pub struct MemoryMonitor {
    sys: Mutex<System>,
    pid: Pid,
    soft_limit_bytes: u64,
}

impl MemoryMonitor {
    pub fn new(max_memory_gb: f64) -> Self {
        let soft_limit_bytes = (max_memory_gb * SOFT_LIMIT_RATIO * 1e9) as u64;
        let pid = sysinfo::get_current_pid().expect("current pid is always resolvable");
        Self { sys: Mutex::new(System::new()), pid, soft_limit_bytes }
    }

    /// current resident set size in bytes
    pub fn rss_bytes(&self) -> u64 {
        let mut sys = self.sys.lock().unwrap();
        sys.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        sys.process(self.pid).map(|p| p.memory()).unwrap_or(0)
    }

    pub fn soft_limit_bytes(&self) -> u64 {
        self.soft_limit_bytes
    }

    /// admission gate: true when new bets should stop being created or
    /// accepted
    pub fn over_soft_limit(&self) -> bool {
        self.rss_bytes() > self.soft_limit_bytes
    }
}

/// the periodic cleanup tick
pub struct MemoryManager {
    state: Arc<AgentState>,
    monitor: Arc<MemoryMonitor>,
    store: TradeStore,
    max_active_bets: usize,
    pending_proposal_ttl: Duration,
}

impl MemoryManager {
    pub fn new(
        state: Arc<AgentState>,
        monitor: Arc<MemoryMonitor>,
        store: TradeStore,
        config: &AgentConfig,
    ) -> Self {
        Self {
            state,
            monitor,
            store,
            max_active_bets: config.max_active_bets,
            pending_proposal_ttl: config.pending_proposal_ttl,
        }
    }

    pub fn tick(&self) {
        let settled = self.state.remove_settled();
        if !settled.is_empty() {
            debug!(count = settled.len(), "dropped settled bets");
        }

        let stale = self.state.evict_stale_pending(self.pending_proposal_ttl);
        if stale > 0 {
            debug!(count = stale, "evicted stale pending proposals");
        }

        let evicted = self.state.evict_over_cap(self.max_active_bets);
        if !evicted.is_empty() {
            warn!(?evicted, "active-bet cap exceeded, evicted earliest deadlines");
        }

        match self.store.stats() {
            Ok(stats) => {
                metrics::gauge!("parlay_store_files").set(stats.files as f64);
                metrics::gauge!("parlay_store_bytes").set(stats.total_bytes as f64);
            }
            Err(e) => warn!("store stats failed: {e}"),
        }

        let rss = self.monitor.rss_bytes();
        metrics::gauge!("parlay_rss_bytes").set(rss as f64);
        let peak = self.state.counters.peak_rss_bytes.fetch_max(rss, Ordering::Relaxed);
        if rss > peak {
            metrics::gauge!("parlay_peak_rss_bytes").set(rss as f64);
        }
        if rss > self.monitor.soft_limit_bytes() {
            warn!(
                rss_mb = rss / 1_000_000,
                limit_mb = self.monitor.soft_limit_bytes() / 1_000_000,
                "over memory soft limit, shedding new work"
            );
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(MANAGER_INTERVAL);
        info!("memory manager started");
        loop {
            tokio::select! {
                _ = tick.tick() => self.tick(),
                _ = shutdown.changed() => break,
            }
        }
    }
}
