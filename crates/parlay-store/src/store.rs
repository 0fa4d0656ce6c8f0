//! file-per-bet trade store

use crate::error::{Result, StoreError};
use alloy_primitives::{Address, U256};
use parlay_codec::json::u256_dec_vec;
use parlay_codec::{gzip_compress, gzip_decompress};
use parlay_core::TradeSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// trade count at or above which sets are stored gzipped
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1_000;

/// per-bet settlement artifact written next to the trade file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionRecord {
    pub bet_id: u64,
    pub winner: Address,
    pub wins_count: u64,
    pub valid_trades: u64,
    pub is_tie: bool,
    #[serde(with = "u256_dec_vec")]
    pub exit_prices: Vec<U256>,
    pub maker_won: Vec<bool>,
    pub settled_at: u64,
}

/// aggregate numbers for the metrics endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub files: usize,
    pub total_bytes: u64,
}

/// trade-set persistence rooted at one directory
#[derive(Debug, Clone)]
pub struct TradeStore {
    dir: PathBuf,
    compression_threshold: usize,
}

impl TradeStore {
    /// open (and create) the storage directory
    pub fn open(dir: impl Into<PathBuf>, compression_threshold: usize) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, compression_threshold })
    }

    fn plain_path(&self, bet_id: u64) -> PathBuf {
        self.dir.join(format!("bet-{bet_id}.json"))
    }

    fn gz_path(&self, bet_id: u64) -> PathBuf {
        self.dir.join(format!("bet-{bet_id}.json.gz"))
    }

    fn resolution_path(&self, bet_id: u64) -> PathBuf {
        self.dir.join(format!("bet-{bet_id}-resolution.json"))
    }

    /// write a set; gzipped when the trade count clears the threshold
    pub fn store_blocking(&self, bet_id: u64, set: &TradeSet) -> Result<()> {
        let json = serde_json::to_vec(set)?;
        if set.len() >= self.compression_threshold {
            let packed = gzip_compress(&json)?;
            write_atomic(&self.gz_path(bet_id), &packed)?;
            // a stale plain file from a previous threshold config would
            // shadow nothing (gz probes first) but wastes disk
            let _ = fs::remove_file(self.plain_path(bet_id));
            debug!(bet_id, bytes = packed.len(), "stored compressed trade set");
        } else {
            write_atomic(&self.plain_path(bet_id), &json)?;
            let _ = fs::remove_file(self.gz_path(bet_id));
            debug!(bet_id, bytes = json.len(), "stored trade set");
        }
        Ok(())
    }

    /// read a set back, probing the compressed name first
    pub fn load_blocking(&self, bet_id: u64) -> Result<TradeSet> {
        let gz = self.gz_path(bet_id);
        let raw = if gz.exists() {
            gzip_decompress(&fs::read(gz)?)?
        } else {
            let plain = self.plain_path(bet_id);
            if !plain.exists() {
                return Err(StoreError::NotFound(bet_id));
            }
            fs::read(plain)?
        };
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn has(&self, bet_id: u64) -> bool {
        self.gz_path(bet_id).exists() || self.plain_path(bet_id).exists()
    }

    /// remove a bet's trade file and resolution record
    pub fn delete(&self, bet_id: u64) -> Result<()> {
        let mut found = false;
        for path in [self.gz_path(bet_id), self.plain_path(bet_id), self.resolution_path(bet_id)] {
            match fs::remove_file(&path) {
                Ok(()) => found = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if found {
            Ok(())
        } else {
            Err(StoreError::NotFound(bet_id))
        }
    }

    pub fn store_resolution_blocking(&self, record: &ResolutionRecord) -> Result<()> {
        let json = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.resolution_path(record.bet_id), &json)
    }

    pub fn load_resolution_blocking(&self, bet_id: u64) -> Result<ResolutionRecord> {
        let path = self.resolution_path(bet_id);
        if !path.exists() {
            return Err(StoreError::NotFound(bet_id));
        }
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    /// bet ids with a stored trade set
    pub fn list(&self) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = parse_bet_filename(name) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// delete trade files older than `age`; returns how many bets went
    pub fn cleanup_older_than(&self, age: Duration) -> Result<usize> {
        let cutoff = SystemTime::now() - age;
        let mut removed = 0;
        for id in self.list()? {
            let path = if self.gz_path(id).exists() { self.gz_path(id) } else { self.plain_path(id) };
            let Ok(meta) = fs::metadata(&path) else { continue };
            let Ok(modified) = meta.modified() else { continue };
            if modified < cutoff {
                match self.delete(id) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(bet_id = id, "cleanup failed: {e}"),
                }
            }
        }
        Ok(removed)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                stats.files += 1;
                stats.total_bytes += entry.metadata()?.len();
            }
        }
        Ok(stats)
    }

    // non-blocking variants for the hot paths; serialization happens on
    // the blocking pool along with the io

    pub async fn store(&self, bet_id: u64, set: TradeSet) -> Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.store_blocking(bet_id, &set))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }

    pub async fn load(&self, bet_id: u64) -> Result<TradeSet> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load_blocking(bet_id))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }

    pub async fn store_resolution(&self, record: ResolutionRecord) -> Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.store_resolution_blocking(&record))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }

    pub async fn load_resolution(&self, bet_id: u64) -> Result<ResolutionRecord> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load_resolution_blocking(bet_id))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}

/// temp-file write followed by a rename; readers see old or new, never
/// a torn file
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn parse_bet_filename(name: &str) -> Option<u64> {
    let rest = name.strip_prefix("bet-")?;
    let id = rest
        .strip_suffix(".json.gz")
        .or_else(|| rest.strip_suffix(".json"))?;
    if id.ends_with("-resolution") {
        return None;
    }
    id.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use parlay_core::{Method, Quote, TradeSet};

    fn quotes(n: usize) -> Vec<Quote> {
        (0..n)
            .map(|i| Quote {
                ticker: format!("TKR{i}"),
                source: "test".into(),
                price: U256::from(100 + i as u64),
            })
            .collect()
    }

    fn set(n: usize) -> TradeSet {
        TradeSet::build("snap-1", &quotes(n), &Method::Up(0), usize::MAX).unwrap()
    }

    #[test]
    fn uncompressed_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TradeStore::open(dir.path(), 1_000).unwrap();
        let original = set(5);
        store.store_blocking(1, &original).unwrap();
        assert!(dir.path().join("bet-1.json").exists());
        assert_eq!(store.load_blocking(1).unwrap(), original);
    }

    #[test]
    fn compressed_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TradeStore::open(dir.path(), 10).unwrap();
        let original = set(25);
        store.store_blocking(2, &original).unwrap();
        assert!(dir.path().join("bet-2.json.gz").exists());
        assert!(!dir.path().join("bet-2.json").exists());
        assert_eq!(store.load_blocking(2).unwrap(), original);
    }

    #[test]
    fn load_unknown_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = TradeStore::open(dir.path(), 10).unwrap();
        assert!(matches!(store.load_blocking(99), Err(StoreError::NotFound(99))));
    }

    #[test]
    fn rewrite_switches_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let store = TradeStore::open(dir.path(), 10).unwrap();
        store.store_blocking(3, &set(25)).unwrap();
        assert!(dir.path().join("bet-3.json.gz").exists());
        store.store_blocking(3, &set(5)).unwrap();
        assert!(dir.path().join("bet-3.json").exists());
        assert!(!dir.path().join("bet-3.json.gz").exists());
        assert_eq!(store.load_blocking(3).unwrap().len(), 5);
    }

    #[test]
    fn delete_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = TradeStore::open(dir.path(), 1_000).unwrap();
        store.store_blocking(4, &set(3)).unwrap();
        store
            .store_resolution_blocking(&ResolutionRecord {
                bet_id: 4,
                winner: Address::ZERO,
                wins_count: 0,
                valid_trades: 3,
                is_tie: false,
                exit_prices: vec![U256::from(1u64); 3],
                maker_won: vec![false; 3],
                settled_at: 1_700_000_000,
            })
            .unwrap();
        store.delete(4).unwrap();
        assert!(!store.has(4));
        assert!(store.load_resolution_blocking(4).is_err());
        assert!(matches!(store.delete(4), Err(StoreError::NotFound(4))));
    }

    #[test]
    fn list_skips_resolution_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = TradeStore::open(dir.path(), 10).unwrap();
        store.store_blocking(7, &set(3)).unwrap();
        store.store_blocking(8, &set(25)).unwrap();
        store
            .store_resolution_blocking(&ResolutionRecord {
                bet_id: 7,
                winner: Address::ZERO,
                wins_count: 1,
                valid_trades: 3,
                is_tie: false,
                exit_prices: vec![],
                maker_won: vec![],
                settled_at: 0,
            })
            .unwrap();
        assert_eq!(store.list().unwrap(), vec![7, 8]);
    }

    #[test]
    fn resolution_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TradeStore::open(dir.path(), 10).unwrap();
        let record = ResolutionRecord {
            bet_id: 11,
            winner: Address::from([0xaa; 20]),
            wins_count: 3,
            valid_trades: 4,
            is_tie: false,
            exit_prices: vec![U256::from(10).pow(U256::from(20)); 4],
            maker_won: vec![true, true, true, false],
            settled_at: 1_700_000_000,
        };
        store.store_resolution_blocking(&record).unwrap();
        assert_eq!(store.load_resolution_blocking(11).unwrap(), record);
    }

    #[test]
    fn stats_counts_files_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = TradeStore::open(dir.path(), 1_000).unwrap();
        store.store_blocking(1, &set(2)).unwrap();
        store.store_blocking(2, &set(2)).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.files, 2);
        assert!(stats.total_bytes > 0);
    }

    #[tokio::test]
    async fn async_variants_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TradeStore::open(dir.path(), 1_000).unwrap();
        let original = set(4);
        store.store(21, original.clone()).await.unwrap();
        assert_eq!(store.load(21).await.unwrap(), original);

        let record = ResolutionRecord {
            bet_id: 21,
            winner: Address::from([0xbb; 20]),
            wins_count: 2,
            valid_trades: 4,
            is_tie: true,
            exit_prices: vec![U256::from(7u64); 4],
            maker_won: vec![true, true, false, false],
            settled_at: 1_700_000_000,
        };
        store.store_resolution(record.clone()).await.unwrap();
        assert_eq!(store.load_resolution(21).await.unwrap(), record);
        assert!(matches!(
            store.load_resolution(22).await,
            Err(StoreError::NotFound(22))
        ));
    }
}
