//! environment-keyed configuration
//!
//! required keys are fatal when missing; tunables fall back to the
//! documented defaults. nothing here reads files except through the
//! keystore path handed to the signer loader.

use alloy_primitives::{Address, U256};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

type Result<T> = std::result::Result<T, ConfigError>;

/// which side of a bet this agent plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Maker,
    Taker,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "maker" => Ok(Role::Maker),
            "taker" => Ok(Role::Taker),
            other => Err(format!("unknown role {other:?}, expected maker or taker")),
        }
    }
}

/// where the signing key comes from
#[derive(Debug, Clone)]
pub enum KeySource {
    /// raw hex key, dev and test setups
    PrivateKey(String),
    /// encrypted keystore file plus its passphrase
    Keystore { path: PathBuf, password: String },
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    // required
    pub key: KeySource,
    pub rpc_url: String,
    pub chain_id: u64,
    pub vault_address: Address,
    pub registry_address: Address,
    pub oracle_url: String,
    pub p2p_port: u16,
    pub p2p_endpoint: String,

    // tunables
    pub p2p_bind: String,
    pub rate_limit_per_second: usize,
    pub discovery_interval: Duration,
    pub settlement_check_interval: Duration,
    pub trading_interval: Duration,
    pub deadline_offset_secs: u64,
    pub role: Role,
    pub default_method: String,
    pub stake_amount: U256,
    pub num_assets: usize,
    pub data_source: String,
    pub max_memory_gb: f64,
    pub max_active_bets: usize,
    pub pending_proposal_ttl: Duration,
    pub fast_hash_threshold: usize,
    pub compression_threshold: usize,
    pub trade_storage_dir: PathBuf,
    pub metrics_port: Option<u16>,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let key = match env::var("PRIVATE_KEY") {
            Ok(hex) => KeySource::PrivateKey(hex),
            Err(_) => {
                let path = required("KEYSTORE_PATH")?;
                let password = required("KEYSTORE_PASSWORD")?;
                KeySource::Keystore { path: PathBuf::from(path), password }
            }
        };

        Ok(Self {
            key,
            rpc_url: required("RPC_URL")?,
            chain_id: parse_required("CHAIN_ID")?,
            vault_address: parse_required("VAULT_ADDRESS")?,
            registry_address: parse_required("BOT_REGISTRY_ADDRESS")?,
            oracle_url: required("ORACLE_URL")?,
            p2p_port: parse_or("P2P_PORT", 8080)?,
            p2p_endpoint: required("P2P_ENDPOINT")?,

            p2p_bind: or_default("P2P_BIND", "0.0.0.0"),
            rate_limit_per_second: parse_or("RATE_LIMIT_PER_SECOND", 10)?,
            discovery_interval: millis_or("DISCOVERY_INTERVAL_MS", 60_000)?,
            settlement_check_interval: millis_or("SETTLEMENT_CHECK_INTERVAL_MS", 30_000)?,
            trading_interval: millis_or("TRADING_INTERVAL_MS", 120_000)?,
            deadline_offset_secs: parse_or("DEADLINE_OFFSET_SECS", 30)?,
            role: parse_or("ROLE", Role::Taker)?,
            default_method: or_default("DEFAULT_METHOD", "up:0"),
            stake_amount: token_amount_or("STAKE_AMOUNT", "0.1")?,
            num_assets: parse_or("NUM_ASSETS", 50)?,
            data_source: or_default("DATA_SOURCE", "crypto"),
            max_memory_gb: parse_or("MAX_MEMORY_GB", 4.0)?,
            max_active_bets: parse_or("MAX_ACTIVE_BETS", 5)?,
            pending_proposal_ttl: millis_or("PENDING_PROPOSAL_TTL_MS", 60_000)?,
            fast_hash_threshold: parse_or("FAST_HASH_THRESHOLD", 1_000)?,
            compression_threshold: parse_or("COMPRESSION_THRESHOLD", 1_000)?,
            trade_storage_dir: PathBuf::from(or_default("TRADE_STORAGE_DIR", "./trade-storage")),
            metrics_port: optional_parse("METRICS_PORT")?,
        })
    }
}

fn required(key: &'static str) -> Result<String> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn or_default(key: &'static str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_required<T>(key: &'static str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    required(key)?
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid { key, reason: e.to_string() })
}

fn parse_or<T>(key: &'static str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid { key, reason: e.to_string() }),
        Err(_) => Ok(default),
    }
}

fn optional_parse<T>(key: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid { key, reason: e.to_string() }),
        Err(_) => Ok(None),
    }
}

fn millis_or(key: &'static str, default_ms: u64) -> Result<Duration> {
    Ok(Duration::from_millis(parse_or(key, default_ms)?))
}

fn token_amount_or(key: &'static str, default: &str) -> Result<U256> {
    let raw = or_default(key, default);
    parse_token_amount(&raw).ok_or_else(|| ConfigError::Invalid {
        key,
        reason: format!("{raw:?} is not a token amount"),
    })
}

/// parse a decimal token amount ("0.1") into 1e18 base units
pub fn parse_token_amount(raw: &str) -> Option<U256> {
    const DECIMALS: usize = 18;
    let raw = raw.trim();
    let (whole, frac) = match raw.split_once('.') {
        Some((w, f)) => (w, f),
        None => (raw, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() > DECIMALS {
        return None;
    }
    let whole: U256 = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10).ok()?
    };
    let mut frac_units = U256::ZERO;
    if !frac.is_empty() {
        frac_units = U256::from_str_radix(frac, 10).ok()?;
        for _ in 0..(DECIMALS - frac.len()) {
            frac_units *= U256::from(10u64);
        }
    }
    let scale = U256::from(10u64).pow(U256::from(DECIMALS as u64));
    Some(whole * scale + frac_units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_amounts() {
        let unit = U256::from(10u64).pow(U256::from(18u64));
        assert_eq!(parse_token_amount("1"), Some(unit));
        assert_eq!(parse_token_amount("0.1"), Some(unit / U256::from(10u64)));
        assert_eq!(
            parse_token_amount("2.5"),
            Some(unit * U256::from(5u64) / U256::from(2u64))
        );
        assert_eq!(parse_token_amount(".5"), Some(unit / U256::from(2u64)));
        assert_eq!(parse_token_amount("0.000000000000000001"), Some(U256::from(1u64)));
    }

    #[test]
    fn token_amount_rejects_garbage() {
        assert_eq!(parse_token_amount(""), None);
        assert_eq!(parse_token_amount("."), None);
        assert_eq!(parse_token_amount("1.2.3"), None);
        assert_eq!(parse_token_amount("-1"), None);
        // more fractional digits than the token has
        assert_eq!(parse_token_amount("0.0000000000000000001"), None);
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("MAKER".parse::<Role>(), Ok(Role::Maker));
        assert_eq!("taker".parse::<Role>(), Ok(Role::Taker));
        assert!("dealer".parse::<Role>().is_err());
    }
}
