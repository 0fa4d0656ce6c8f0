//! price oracle client
//!
//! the oracle is an external service consumed through two narrow calls:
//! a snapshot of current prices for bet construction, and per-ticker
//! exit prices at settlement. prices are 1e18 fixed-point decimal
//! strings on the wire.

use alloy_primitives::U256;
use anyhow::{anyhow, Context, Result};
use parlay_core::Quote;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const ORACLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub snapshot_id: String,
    pub prices: Vec<Quote>,
}

#[derive(Clone)]
pub struct OracleClient {
    url: String,
    source: String,
    http: Client,
}

impl OracleClient {
    pub fn new(url: &str, source: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(ORACLE_TIMEOUT)
            .build()
            .context("building oracle http client")?;
        Ok(Self { url: url.trim_end_matches('/').to_string(), source: source.to_string(), http })
    }

    /// current snapshot, capped at `limit` assets
    pub async fn snapshot(&self, limit: usize) -> Result<PriceSnapshot> {
        let url = format!("{}/v1/prices?source={}&limit={}", self.url, self.source, limit);
        let snapshot: PriceSnapshot = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("oracle request {url}"))?
            .error_for_status()
            .with_context(|| format!("oracle status {url}"))?
            .json()
            .await
            .with_context(|| format!("oracle body {url}"))?;
        if snapshot.prices.is_empty() {
            return Err(anyhow!("oracle returned an empty snapshot"));
        }
        Ok(snapshot)
    }

    /// exit prices for the given tickers; tickers the oracle no longer
    /// quotes are simply absent from the map (and cancel their trades)
    pub async fn exit_prices(&self, tickers: &[String]) -> Result<HashMap<String, U256>> {
        let url = format!(
            "{}/v1/prices?source={}&tickers={}",
            self.url,
            self.source,
            tickers.join(",")
        );
        let snapshot: PriceSnapshot = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("oracle request {url}"))?
            .error_for_status()
            .with_context(|| format!("oracle status {url}"))?
            .json()
            .await
            .with_context(|| format!("oracle body {url}"))?;
        Ok(snapshot
            .prices
            .into_iter()
            .map(|q| (q.ticker, q.price))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_decodes_decimal_prices() {
        let raw = r#"{
            "snapshotId": "snap-2024-01-01",
            "prices": [
                {"ticker": "BTC", "source": "crypto", "price": "100000000000000000000"},
                {"ticker": "ETH", "source": "crypto", "price": 5}
            ]
        }"#;
        let snapshot: PriceSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.prices.len(), 2);
        assert_eq!(snapshot.prices[0].price, U256::from(100u64) * U256::from(10u64).pow(U256::from(18u64)));
        assert_eq!(snapshot.prices[1].price, U256::from(5u64));
    }
}
