//! outbound peer client
//!
//! every call carries a bounded timeout; a slow peer aborts the
//! caller's tick, it never wedges it.

use crate::error::{P2pError, Result};
use crate::messages::{
    trades_pull_digest, AckResponse, BetCommittedNotice, CommitmentSignRequest, HealthResponse,
    InfoResponse, ProposalRequest, ProposalResponse, SettlementProposal, SettlementResponse,
    TradesBlobResponse, TradesPush,
};
use parlay_crypto::AgentSigner;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const PEER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct PeerClient {
    http: Client,
}

impl Default for PeerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerClient {
    pub fn new() -> Self {
        let http = Client::builder()
            .timeout(PEER_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static config");
        Self { http }
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, url: String, body: &B) -> Result<T> {
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| P2pError::Transport(format!("{url}: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(P2pError::Rejected(format!("{url}: {status} {text}")));
        }
        response
            .json()
            .await
            .map_err(|e| P2pError::InvalidMessage(format!("{url}: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| P2pError::Transport(format!("{url}: {e}")))?;
        if !response.status().is_success() {
            return Err(P2pError::Rejected(format!("{url}: {}", response.status())));
        }
        response
            .json()
            .await
            .map_err(|e| P2pError::InvalidMessage(format!("{url}: {e}")))
    }

    pub async fn info(&self, endpoint: &str) -> Result<InfoResponse> {
        self.get(format!("{endpoint}/p2p/info")).await
    }

    pub async fn health(&self, endpoint: &str) -> Result<HealthResponse> {
        self.get(format!("{endpoint}/p2p/health")).await
    }

    pub async fn send_proposal(
        &self,
        endpoint: &str,
        proposal: &ProposalRequest,
    ) -> Result<ProposalResponse> {
        self.post(format!("{endpoint}/p2p/proposal"), proposal).await
    }

    pub async fn notify_committed(
        &self,
        endpoint: &str,
        notice: &BetCommittedNotice,
    ) -> Result<AckResponse> {
        self.post(format!("{endpoint}/p2p/bet-committed"), notice).await
    }

    pub async fn push_trades(&self, endpoint: &str, push: &TradesPush) -> Result<()> {
        let _: serde_json::Value = self.post(format!("{endpoint}/p2p/trades"), push).await?;
        Ok(())
    }

    /// authenticated pull; signs the bet id and a fresh timestamp
    pub async fn fetch_trades(
        &self,
        endpoint: &str,
        bet_id: u64,
        indices: &[u64],
        signer: &AgentSigner,
    ) -> Result<TradesBlobResponse> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let sig = signer
            .sign_hash(&trades_pull_digest(bet_id, timestamp))
            .map_err(|e| P2pError::InvalidMessage(e.to_string()))?;

        let mut url = format!("{endpoint}/p2p/trades/{bet_id}");
        if !indices.is_empty() {
            let list: Vec<String> = indices.iter().map(u64::to_string).collect();
            url = format!("{url}?indices={}", list.join(","));
        }

        let response = self
            .http
            .get(&url)
            .header("X-Signature", format!("0x{}", hex::encode(sig.as_bytes())))
            .header("X-Requestor", signer.address().to_string())
            .header("X-Timestamp", timestamp.to_string())
            .send()
            .await
            .map_err(|e| P2pError::Transport(format!("{url}: {e}")))?;
        if !response.status().is_success() {
            return Err(P2pError::Rejected(format!("{url}: {}", response.status())));
        }
        response
            .json()
            .await
            .map_err(|e| P2pError::InvalidMessage(format!("{url}: {e}")))
    }

    pub async fn propose_settlement(
        &self,
        endpoint: &str,
        proposal: &SettlementProposal,
    ) -> Result<SettlementResponse> {
        self.post(format!("{endpoint}/p2p/propose-settlement"), proposal).await
    }

    pub async fn request_commitment_sig(
        &self,
        endpoint: &str,
        request: &CommitmentSignRequest,
    ) -> Result<ProposalResponse> {
        self.post(format!("{endpoint}/p2p/commitment/sign"), request).await
    }
}
