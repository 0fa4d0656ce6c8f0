//! route pipeline tests driven straight through the router

use alloy_primitives::{keccak256, Address, Bytes, U256};
use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use async_trait::async_trait;
use parlay_core::abi::BetCommitment;
use parlay_core::{sign_commitment, CommitmentMode};
use parlay_crypto::AgentSigner;
use parlay_p2p::handlers::{BetHandlers, NoopHandlers};
use parlay_p2p::messages::{
    BetCommittedNotice, CommitmentWire, ProposalRequest, ProposalResponse,
};
use parlay_p2p::server::{P2pServer, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

const CHAIN_ID: u64 = 31337;

fn vault() -> Address {
    Address::from([0x42; 20])
}

fn config() -> ServerConfig {
    let signer = AgentSigner::random();
    ServerConfig {
        port: 0,
        bind: "127.0.0.1".into(),
        endpoint: "http://127.0.0.1:8080".into(),
        address: signer.address(),
        pubkey_hash: signer.pubkey_hash(),
        rate_limit_per_second: 10,
        vault: vault(),
        chain_id: CHAIN_ID,
    }
}

fn router(handlers: Arc<dyn BetHandlers>) -> axum::Router {
    P2pServer::new(config(), handlers)
        .router()
        .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9999))))
}

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

fn post_json(path: &str, body: &impl serde::Serialize) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn signed_proposal(maker: &AgentSigner, taker_addr: Address, expiry: u64) -> ProposalRequest {
    let commitment = BetCommitment {
        tradesRoot: keccak256(b"root"),
        creator: maker.address(),
        filler: taker_addr,
        creatorAmount: U256::from(10).pow(U256::from(17)),
        fillerAmount: U256::from(10).pow(U256::from(17)),
        deadline: U256::from(now() + 60),
        nonce: U256::ZERO,
        expiry: U256::from(expiry),
    };
    let sig = sign_commitment(maker, &commitment, vault(), CHAIN_ID).unwrap();
    ProposalRequest {
        commitment: CommitmentWire::from(&commitment),
        snapshot_id: "snap-1".into(),
        mode: CommitmentMode::Merkle,
        trade_count: 0,
        trades_gz: Bytes::new(),
        signer: maker.address(),
        signature: sig.as_bytes().to_vec().into(),
        expiry,
    }
}

#[tokio::test]
async fn health_returns_healthy() {
    let app = router(Arc::new(NoopHandlers));
    let response = app
        .oneshot(Request::get("/p2p/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn burst_of_fifteen_gets_exactly_ten_through() {
    let app = router(Arc::new(NoopHandlers));
    let mut ok = 0;
    let mut limited = 0;
    for _ in 0..15 {
        let response = app
            .clone()
            .oneshot(Request::get("/p2p/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        match response.status() {
            StatusCode::OK => ok += 1,
            StatusCode::TOO_MANY_REQUESTS => limited += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(ok, 10);
    assert_eq!(limited, 5);
}

#[tokio::test]
async fn expired_proposal_is_400() {
    let maker = AgentSigner::random();
    let app = router(Arc::new(NoopHandlers));
    let proposal = signed_proposal(&maker, Address::from([9; 20]), now() - 1);
    let response = app.oneshot(post_json("/p2p/proposal", &proposal)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    let err: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(err["error"], true);
}

#[tokio::test]
async fn malformed_body_is_400() {
    let app = router(Arc::new(NoopHandlers));
    let request = Request::builder()
        .method("POST")
        .uri("/p2p/proposal")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"commitment": 5}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn forged_signature_is_401() {
    let maker = AgentSigner::random();
    let imposter = AgentSigner::random();
    let app = router(Arc::new(NoopHandlers));
    // commitment names the maker as creator but the imposter signed it
    let mut proposal = signed_proposal(&imposter, Address::from([9; 20]), now() + 60);
    proposal.commitment.creator = maker.address();
    proposal.signer = maker.address();
    let response = app.oneshot(post_json("/p2p/proposal", &proposal)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

struct AcceptingHandlers {
    taker: AgentSigner,
}

#[async_trait]
impl BetHandlers for AcceptingHandlers {
    async fn on_proposal(&self, proposal: ProposalRequest) -> ProposalResponse {
        let commitment = proposal.commitment.to_commitment();
        let sig = sign_commitment(&self.taker, &commitment, vault(), CHAIN_ID).unwrap();
        ProposalResponse::accepted(sig, self.taker.address())
    }
}

#[tokio::test]
async fn valid_proposal_reaches_handler_and_returns_signature() {
    let maker = AgentSigner::random();
    let taker = AgentSigner::random();
    let taker_addr = taker.address();
    let app = router(Arc::new(AcceptingHandlers { taker }));

    let proposal = signed_proposal(&maker, taker_addr, now() + 60);
    let response = app.oneshot(post_json("/p2p/proposal", &proposal)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    let decision: ProposalResponse = serde_json::from_slice(&body).unwrap();
    assert!(decision.accepted);
    assert_eq!(decision.signer, Some(taker_addr));
}

#[tokio::test]
async fn bet_committed_requires_creator_signature() {
    let maker = AgentSigner::random();
    let app = router(Arc::new(NoopHandlers));

    let mut notice = BetCommittedNotice {
        bet_id: 5,
        trades_root: keccak256(b"root"),
        creator: maker.address(),
        filler: Address::from([9; 20]),
        tx_hash: keccak256(b"tx"),
        expiry: now() + 60,
        signer: maker.address(),
        signature: Bytes::new(),
    };
    let sig = maker.sign_hash(&notice.digest()).unwrap();
    notice.signature = sig.as_bytes().to_vec().into();

    let response = app
        .clone()
        .oneshot(post_json("/p2p/bet-committed", &notice))
        .await
        .unwrap();
    // the default handler declines but the signature gate passed
    assert_eq!(response.status(), StatusCode::OK);

    // tampering after signing must be a 401
    notice.bet_id = 6;
    let response = app.oneshot(post_json("/p2p/bet-committed", &notice)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn trades_pull_requires_fresh_signed_headers() {
    let requestor = AgentSigner::random();
    let app = router(Arc::new(NoopHandlers));

    let timestamp = now();
    let sig = requestor
        .sign_hash(&parlay_p2p::messages::trades_pull_digest(3, timestamp))
        .unwrap();
    let request = Request::get("/p2p/trades/3")
        .header("X-Signature", format!("0x{}", hex::encode(sig.as_bytes())))
        .header("X-Requestor", requestor.address().to_string())
        .header("X-Timestamp", timestamp.to_string())
        .body(Body::empty())
        .unwrap();
    // gate passes, handler has no blob -> 404
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // stale timestamp -> 400
    let stale = timestamp - 3600;
    let sig = requestor
        .sign_hash(&parlay_p2p::messages::trades_pull_digest(3, stale))
        .unwrap();
    let request = Request::get("/p2p/trades/3")
        .header("X-Signature", format!("0x{}", hex::encode(sig.as_bytes())))
        .header("X-Requestor", requestor.address().to_string())
        .header("X-Timestamp", stale.to_string())
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // missing headers -> 400
    let response = app
        .oneshot(Request::get("/p2p/trades/3").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_settlement_view_is_404() {
    let app = router(Arc::new(NoopHandlers));
    let response = app
        .oneshot(Request::get("/p2p/settlement/77").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
