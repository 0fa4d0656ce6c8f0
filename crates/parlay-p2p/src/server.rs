//! inbound p2p http server
//!
//! request pipeline: cors -> per-ip rate limit -> route -> typed decode
//! -> expiry gate -> signature gate -> handler callback. the error body
//! is always `{error: true, message, code?}` with a status matching the
//! failure class.

use crate::handlers::BetHandlers;
use crate::messages::{
    parse_signature, trades_pull_digest, BetCommittedNotice, CommitmentSignRequest, HealthResponse,
    InfoResponse, ProposalRequest, SettlementProposal, TradesPush,
};
use crate::ratelimit::{RateLimiter, DEFAULT_WINDOW};
use alloy_primitives::{Address, B256};
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parlay_core::{verify_agreement, verify_commitment};
use parlay_crypto::recover_address;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

/// freshness window for signed pull timestamps
const PULL_FRESHNESS_SECS: u64 = 300;

const COMPACTION_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: String,
    /// advertised endpoint, echoed in /p2p/info
    pub endpoint: String,
    pub address: Address,
    pub pubkey_hash: B256,
    pub rate_limit_per_second: usize,
    /// typed-data domain inputs for the signature gate
    pub vault: Address,
    pub chain_id: u64,
}

pub(crate) struct ServerContext {
    config: ServerConfig,
    handlers: Arc<dyn BetHandlers>,
    limiter: RateLimiter,
    started_at: Instant,
}

impl ServerContext {
    fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// the p2p listener plus its compaction task
pub struct P2pServer {
    ctx: Arc<ServerContext>,
}

impl P2pServer {
    pub fn new(config: ServerConfig, handlers: Arc<dyn BetHandlers>) -> Self {
        let limiter = RateLimiter::new(config.rate_limit_per_second, DEFAULT_WINDOW);
        let ctx = Arc::new(ServerContext {
            config,
            handlers,
            limiter,
            started_at: Instant::now(),
        });
        Self { ctx }
    }

    /// the route table; exposed so tests can drive it without a socket
    pub fn router(&self) -> Router {
        router(self.ctx.clone())
    }

    /// bind and serve until the shutdown signal flips
    pub async fn serve(&self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.ctx.config.bind, self.ctx.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("p2p listening on {addr}");

        let compactor_ctx = self.ctx.clone();
        let mut compactor_shutdown = shutdown.clone();
        let compactor = tokio::spawn(async move {
            let mut tick = tokio::time::interval(COMPACTION_INTERVAL);
            loop {
                tokio::select! {
                    _ = tick.tick() => compactor_ctx.limiter.compact(),
                    _ = compactor_shutdown.changed() => break,
                }
            }
        });

        let app = router(self.ctx.clone());
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

        compactor.abort();
        Ok(())
    }
}

fn router(ctx: Arc<ServerContext>) -> Router {
    Router::new()
        .route("/p2p/info", get(info_route))
        .route("/p2p/health", get(health_route))
        .route("/p2p/proposal", post(proposal_route))
        .route("/p2p/bet-committed", post(bet_committed_route))
        .route("/p2p/trades", post(trades_push_route))
        .route("/p2p/trades/{bet_id}", get(trades_pull_route))
        .route("/p2p/propose-settlement", post(settlement_route))
        .route("/p2p/settlement/{bet_id}", get(settlement_view_route))
        .route("/p2p/commitment/sign", post(commitment_sign_route))
        .layer(middleware::from_fn_with_state(ctx.clone(), rate_limit_layer))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// error envelope matching the failure-class status
struct ApiError {
    status: StatusCode,
    message: String,
    code: Option<&'static str>,
}

impl ApiError {
    fn validation(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into(), code: Some("validation") }
    }

    fn signature(message: impl Into<String>) -> Self {
        Self { status: StatusCode::UNAUTHORIZED, message: message.into(), code: Some("signature") }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.into(), code: Some("not_found") }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.code {
            Some(code) => json!({ "error": true, "message": self.message, "code": code }),
            None => json!({ "error": true, "message": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// reject bodies whose expiry is not in the future
fn check_expiry(expiry: u64) -> Result<(), ApiError> {
    if expiry <= now_secs() {
        return Err(ApiError::validation("message expired"));
    }
    Ok(())
}

fn decode<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(inner)) => Ok(inner),
        Err(rejection) => Err(ApiError::validation(rejection.body_text())),
    }
}

async fn rate_limit_layer(
    State(ctx): State<Arc<ServerContext>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    if !ctx.limiter.allow(addr.ip()) {
        let body = json!({ "error": true, "message": "rate limit exceeded", "code": "rate_limit" });
        return (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    }
    next.run(request).await
}

// === routes ===

async fn info_route(State(ctx): State<Arc<ServerContext>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        address: ctx.config.address,
        endpoint: ctx.config.endpoint.clone(),
        pubkey_hash: ctx.config.pubkey_hash,
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_secs: ctx.uptime_secs(),
    })
}

async fn health_route(State(ctx): State<Arc<ServerContext>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        timestamp: now_secs(),
        uptime_secs: ctx.uptime_secs(),
    })
}

async fn proposal_route(
    State(ctx): State<Arc<ServerContext>>,
    body: Result<Json<ProposalRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let proposal = decode(body)?;
    check_expiry(proposal.expiry)?;

    if proposal.signer != proposal.commitment.creator {
        return Err(ApiError::signature("signer is not the commitment creator"));
    }
    let sig = parse_signature(&proposal.signature)
        .map_err(|e| ApiError::validation(e.to_string()))?;
    let commitment = proposal.commitment.to_commitment();
    if !verify_commitment(&commitment, &sig, proposal.signer, ctx.config.vault, ctx.config.chain_id)
    {
        return Err(ApiError::signature("commitment signature does not recover to signer"));
    }

    let response = ctx.handlers.on_proposal(proposal).await;
    Ok(Json(response).into_response())
}

async fn bet_committed_route(
    State(ctx): State<Arc<ServerContext>>,
    body: Result<Json<BetCommittedNotice>, JsonRejection>,
) -> Result<Response, ApiError> {
    let notice = decode(body)?;
    check_expiry(notice.expiry)?;

    if notice.signer != notice.creator {
        return Err(ApiError::signature("commit notice must come from the creator"));
    }
    let sig = parse_signature(&notice.signature)
        .map_err(|e| ApiError::validation(e.to_string()))?;
    match recover_address(&notice.digest(), &sig) {
        Ok(addr) if addr == notice.signer => {}
        _ => return Err(ApiError::signature("notice signature does not recover to signer")),
    }

    let ack = ctx.handlers.on_bet_committed(notice).await;
    Ok(Json(ack).into_response())
}

async fn trades_push_route(
    State(ctx): State<Arc<ServerContext>>,
    body: Result<Json<TradesPush>, JsonRejection>,
) -> Result<Response, ApiError> {
    let push = decode(body)?;
    check_expiry(push.expiry)?;

    let sig =
        parse_signature(&push.signature).map_err(|e| ApiError::validation(e.to_string()))?;
    match recover_address(&push.digest(), &sig) {
        Ok(addr) if addr == push.signer => {}
        _ => return Err(ApiError::signature("trades signature does not recover to signer")),
    }

    ctx.handlers.on_trades(push).await;
    Ok(Json(json!({ "received": true })).into_response())
}

#[derive(Debug, Deserialize)]
struct PullQuery {
    /// comma-separated trade indices to prove
    indices: Option<String>,
}

async fn trades_pull_route(
    State(ctx): State<Arc<ServerContext>>,
    Path(bet_id): Path<u64>,
    Query(query): Query<PullQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let signature = header_str(&headers, "x-signature")?;
    let requestor: Address = header_str(&headers, "x-requestor")?
        .parse()
        .map_err(|_| ApiError::validation("bad x-requestor address"))?;
    let timestamp: u64 = header_str(&headers, "x-timestamp")?
        .parse()
        .map_err(|_| ApiError::validation("bad x-timestamp"))?;

    let now = now_secs();
    if timestamp.abs_diff(now) > PULL_FRESHNESS_SECS {
        return Err(ApiError::validation("stale pull timestamp"));
    }

    let raw = hex::decode(signature.trim_start_matches("0x"))
        .map_err(|_| ApiError::validation("bad x-signature hex"))?;
    let sig = parse_signature(&raw.into()).map_err(|e| ApiError::validation(e.to_string()))?;
    match recover_address(&trades_pull_digest(bet_id, timestamp), &sig) {
        Ok(addr) if addr == requestor => {}
        _ => return Err(ApiError::signature("pull signature does not recover to requestor")),
    }

    let indices = parse_indices(query.indices.as_deref())?;
    match ctx.handlers.trades_blob(bet_id, &indices).await {
        Some(blob) => Ok(Json(blob).into_response()),
        None => Err(ApiError::not_found(format!("no trades for bet {bet_id}"))),
    }
}

async fn settlement_route(
    State(ctx): State<Arc<ServerContext>>,
    body: Result<Json<SettlementProposal>, JsonRejection>,
) -> Result<Response, ApiError> {
    let proposal = decode(body)?;
    check_expiry(proposal.expiry)?;

    let sig = parse_signature(&proposal.signature)
        .map_err(|e| ApiError::validation(e.to_string()))?;
    let agreement = proposal.to_agreement();
    if !verify_agreement(&agreement, &sig, proposal.signer, ctx.config.vault, ctx.config.chain_id) {
        return Err(ApiError::signature("agreement signature does not recover to signer"));
    }

    let response = ctx.handlers.on_settlement_proposal(proposal).await;
    Ok(Json(response).into_response())
}

async fn settlement_view_route(
    State(ctx): State<Arc<ServerContext>>,
    Path(bet_id): Path<u64>,
) -> Result<Response, ApiError> {
    match ctx.handlers.settlement_view(bet_id).await {
        Some(view) => Ok(Json(view).into_response()),
        None => Err(ApiError::not_found(format!("unknown bet {bet_id}"))),
    }
}

async fn commitment_sign_route(
    State(ctx): State<Arc<ServerContext>>,
    body: Result<Json<CommitmentSignRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = decode(body)?;
    check_expiry(request.expiry)?;

    let sig = parse_signature(&request.signature)
        .map_err(|e| ApiError::validation(e.to_string()))?;
    let commitment = request.commitment.to_commitment();
    if !verify_commitment(&commitment, &sig, request.signer, ctx.config.vault, ctx.config.chain_id)
    {
        return Err(ApiError::signature("sign-request signature does not recover to signer"));
    }

    let response = ctx.handlers.on_commitment_sign(request).await;
    Ok(Json(response).into_response())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::validation(format!("missing {name} header")))
}

fn parse_indices(raw: Option<&str>) -> Result<Vec<u64>, ApiError> {
    let Some(raw) = raw else { return Ok(Vec::new()) };
    raw.split(',')
        .filter(|part| !part.is_empty())
        .map(|part| part.trim().parse().map_err(|_| ApiError::validation("bad proof index")))
        .collect()
}
