//! HTTP facade for emberchain
//!
//! A thin JSON layer over the ledger task, the miner and the peer set. Every
//! handler forwards to the same entry points the P2P layer uses.

use axum::{
    extract::{Path, State},
    http::{self, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use crate::blockchain::{Block, ChainSummary};
use crate::error::ChainError;
use crate::miner::Miner;
use crate::network::NetworkNode;
use crate::service::LedgerHandle;
use crate::transaction::{Transaction, UnspentTxOut};
use crate::wallet::Wallet;

/// Handles shared by every request.
#[derive(Clone)]
pub struct ApiState {
    pub ledger: LedgerHandle,
    pub network: Arc<NetworkNode>,
    pub miner: Miner,
    pub wallet: Arc<Wallet>,
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BlockchainError(ChainError),
    InvalidInput(String),
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BlockchainError(e) => {
                let status = match &e {
                    ChainError::RaceLost { .. } => StatusCode::CONFLICT,
                    ChainError::LedgerUnavailable
                    | ChainError::MiningFailed(_)
                    | ChainError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, e.to_string())
            }
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::BlockchainError(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct MineRawBlockRequest {
    pub data: Option<Vec<Transaction>>,
}

#[derive(Deserialize)]
pub struct PaymentRequest {
    pub address: Option<String>,
    pub amount: Option<u64>,
}

impl PaymentRequest {
    fn into_parts(self) -> Result<(String, u64), ApiError> {
        match (self.address, self.amount) {
            (Some(address), Some(amount)) => Ok((address, amount)),
            _ => Err(ApiError::InvalidInput("invalid address or amount".to_string())),
        }
    }
}

#[derive(Deserialize)]
pub struct AddPeerRequest {
    pub peer: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct AddressResponse {
    pub address: String,
}

#[derive(Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: u64,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(flatten)]
    chain: ChainSummary,
    peers: usize,
    timestamp: String,
}

// ============================================================================
// API Server
// ============================================================================

/// Build the API router with all endpoints (for testing)
pub fn build_api_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        // Chain
        .route("/blocks", get(get_blocks))
        .route("/blocks/:hash", get(get_block))
        .route("/transactions/:id", get(get_transaction))
        .route("/unspentTransactionOutputs", get(get_unspent_outputs))
        // Wallet
        .route("/myUnspentTransactionOutputs", get(get_my_unspent_outputs))
        .route("/address", get(get_address))
        .route("/balance", get(get_balance))
        .route("/transactionPool", get(get_transaction_pool))
        .route("/sendTransaction", post(send_transaction))
        // Mining
        .route("/mineRawBlock", post(mine_raw_block))
        .route("/mineBlock", post(mine_block))
        .route("/mineTransaction", post(mine_transaction))
        // Network
        .route("/peers", get(get_peers))
        .route("/addPeer", post(add_peer))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(cors)
}

pub async fn run_api_server(state: ApiState, port: u16) -> Result<(), ChainError> {
    let app = build_api_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ChainError::NetworkError(format!("API port {} unavailable: {}", port, e)))?;

    info!("API server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn get_blocks(State(state): State<ApiState>) -> Result<Json<Vec<Block>>, ApiError> {
    Ok(Json(state.ledger.blocks().await?))
}

async fn get_block(
    State(state): State<ApiState>,
    Path(hash): Path<String>,
) -> Result<Json<Block>, ApiError> {
    state
        .ledger
        .find_block(hash.clone())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Block {} not found", hash)))
}

async fn get_transaction(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Transaction>, ApiError> {
    state
        .ledger
        .find_transaction(id.clone())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Transaction {} not found", id)))
}

async fn get_unspent_outputs(
    State(state): State<ApiState>,
) -> Result<Json<Vec<UnspentTxOut>>, ApiError> {
    Ok(Json(state.ledger.utxos().await?.to_vec()))
}

async fn get_my_unspent_outputs(
    State(state): State<ApiState>,
) -> Result<Json<Vec<UnspentTxOut>>, ApiError> {
    let utxos = state.ledger.utxos().await?;
    Ok(Json(utxos.owned_by(&state.wallet.address())))
}

async fn get_address(State(state): State<ApiState>) -> Json<AddressResponse> {
    Json(AddressResponse {
        address: state.wallet.address(),
    })
}

async fn get_balance(State(state): State<ApiState>) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.ledger.balance(state.wallet.address()).await?;
    Ok(Json(BalanceResponse { balance }))
}

async fn get_transaction_pool(
    State(state): State<ApiState>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    Ok(Json(state.ledger.pool_transactions().await?))
}

async fn send_transaction(
    State(state): State<ApiState>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<Transaction>, ApiError> {
    let (address, amount) = request.into_parts()?;
    Ok(Json(state.miner.send_transaction(address, amount).await?))
}

async fn mine_raw_block(
    State(state): State<ApiState>,
    Json(request): Json<MineRawBlockRequest>,
) -> Result<Json<Block>, ApiError> {
    let data = request
        .data
        .ok_or_else(|| ApiError::InvalidInput("data parameter is missing".to_string()))?;
    Ok(Json(state.miner.generate_raw_next_block(data).await?))
}

async fn mine_block(State(state): State<ApiState>) -> Result<Json<Block>, ApiError> {
    Ok(Json(state.miner.generate_next_block().await?))
}

async fn mine_transaction(
    State(state): State<ApiState>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<Block>, ApiError> {
    let (address, amount) = request.into_parts()?;
    Ok(Json(
        state
            .miner
            .generate_next_block_with_transaction(address, amount)
            .await?,
    ))
}

async fn get_peers(State(state): State<ApiState>) -> Json<Vec<String>> {
    Json(state.network.list_peers().await)
}

async fn add_peer(
    State(state): State<ApiState>,
    Json(request): Json<AddPeerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let peer = request
        .peer
        .ok_or_else(|| ApiError::InvalidInput("peer parameter is missing".to_string()))?;
    state.network.connect_peer(&peer).await?;
    Ok(Json(serde_json::json!({ "peer": peer })))
}

async fn health_check(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let chain = state.ledger.summary().await?;
    Ok(Json(HealthResponse {
        status: "healthy",
        chain,
        peers: state.network.peers().len().await,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}
