// Path: crates/node/src/api.rs
//! The node's ambient HTTP surface (§6 "HTTP interface").
//!
//! Separate from `timpal-telemetry`'s `/metrics`/`/healthz` server: this
//! one speaks the chain-facing API an explorer or wallet calls, backed
//! by a read lease on the ledger (§5: "external read-only views ...
//! access an immutable snapshot or a read lease that blocks no writer").

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use timpal_block::Block;
use timpal_ledger::Ledger;
use timpal_mempool::Mempool;
use timpal_tx::Transaction;
use timpal_types::Address;
use tokio::sync::RwLock;

/// Maximum `end - start` a single `/api/blocks/range` call may request
/// (§6).
const MAX_BLOCK_RANGE_SPAN: u64 = 100;

/// Shared state handed to every handler. `Arc<RwLock<Ledger>>` is the
/// node's read lease: handlers take a read guard, the consensus loop
/// takes the sole write guard once per block.
#[derive(Clone)]
pub struct ApiState {
    pub ledger: Arc<RwLock<Ledger>>,
    pub mempool: Arc<Mempool>,
    pub peer_count: Arc<std::sync::atomic::AtomicUsize>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/blockchain/info", get(blockchain_info))
        .route("/api/blocks/range", get(blocks_range))
        .route("/api/account/{address}", get(account))
        .route("/submit_transaction", post(submit_transaction))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    height: u64,
    peers: usize,
    validator_count: usize,
}

async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let ledger = state.ledger.read().await;
    Json(HealthResponse {
        height: ledger.height(),
        peers: state.peer_count.load(std::sync::atomic::Ordering::Relaxed),
        validator_count: ledger.registry_len(),
    })
}

#[derive(Serialize)]
struct BlockchainInfoResponse {
    height: u64,
    blocks: Vec<Block>,
}

async fn blockchain_info(State(state): State<ApiState>) -> Json<BlockchainInfoResponse> {
    let ledger = state.ledger.read().await;
    let height = ledger.height();
    let start = height.saturating_sub(MAX_BLOCK_RANGE_SPAN);
    let blocks = ledger
        .blocks_range(start, height.saturating_sub(1))
        .into_iter()
        .cloned()
        .collect();
    Json(BlockchainInfoResponse { height, blocks })
}

#[derive(Deserialize)]
struct BlockRangeQuery {
    start: u64,
    end: u64,
}

#[derive(Serialize)]
struct BlockRangeResponse {
    blocks: Vec<Block>,
    latest_height: u64,
    count: usize,
}

async fn blocks_range(
    State(state): State<ApiState>,
    Query(query): Query<BlockRangeQuery>,
) -> Result<Json<BlockRangeResponse>, (StatusCode, String)> {
    if query.end < query.start {
        return Err((StatusCode::BAD_REQUEST, "end must be >= start".to_string()));
    }
    if query.end - query.start > MAX_BLOCK_RANGE_SPAN {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("range span exceeds {MAX_BLOCK_RANGE_SPAN}"),
        ));
    }
    let ledger = state.ledger.read().await;
    let blocks: Vec<Block> = ledger
        .blocks_range(query.start, query.end)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(BlockRangeResponse {
        count: blocks.len(),
        latest_height: ledger.height(),
        blocks,
    }))
}

#[derive(Serialize)]
struct AccountResponse {
    balance: u128,
    nonce: u64,
    pending_nonce: u64,
    pending_count: usize,
}

async fn account(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<AccountResponse>, (StatusCode, String)> {
    let address = Address::parse(&address).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let ledger = state.ledger.read().await;
    let nonce = ledger.nonce_of(&address);
    let pending_nonce = state.mempool.pending_nonce(&address, nonce);
    Ok(Json(AccountResponse {
        balance: ledger.balance_of(&address),
        nonce,
        pending_nonce,
        pending_count: (pending_nonce - nonce) as usize,
    }))
}

#[derive(Deserialize)]
struct SubmitTransactionRequest {
    transaction: Transaction,
}

#[derive(Serialize)]
struct SubmitTransactionResponse {
    accepted: bool,
    reason: Option<String>,
}

async fn submit_transaction(
    State(state): State<ApiState>,
    Json(request): Json<SubmitTransactionRequest>,
) -> Json<SubmitTransactionResponse> {
    let tx = request.transaction;
    if !tx.verify() {
        return Json(SubmitTransactionResponse {
            accepted: false,
            reason: Some("signature verification failed".to_string()),
        });
    }
    let ledger = state.ledger.read().await;
    let balance = ledger.balance_of(&tx.sender);
    let committed_nonce = ledger.nonce_of(&tx.sender);
    let min_deposit = 0;
    if let Err(err) = tx.is_valid(balance, committed_nonce, min_deposit) {
        return Json(SubmitTransactionResponse {
            accepted: false,
            reason: Some(err.to_string()),
        });
    }
    drop(ledger);

    let hash = match tx.tx_hash() {
        Ok(hash) => hash,
        Err(err) => {
            return Json(SubmitTransactionResponse {
                accepted: false,
                reason: Some(err.to_string()),
            })
        }
    };
    match state.mempool.add(tx, hash, committed_nonce) {
        timpal_mempool::AddResult::Ready | timpal_mempool::AddResult::Future => {
            Json(SubmitTransactionResponse { accepted: true, reason: None })
        }
        timpal_mempool::AddResult::Rejected(reason) => {
            Json(SubmitTransactionResponse { accepted: false, reason: Some(reason) })
        }
    }
}
