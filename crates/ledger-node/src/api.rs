use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use ledger_core::{Block, ChainStore, Client, LedgerError, MinerState, Transaction, TransactionRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub type NodeClient = Client<Box<dyn ChainStore>>;

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<NodeClient>,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize)]
struct Head {
    identity: String,
    height: u64,
    hash: Option<String>,
    difficulty: usize,
}

#[derive(Serialize)]
struct Verified {
    valid: bool,
    height: u64,
}

#[derive(Serialize)]
struct Accepted {
    accepted: bool,
    pending: usize,
}

#[derive(Serialize)]
struct Cleared {
    cleared: usize,
}

#[derive(Serialize)]
struct Mining {
    state: MinerState,
    last_error: Option<String>,
}

#[derive(Deserialize)]
struct MiningToggle {
    enable: bool,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("request failed: {}", self.0);
        }
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/chain/head", get(head))
        .route("/chain/verify", get(verify))
        .route("/tx", axum::routing::post(submit))
        .route("/mempool", get(mempool).delete(clear_mempool))
        .route("/mining", get(mining).post(toggle_mining))
        .route("/blocks", get(blocks))
        .route("/blocks/{n}", get(block_at))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn head(State(state): State<AppState>) -> ApiResult<Head> {
    let client = &state.client;
    let height = client.get_block_number();
    let hash = if height == 0 {
        None
    } else {
        Some(client.get_block_at(-1)?.hash)
    };
    Ok(Json(Head {
        identity: client.identity().to_string(),
        height,
        hash,
        difficulty: client.difficulty(),
    }))
}

async fn verify(State(state): State<AppState>) -> ApiResult<Verified> {
    state.client.verify_chain()?;
    Ok(Json(Verified {
        valid: true,
        height: state.client.get_block_number(),
    }))
}

async fn submit(
    State(state): State<AppState>,
    Json(request): Json<TransactionRequest>,
) -> ApiResult<Accepted> {
    state.client.submit_transaction(request)?;
    Ok(Json(Accepted {
        accepted: true,
        pending: state.client.pending_transactions().len(),
    }))
}

async fn mempool(State(state): State<AppState>) -> Json<Vec<Transaction>> {
    Json(state.client.pending_transactions())
}

async fn clear_mempool(State(state): State<AppState>) -> Json<Cleared> {
    Json(Cleared {
        cleared: state.client.clear_pending_transactions(),
    })
}

async fn mining(State(state): State<AppState>) -> Json<Mining> {
    Json(Mining {
        state: state.client.mining_state(),
        last_error: state.client.last_mining_error(),
    })
}

async fn toggle_mining(
    State(state): State<AppState>,
    Json(toggle): Json<MiningToggle>,
) -> Json<Mining> {
    state.client.mine(toggle.enable);
    mining(State(state)).await
}

async fn blocks(State(state): State<AppState>) -> ApiResult<Vec<Block>> {
    Ok(Json(state.client.get_all_blocks()?))
}

async fn block_at(State(state): State<AppState>, Path(n): Path<i64>) -> ApiResult<Block> {
    Ok(Json(state.client.get_block_at(n)?))
}
