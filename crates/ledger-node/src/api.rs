use crate::{
    config::normalize_url,
    error::ApiError,
    peers::FanOutReport,
    state::AppState,
};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use ledger_core::{
    consensus,
    constants::{MINING_REWARD, POW_DIFFICULTY, REWARD_SENDER},
    AddressSummary, Block, ChainSnapshot, Transaction,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    #[serde(flatten)]
    pub snapshot: ChainSnapshot,
    pub current_node_url: String,
    pub network_nodes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub amount: f64,
    pub sender: String,
    pub recipient: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlock {
    pub new_block: Block,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterNode {
    pub new_node_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRegister {
    pub all_network_nodes: Vec<String>,
}

#[derive(Serialize)]
struct Note {
    note: String,
}

impl Note {
    fn new(note: impl Into<String>) -> Json<Self> {
        Json(Self { note: note.into() })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MineResponse {
    note: &'static str,
    block: Block,
    block_broadcast: FanOutReport,
    reward: Transaction,
    reward_broadcast: FanOutReport,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastResponse {
    note: String,
    transaction: Transaction,
    peers: FanOutReport,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationResponse {
    note: &'static str,
    peers: FanOutReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    bulk_error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConsensusResponse {
    note: &'static str,
    chain: Vec<Block>,
    peers: FanOutReport,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddressResponse {
    address_data: AddressSummary,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/blockchain", get(blockchain))
        .route("/transaction", post(receive_transaction))
        .route("/transaction/broadcast", post(broadcast_transaction))
        .route("/mine", get(mine))
        .route("/receive-new-block", post(receive_new_block))
        .route("/register-and-broadcast-node", post(register_and_broadcast_node))
        .route("/register-node", post(register_node))
        .route("/register-nodes-bulk", post(register_nodes_bulk))
        .route("/consensus", get(run_consensus))
        .route("/block/{block_hash}", get(block_by_hash))
        .route("/transaction/{transaction_id}", get(transaction_by_id))
        .route("/address/{address}", get(address_data))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn blockchain(State(state): State<AppState>) -> Json<NodeSnapshot> {
    let snapshot = state.ledger.lock().await.snapshot();
    Json(NodeSnapshot {
        snapshot,
        current_node_url: state.node_url.clone(),
        network_nodes: state.peer_urls().await,
    })
}

/// Local admission of a transaction another node broadcast.
async fn receive_transaction(
    State(state): State<AppState>,
    Json(tx): Json<Transaction>,
) -> Result<Json<Note>, ApiError> {
    let block_index = state.ledger.lock().await.admit_transaction(tx)?;
    Ok(Note::new(format!("Transaction will be added in block {block_index}")))
}

async fn broadcast_transaction(
    State(state): State<AppState>,
    Json(req): Json<TransactionRequest>,
) -> Result<Json<BroadcastResponse>, ApiError> {
    let (tx, block_index) = {
        let mut ledger = state.ledger.lock().await;
        let tx = ledger.create_transaction(req.amount, req.sender, req.recipient);
        let block_index = ledger.admit_transaction(tx.clone())?;
        (tx, block_index)
    };

    let peers = state.peer_urls().await;
    let report = state.client.broadcast(&peers, "/transaction", &tx).await;
    Ok(Json(BroadcastResponse {
        note: format!("Transaction created and broadcast; it will be added in block {block_index}"),
        transaction: tx,
        peers: report,
    }))
}

/// Seals the pending pool, announces the block, then pays the mining reward
/// to this node's address through a regular broadcast.
async fn mine(State(state): State<AppState>) -> Result<Json<MineResponse>, ApiError> {
    let _mining = state.mining.try_lock().map_err(|_| ApiError::MiningInProgress)?;

    let job = state.ledger.lock().await.begin_mining()?;
    let (job, (nonce, hash)) = tokio::task::spawn_blocking(move || {
        let seal = job.mine(POW_DIFFICULTY);
        (job, seal)
    })
    .await?;
    let block = state.ledger.lock().await.commit_mining(job, nonce, hash)?;

    let peers = state.peer_urls().await;
    let new_block = NewBlock { new_block: block };
    let block_broadcast = state.client.broadcast(&peers, "/receive-new-block", &new_block).await;

    let reward = Transaction::new(MINING_REWARD, REWARD_SENDER, state.node_address.clone());
    state.ledger.lock().await.admit_transaction(reward.clone())?;
    let reward_broadcast = state.client.broadcast(&peers, "/transaction", &reward).await;

    Ok(Json(MineResponse {
        note: "New block mined & broadcast successfully",
        block: new_block.new_block,
        block_broadcast,
        reward,
        reward_broadcast,
    }))
}

async fn receive_new_block(
    State(state): State<AppState>,
    Json(req): Json<NewBlock>,
) -> Result<Json<Value>, ApiError> {
    let block = req.new_block;
    state
        .ledger
        .lock()
        .await
        .receive_block(block.clone(), state.verify_foreign_pow)?;
    Ok(Json(json!({
        "note": "New block received and accepted.",
        "newBlock": block,
    })))
}

/// Adds a peer, tells every other known peer about it, then hands the
/// newcomer the full peer set.
async fn register_and_broadcast_node(
    State(state): State<AppState>,
    Json(req): Json<RegisterNode>,
) -> Json<RegistrationResponse> {
    let new_node_url = normalize_url(&req.new_node_url);
    if new_node_url.is_empty() || new_node_url == state.node_url {
        return Json(RegistrationResponse {
            note: "Nothing to register.",
            peers: FanOutReport::default(),
            bulk_error: None,
        });
    }

    let (others, all_nodes) = {
        let mut peers = state.peers.write().await;
        peers.insert(&new_node_url);
        let others: Vec<String> = peers.urls().into_iter().filter(|url| *url != new_node_url).collect();
        (others, peers.with_own_url())
    };

    let registration = RegisterNode {
        new_node_url: new_node_url.clone(),
    };
    let report = state.client.broadcast(&others, "/register-node", &registration).await;

    let bulk = BulkRegister {
        all_network_nodes: all_nodes,
    };
    let bulk_error = state
        .client
        .post(&new_node_url, "/register-nodes-bulk", &bulk)
        .await
        .err()
        .map(|e| e.to_string());

    info!(peer = %new_node_url, failures = report.failures(), "registered node with network");
    Json(RegistrationResponse {
        note: "New node registered with network successfully.",
        peers: report,
        bulk_error,
    })
}

async fn register_node(State(state): State<AppState>, Json(req): Json<RegisterNode>) -> Json<Note> {
    let added = state.peers.write().await.insert(&req.new_node_url);
    if added {
        info!(peer = %req.new_node_url, "registered node");
    }
    Note::new("New node registered successfully.")
}

async fn register_nodes_bulk(State(state): State<AppState>, Json(req): Json<BulkRegister>) -> Json<Note> {
    let added = state
        .peers
        .write()
        .await
        .extend(req.all_network_nodes.iter().map(String::as_str));
    info!(added, "bulk registration");
    Note::new("Bulk registration successful.")
}

/// Gathers every peer's chain, then applies the longest-valid-chain rule.
/// The winner is validated on a blocking thread without holding the ledger.
async fn run_consensus(State(state): State<AppState>) -> Result<Json<ConsensusResponse>, ApiError> {
    let peers = state.peer_urls().await;
    let (snapshots, report) = state.client.gather_snapshots(&peers).await;

    let local_chain = state.ledger.lock().await.chain().to_vec();
    let resolution = tokio::task::spawn_blocking(move || consensus::resolve(&local_chain, snapshots)).await?;

    let mut ledger = state.ledger.lock().await;
    let replaced = ledger.apply_resolution(resolution);
    let note = if replaced {
        "This chain has been replaced."
    } else {
        "Current chain has not been replaced."
    };
    Ok(Json(ConsensusResponse {
        note,
        chain: ledger.chain().to_vec(),
        peers: report,
    }))
}

async fn block_by_hash(State(state): State<AppState>, Path(block_hash): Path<String>) -> Json<Value> {
    let ledger = state.ledger.lock().await;
    Json(json!({ "block": ledger.block_by_hash(&block_hash) }))
}

async fn transaction_by_id(State(state): State<AppState>, Path(transaction_id): Path<String>) -> Json<Value> {
    let ledger = state.ledger.lock().await;
    let found = ledger.find_transaction(&transaction_id);
    Json(json!({
        "transaction": found.transaction,
        "block": found.block,
    }))
}

async fn address_data(State(state): State<AppState>, Path(address): Path<String>) -> Json<AddressResponse> {
    let summary = state.ledger.lock().await.address_summary(&address);
    Json(AddressResponse { address_data: summary })
}
