use crate::{
    config::NodeConfig,
    peers::{PeerClient, PeerError, PeerSet},
};
use ledger_core::{random_id, Ledger};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub type AppState = Arc<NodeState>;

/// Everything a request handler can reach. The ledger sits behind a single
/// lock; mining holds a separate guard so only one proof-of-work runs at a
/// time while reads keep being served.
pub struct NodeState {
    pub ledger: Mutex<Ledger>,
    pub peers: RwLock<PeerSet>,
    pub mining: Mutex<()>,
    pub client: PeerClient,
    /// Recipient of this node's mining rewards.
    pub node_address: String,
    pub node_url: String,
    pub verify_foreign_pow: bool,
}

impl NodeState {
    pub fn new(config: &NodeConfig) -> Result<AppState, PeerError> {
        let mut peers = PeerSet::new(config.node_url.clone());
        peers.extend(config.bootstrap_peers.iter().map(String::as_str));

        Ok(Arc::new(Self {
            ledger: Mutex::new(Ledger::new()),
            peers: RwLock::new(peers),
            mining: Mutex::new(()),
            client: PeerClient::new(config.peer_timeout)?,
            node_address: random_id(),
            node_url: config.node_url.clone(),
            verify_foreign_pow: config.verify_foreign_pow,
        }))
    }

    pub async fn peer_urls(&self) -> Vec<String> {
        self.peers.read().await.urls()
    }
}
