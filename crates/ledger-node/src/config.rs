use crate::constants::{DEFAULT_LISTEN, DEFAULT_PEER_TIMEOUT_SECS};
use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "ledger-node")]
#[command(about = "Ledger node with proof-of-work and longest-chain consensus")]
pub struct Args {
    /// Address to listen on, e.g. 127.0.0.1:3001
    #[arg(long, env = "LEDGER_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: String,

    /// URL other nodes reach this one at. Defaults to http://<listen>
    #[arg(long, env = "LEDGER_NODE_URL")]
    pub node_url: Option<String>,

    /// Peer to know about at start-up (repeatable)
    #[arg(long = "peer", env = "LEDGER_PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Recompute proof-of-work for blocks announced by peers
    #[arg(long, env = "LEDGER_VERIFY_FOREIGN_POW")]
    pub verify_foreign_pow: bool,

    /// Per-request timeout for calls to peers
    #[arg(long, env = "LEDGER_PEER_TIMEOUT_SECS", default_value_t = DEFAULT_PEER_TIMEOUT_SECS)]
    pub peer_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_url: String,
    pub bootstrap_peers: Vec<String>,
    pub verify_foreign_pow: bool,
    pub peer_timeout: Duration,
}

impl NodeConfig {
    pub fn new(node_url: impl Into<String>) -> Self {
        Self {
            node_url: normalize_url(&node_url.into()),
            bootstrap_peers: Vec::new(),
            verify_foreign_pow: false,
            peer_timeout: Duration::from_secs(DEFAULT_PEER_TIMEOUT_SECS),
        }
    }
}

impl From<&Args> for NodeConfig {
    fn from(args: &Args) -> Self {
        let node_url = args
            .node_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", args.listen));
        Self {
            node_url: normalize_url(&node_url),
            bootstrap_peers: args.peers.iter().map(|p| normalize_url(p)).collect(),
            verify_foreign_pow: args.verify_foreign_pow,
            peer_timeout: Duration::from_secs(args.peer_timeout_secs),
        }
    }
}

/// Peer URLs are compared as strings, so drop surrounding whitespace and
/// trailing slashes.
pub fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
