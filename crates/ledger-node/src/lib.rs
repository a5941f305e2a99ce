//! HTTP surface of a ledger node: chain snapshots, transaction admission and
//! broadcast, mining, foreign block acceptance, peer registration and
//! consensus resolution against peers.

pub mod api;
pub mod config;
mod constants;
pub mod error;
pub mod peers;
pub mod state;

pub use api::build_router;
pub use config::{Args, NodeConfig};
pub use state::{AppState, NodeState};
