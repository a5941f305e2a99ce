use clap::Parser;
use ledger_node::{build_router, Args, NodeConfig, NodeState};
use std::net::SocketAddr;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = NodeConfig::from(&args);
    let state = NodeState::new(&config)?;
    info!(
        node_url = %config.node_url,
        address = %state.node_address,
        peers = config.bootstrap_peers.len(),
        "node state initialised"
    );

    let app = build_router(state);

    let addr: SocketAddr = args.listen.parse()?;
    info!("ledger-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
