use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for a ledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:3001)
    #[arg(long, global = true, env = "LEDGER_NODE", default_value = "http://127.0.0.1:3001")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a transaction and broadcast it to the network
    Send {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: f64,
    },
    /// Mine a block from the node's pending transactions
    Mine,
    /// Replace the node's chain with the longest valid peer chain
    Consensus,
    /// Register a new node with the network through this node
    Register {
        /// URL of the node joining the network
        url: String,
    },
    /// Print the node's chain, pending pool and peers
    Chain,
    /// Look up a block by hash
    Block { hash: String },
    /// Look up a transaction by id
    Tx { id: String },
    /// Balance and history of an address
    Address { address: String },
}

#[derive(Serialize)]
struct TxIn {
    amount: f64,
    sender: String,
    recipient: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterIn {
    new_node_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let node = cli.node.trim_end_matches('/');
    let client = reqwest::Client::new();

    let request = match cli.cmd {
        Command::Send { from, to, amount } => client
            .post(format!("{node}/transaction/broadcast"))
            .json(&TxIn {
                amount,
                sender: from,
                recipient: to,
            }),
        Command::Mine => client.get(format!("{node}/mine")),
        Command::Consensus => client.get(format!("{node}/consensus")),
        Command::Register { url } => client
            .post(format!("{node}/register-and-broadcast-node"))
            .json(&RegisterIn { new_node_url: url }),
        Command::Chain => client.get(format!("{node}/blockchain")),
        Command::Block { hash } => client.get(format!("{node}/block/{hash}")),
        Command::Tx { id } => client.get(format!("{node}/transaction/{id}")),
        Command::Address { address } => client.get(format!("{node}/address/{address}")),
    };

    let res = request.send().await?;
    let status = res.status();
    debug!(%status, "response received");
    let body: Value = res.json().await?;
    println!("status: {}", status);
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
