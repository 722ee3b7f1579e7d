use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use transdb_common::Topology;
use transdb_server::{Server, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "transdb-server")]
struct Args {
    /// This node's identifier; must match an entry in the topology file's `nodes` list.
    #[arg(long)]
    node_id: String,

    /// Path to a JSON file containing the cluster Topology.
    #[arg(long)]
    topology: std::path::PathBuf,

    /// Timeout for a single proxied peer call, in milliseconds.
    #[arg(long, default_value_t = transdb_server::config::DEFAULT_PROXY_TIMEOUT.as_millis() as u64)]
    proxy_timeout_ms: u64,

    /// Number of permits in the DAO pool bounding concurrent local work.
    #[arg(long, default_value_t = transdb_server::config::DEFAULT_DAO_POOL_SIZE)]
    dao_pool_size: usize,

    /// Number of permits in the proxy pool bounding concurrent outbound peer calls.
    #[arg(long, default_value_t = transdb_server::config::DEFAULT_PROXY_POOL_SIZE)]
    proxy_pool_size: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let topology_json = std::fs::read_to_string(&args.topology)?;
    let nodes: Vec<String> = serde_json::from_str::<RawTopology>(&topology_json)?.nodes;
    let topology = Topology::new(nodes, args.node_id)?;

    let address: SocketAddr = topology.local_node.parse()?;

    let mut config = ServerConfig::new(address, topology);
    config.proxy_timeout = Duration::from_millis(args.proxy_timeout_ms);
    config.dao_pool_size = args.dao_pool_size;
    config.proxy_pool_size = args.proxy_pool_size;

    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

    // Print "Listening on <addr>" once the server signals it is bound.
    tokio::spawn(async move {
        if let Ok(addr) = ready_rx.await {
            println!("Listening on {}", addr);
        }
    });

    Server::new(config).run(ready_tx).await?;
    Ok(())
}

#[derive(serde::Deserialize)]
struct RawTopology {
    nodes: Vec<String>,
}
