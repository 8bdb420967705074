use dtask_cluster::cluster::handlers::status_routes;
use dtask_cluster::cluster::node::ClusterNode;
use dtask_cluster::config::ClusterConfig;
use dtask_cluster::membership::directory::NodeDirectory;
use dtask_cluster::transport::http::{HttpTransport, frame_routes};
use dtask_cluster::transport::hybrid::HybridTransport;
use dtask_cluster::transport::udp::UdpTransport;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Usage: {} [--config <file.toml>] [--bind <addr:port>] [--id <node-id>]", args[0]);
        eprintln!("Example: {} --config node-a.toml", args[0]);
        eprintln!("Example: {} --bind 127.0.0.1:5001 --id node-b", args[0]);
        std::process::exit(1);
    }

    let mut config_path: Option<PathBuf> = None;
    let mut bind_addr: Option<SocketAddr> = None;
    let mut node_id: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--bind" if i + 1 < args.len() => {
                bind_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--id" if i + 1 < args.len() => {
                node_id = Some(args[i + 1].clone());
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let mut config = match &config_path {
        Some(path) => ClusterConfig::load(path)?,
        None => ClusterConfig::default(),
    };
    if let Some(bind) = bind_addr {
        config.node.bind = bind;
    }
    if node_id.is_some() {
        config.node.id = node_id;
    }

    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level())
        .init();

    let local = config.local_node();
    let peers = config.peer_nodes();
    tracing::debug!("Effective config: {}", serde_json::to_string(&config)?);

    tracing::info!("Starting node {:?} on {}", local.id, local.udp_addr);
    if peers.is_empty() {
        tracing::info!("No peers configured, running single-node");
    } else {
        tracing::info!("Peers: {:?}", peers.iter().map(|p| &p.id).collect::<Vec<_>>());
    }

    // 1. Directory and transports:
    let directory = NodeDirectory::new(local.clone(), peers);
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

    let udp = UdpTransport::bind(local.udp_addr, directory.clone()).await?;
    udp.spawn_receiver(inbox_tx.clone());

    let http = HttpTransport::new(
        directory.clone(),
        Duration::from_millis(config.protocol.http_timeout_ms),
    );
    let transport = HybridTransport::new(udp, http, config.protocol.datagram_limit);

    // 2. Node:
    let node = ClusterNode::new(config, directory, transport)?;
    node.start(inbox_rx);

    // 3. HTTP Router:
    let app = frame_routes(inbox_tx).merge(status_routes(node.clone()));

    // 4. Spawn stats reporter:
    let stats_node = node.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            let stats = stats_node.stats();
            tracing::info!(
                "Protocol stats: {} requests ({} resent, {} extended), {} acks ({} resent), {} executed, {} entries",
                stats.requests_sent,
                stats.request_retransmits,
                stats.request_wait_extensions,
                stats.acks_sent,
                stats.ack_retransmits,
                stats.calls_executed,
                stats_node.store().len()
            );
        }
    });

    // 5. Start HTTP server:
    tracing::info!("HTTP server listening on {}", local.http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(local.http_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
