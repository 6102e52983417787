use clap::Parser;
use log::{error, info};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use eth_address_indexer::api::ApiServer;
use eth_address_indexer::blockchain::{BlockIndexer, BlockPoller, RpcClient};
use eth_address_indexer::config::{AppConfig, DEFAULT_CONFIG_FILE};
use eth_address_indexer::logging::{init_logging, ErrorLogger, LogContext};
use eth_address_indexer::state::IndexState;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Indexes Ethereum transactions per address and streams them over HTTP")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to $CONFIG_FILE, then config.toml)
    #[arg(long)]
    config: Option<String>,

    /// JSON-RPC endpoint of the node
    #[arg(long)]
    rpc_url: Option<String>,

    /// HTTP gateway port
    #[arg(long)]
    port: Option<u16>,

    /// Print a sample configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn load_config(args: &Args) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let path = args
        .config
        .clone()
        .or_else(|| std::env::var("CONFIG_FILE").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

    let mut config = AppConfig::load_with_path(&path)?;
    if let Some(rpc_url) = &args.rpc_url {
        config.rpc.endpoint = rpc_url.clone();
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.print_config {
        println!("{}", AppConfig::generate_sample_config()?);
        return Ok(());
    }

    let config = load_config(&args)?;
    init_logging(&config.logging)?;

    info!("Starting Ethereum address indexer against {}", config.rpc.endpoint);

    let state = IndexState::new(config.subscriptions.clone());
    let source = RpcClient::new(&config.rpc)?;
    let (blocks_tx, blocks_rx) = mpsc::channel(config.polling.block_queue_capacity);
    let shutdown = CancellationToken::new();

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received shutdown signal"),
                Err(err) => error!("Unable to listen for shutdown signal: {}", err),
            }
            shutdown.cancel();
        });
    }

    let indexer = tokio::spawn(BlockIndexer::new(state.clone()).run(blocks_rx, shutdown.clone()));
    let poller = tokio::spawn(
        BlockPoller::new(source, config.polling.clone(), blocks_tx).run(shutdown.clone()),
    );

    let served = ApiServer::new(state, config.api.clone())
        .serve(shutdown.clone())
        .await;
    shutdown.cancel();

    if let Err(e) = &served {
        ErrorLogger::log_error(e, Some(LogContext::new("main", "serve")));
    }

    let _ = tokio::join!(poller, indexer);
    info!("Indexer shut down");

    served.map_err(Into::into)
}
