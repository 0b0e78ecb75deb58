//! Command-line front end.
//!
//! ```text
//! fabric-client -c client.toml invoke [--wait] <fn> [args..]
//! fabric-client -c client.toml query <fn> [args..]
//! fabric-client -c client.toml height
//! fabric-client -c client.toml info
//! fabric-client -c client.toml orderers
//! fabric-client -c client.toml block <number>
//! fabric-client -c client.toml tx <tx-id>
//! fabric-client -c client.toml listen [--filtered] [--peer <name>] [--from oldest|newest|<n>] [--to <n>]
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use fabric_client::config::load_config;
use fabric_client::events::StartPosition;
use fabric_client::lifecycle::signals::wait_for_signal;
use fabric_client::observability::{logging, metrics};
use fabric_client::transport::DeliverKind;
use fabric_client::{FabricClient, Shutdown};

#[derive(Parser)]
#[command(name = "fabric-client")]
#[command(about = "Submit, query and follow transactions on a permissioned ledger", long_about = None)]
struct Cli {
    /// Configuration file (TOML).
    #[arg(short, long, default_value = "client.toml")]
    config: PathBuf,

    /// Channel; defaults to `channel.name` from the configuration.
    #[arg(long, global = true)]
    channel: Option<String>,

    /// Chaincode; defaults to `channel.chaincode` from the configuration.
    #[arg(long, global = true)]
    chaincode: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Endorse and submit a transaction
    Invoke {
        /// Wait for the commit status
        #[arg(long)]
        wait: bool,
        /// Function name followed by its arguments
        #[arg(required = true)]
        args: Vec<String>,
    },
    /// Evaluate a chaincode function without ordering
    Query {
        #[arg(required = true)]
        args: Vec<String>,
    },
    /// Print the ledger height
    Height,
    /// Print height and head block hashes
    Info,
    /// Check connectivity to every ordering node of the channel
    Orderers,
    /// Print one block
    Block { number: u64 },
    /// Print one transaction with its validation code
    Tx { tx_id: String },
    /// Follow blocks until interrupted
    Listen {
        /// Filtered blocks (ids and validation codes only)
        #[arg(long)]
        filtered: bool,
        /// Event peer by name; defaults to the first configured
        #[arg(long)]
        peer: Option<String>,
        /// `oldest`, `newest` or a block number (negative means newest)
        #[arg(long, default_value = "newest", allow_hyphen_values = true)]
        from: StartPosition,
        /// Last block; the listener stops after delivering it
        #[arg(long)]
        to: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init(&config.observability.log_level);
    tracing::info!(config = %cli.config.display(), "fabric-client v0.1.0 starting");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let channel = cli.channel.clone().unwrap_or_else(|| config.channel.name.clone());
    let client = FabricClient::from_config(config)?;
    let invocation = |args: Vec<String>| {
        let mut invocation = client.default_invocation(args);
        invocation.channel = channel.clone();
        if let Some(chaincode) = &cli.chaincode {
            invocation.chaincode = chaincode.clone();
        }
        invocation
    };

    let shutdown = Shutdown::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    match cli.command {
        Commands::Invoke { wait: false, args } => {
            let result = client.invoke(&invocation(args)).await?;
            println!("{} {} (orderer {})", result.tx_id, result.status_name(), result.orderer);
        }
        Commands::Invoke { wait: true, args } => {
            let service = client
                .start_status_service(&channel, shutdown.child_token())
                .await?;
            let outcome = client.invoke_and_wait(&invocation(args)).await;
            service.stop().await;

            let outcome = outcome?;
            match outcome.status {
                Some(status) => println!(
                    "{} {} in block {}",
                    status.tx_id,
                    status.validation_name(),
                    status.block_number
                ),
                None => println!(
                    "{} refused by ordering service: {}",
                    outcome.submit.tx_id,
                    outcome.submit.status_name()
                ),
            }
        }
        Commands::Query { args } => {
            let payload = client.query(&invocation(args)).await?;
            println!("{}", String::from_utf8_lossy(&payload));
        }
        Commands::Height => {
            println!("{}", client.chain_height(&channel).await?);
        }
        Commands::Info => {
            let info = client.chain_info(&channel).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Orderers => {
            let health = client.check_orderers(&channel).await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
            if health.iter().any(|h| !h.connected) {
                return Err("one or more ordering nodes are unreachable".into());
            }
        }
        Commands::Block { number } => {
            let record = client.block_by_number(&channel, number).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Tx { tx_id } => {
            let record = client.transaction_by_id(&channel, &tx_id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Listen {
            filtered,
            peer,
            from,
            to,
        } => {
            let kind = if filtered {
                DeliverKind::Filtered
            } else {
                DeliverKind::Full
            };
            let start = match to {
                Some(stop) => from.until(stop)?,
                None => from,
            };
            let (tx, mut rx) = mpsc::channel(64);
            let handle = client
                .listen(
                    &channel,
                    peer.as_deref(),
                    kind,
                    start,
                    tx,
                    shutdown.child_token(),
                )
                .await?;

            while let Some(record) = rx.recv().await {
                println!("{}", serde_json::to_string(&record)?);
            }
            let exit = handle.join().await;
            tracing::info!(
                exit = ?exit,
                interrupted = shutdown.is_triggered(),
                "Listener finished"
            );
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
