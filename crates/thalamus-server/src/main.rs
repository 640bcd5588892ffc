//! Thalamus server binary: loads config, assembles the node graph on the
//! reactor thread, and serves the RPC surface. `FmtSubscriber` init, plain
//! `#[tokio::main]` entry, `std::process::exit(1)` on unrecoverable
//! startup failure.

mod config;

use std::sync::Arc;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use thalamus_core::concurrent::WorkerPool;
use thalamus_core::{spawn_reactor, ReactorHandle};
use thalamus_proto::thalamus_server::ThalamusServer;
use thalamus_rpc::ThalamusService;

use config::Config;

#[derive(Parser, Debug)]
#[command(author, version, about = "Thalamus data-acquisition and routing server")]
struct Cli {
    /// Path to the TOML graph/server config.
    #[arg(long, default_value = "thalamus.toml")]
    config: String,

    /// Overrides `bind_addr` from the config file.
    #[arg(long)]
    bind_addr: Option<String>,

    /// Overrides `worker_threads` from the config file.
    #[arg(long)]
    worker_threads: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let mut config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("failed to load config {}: {e}", cli.config);
            std::process::exit(1);
        }
    };
    if let Some(bind_addr) = cli.bind_addr {
        config.bind_addr = bind_addr;
    }
    if let Some(worker_threads) = cli.worker_threads {
        config.worker_threads = Some(worker_threads);
    }

    let reactor: ReactorHandle = spawn_reactor();
    config.build_graph(&reactor);

    let worker_pool = Arc::new(WorkerPool::new(config.worker_threads.unwrap_or_else(num_cpus::get)));
    let service = ThalamusService::new(reactor, worker_pool);

    let addr = config.bind_addr.parse()?;
    info!("thalamus-server listening on {addr}");

    tonic::transport::Server::builder().add_service(ThalamusServer::new(service)).serve(addr).await?;

    Ok(())
}
