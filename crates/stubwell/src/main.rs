//! Stubwell - Programmable HTTP Stub Server
//!
//! # Usage
//!
//! ```bash
//! # Run with the default config file (stubwell.yaml)
//! stubwell
//!
//! # Explicit config, overriding the listen port
//! stubwell --config deploy/stubwell.yaml --port 8080
//! ```

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use stubwell::config::Config;
use stubwell::engine::StubEngine;
use stubwell::registry::PatternRegistry;
use stubwell::seed::seed_stubs;
use stubwell::server::{AppState, StubServer};
use stubwell::storage::{create_store, Backend};
use stubwell::synth::Signer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stubwell")]
#[command(author, version, about = "Programmable HTTP stub server")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(
        short,
        long,
        default_value = "stubwell.yaml",
        env = "STUBWELL_CONFIG"
    )]
    config: String,

    /// Override the configured listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;
    if let Some(port) = args.port {
        config.listen.port = port;
    }

    let backend = match config.storage.backend.as_str() {
        "inmemory" => Backend::InMemory,
        _ => Backend::Redis,
    };
    let store = create_store(backend, &config.storage.url, config.storage.pool_size)
        .context("Failed to create storage backend")?;
    // The store is the source of truth; refuse to serve without it.
    store
        .ping()
        .context("Storage is unreachable; refusing to start")?;

    if let Some(ref seed_file) = config.seed_file {
        match seed_stubs(&store, seed_file) {
            Ok(count) => info!("Seeded {count} stubs from {}", seed_file.display()),
            Err(e) => error!("Seeding skipped: {e:#}"),
        }
    }

    let registry = Arc::new(PatternRegistry::new(Arc::clone(&store)));
    let loaded = registry
        .load()
        .context("Failed to load pattern stubs from storage")?;
    info!("Loaded {loaded} pattern stubs");

    let signer = Signer::new(config.signing.resolve_secret());
    let engine = StubEngine::new(Arc::clone(&store), Arc::clone(&registry), signer);

    let addr: SocketAddr = format!("{}:{}", config.listen.host, config.listen.port)
        .parse()
        .context("Invalid listen address")?;

    let state = Arc::new(AppState {
        config,
        store,
        registry,
        engine,
    });

    StubServer::new(addr, state).run().await
}
