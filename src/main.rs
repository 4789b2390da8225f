//! Manifold daemon - multiplexes JSON-RPC sessions over TCP and serves the
//! pipe + topic fan-out engine.
//!
//! This is the binary entry point. See the `manifold` library for the core
//! functionality.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use manifold::{server, Broker, UserRegistry, DEFAULT_PIPE_CAPACITY};
use mimalloc::MiMalloc;
use serde_json::Value;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Multi-tenant JSON-RPC message bus daemon.
#[derive(Parser, Debug)]
#[command(name = "manifold", version, about)]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:1717")]
    bind: String,

    /// Password for the seeded `root` user (`@admin` on every prefix).
    #[arg(long, default_value = "root")]
    root_pass: String,

    /// Default capacity for pipes created without an explicit length.
    #[arg(long, default_value_t = DEFAULT_PIPE_CAPACITY)]
    default_pipe_length: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let users = Arc::new(UserRegistry::new());
    let admin: manifold::TagMap = [("@admin".to_owned(), Value::Bool(true))]
        .into_iter()
        .collect();
    users.ensure("root", &cli.root_pass, "", &admin)?;
    log::info!("[main] seeded root user");

    let broker = Arc::new(Broker::with_default_capacity(
        users,
        cli.default_pipe_length.max(1),
    ));
    server::run(broker, &cli.bind).await
}
