//! Engram MCP server
//!
//! Persistent memory for LLM hosts over stdio JSON-RPC:
//!
//! - Typed memories (facts, entities, conversations, reflections, code)
//! - Tiered storage with importance decay and access-driven promotion
//! - Hybrid retrieval (HNSW vector search + BM25, RRF fusion)
//! - Reflection consolidation over recent conversation excerpts
//! - Zero-downtime embedding model migration with quality gates
//!
//! The transport comes up immediately and serves the tool list from a static
//! schema table; backends and the embedding model load in a background
//! warming task, so hosts can enumerate tools within seconds even when the
//! model takes far longer to load.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use engram_core::{EngineBuilder, EngineConfig, EmbeddingRegistry, MemoryEngine, ServiceState};
use engram_mcp::protocol::stdio::StdioTransport;
use engram_mcp::server::McpServer;

/// Migration driver cadence.
const MIGRATION_DRIVE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(
    name = "engram-mcp",
    version,
    about = "Persistent memory service for LLM hosts (stdio JSON-RPC)"
)]
struct Cli {
    /// Custom data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// JSON config file (omitted fields take defaults)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .map_err(|e| anyhow::anyhow!("failed to load config {}: {e}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    Ok(config)
}

/// Register embedding providers. The local model is registered lazily from
/// the warming task because loading it can take tens of seconds.
fn register_providers(registry: &EmbeddingRegistry, config: &EngineConfig) -> anyhow::Result<()> {
    if let Some(url) = &config.remote_embedding_url {
        let remote = engram_core::RemoteEmbedder::new(
            url,
            &config.embedding_model,
            config.embedding_dimension,
        )?;
        registry.register(Arc::new(remote));
        info!(url, model = %config.embedding_model, "remote embedding provider registered");
        return Ok(());
    }

    #[cfg(feature = "embeddings")]
    {
        let local = engram_core::LocalEmbedder::new()?;
        registry.register(Arc::new(local));
        info!("local embedding provider registered");
        Ok(())
    }

    #[cfg(not(feature = "embeddings"))]
    {
        anyhow::bail!(
            "no embedding provider available: enable the 'embeddings' feature or set \
             remote_embedding_url"
        )
    }
}

/// Warm the engine and start the background loops.
async fn warm_and_spawn_loops(engine: Arc<MemoryEngine>) {
    if let Err(e) = register_providers(engine.registry(), engine.config()) {
        error!("embedding provider setup failed: {}", e);
        engine.mark_failed(&e.to_string());
        return;
    }

    if let Err(e) = engine.warm().await {
        error!("engine warming failed: {}", e);
        return;
    }

    // Temporal cycle: decay, tier transitions, capacity bounds, retention.
    {
        let engine = Arc::clone(&engine);
        let period = Duration::from_secs(engine.config().background.temporal_period_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                match engine.run_temporal_cycle().await {
                    Ok(result) => {
                        if result.decayed + result.demoted + result.promoted + result.expired > 0 {
                            info!(
                                decayed = result.decayed,
                                demoted = result.demoted,
                                promoted = result.promoted,
                                expired = result.expired,
                                duration_ms = result.duration_ms,
                                "temporal cycle complete"
                            );
                        }
                    }
                    Err(e) => warn!("temporal cycle failed: {}", e),
                }
            }
        });
    }

    // Migration driver: gates + GRADUAL batches.
    if engine.config().migration.enabled {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(MIGRATION_DRIVE_PERIOD);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = engine.drive_migration().await {
                    warn!("migration driver cycle failed: {}", e);
                }
            }
        });
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging to stderr; stdout carries JSON-RPC frames.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("engram-mcp v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let engine = Arc::new(EngineBuilder::new(config).build());

    // The transport must be able to enumerate tools within seconds even when
    // the embedding model takes much longer to load, so warming runs in the
    // background while the stdio loop starts immediately.
    tokio::spawn(warm_and_spawn_loops(Arc::clone(&engine)));

    let server = McpServer::new(Arc::clone(&engine));
    let transport = StdioTransport::new();

    info!("serving on stdio");
    if let Err(e) = transport.run(server).await {
        error!("transport error: {}", e);
    }

    // stdin closed: drain in-flight work and persist state.
    let failed = engine.state() == ServiceState::Failed;
    engine.drain().await;
    if failed {
        std::process::exit(2);
    }
}
