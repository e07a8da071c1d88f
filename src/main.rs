//! Gridlock - Distributed Game Session Coordinator
//!
//! Runs one coordinator process: a TCP front end for the session
//! protocol, backed by Redis for seat leases, move mutexes, and
//! cross-process state replication.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gridlock::config::GridlockConfig;
use gridlock::coord::{CoordStore, LockManager, RedisStore, Replicator};
use gridlock::error::Result;
use gridlock::game::SessionRegistry;
use gridlock::server::{GameServer, SessionServer};

/// Gridlock - Distributed Game Session Coordinator
#[derive(Parser)]
#[command(name = "gridlock")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "gridlock.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the coordinator
    Start,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "gridlock.toml")]
        output: PathBuf,

        /// Server id written into leases and replication messages
        #[arg(long, default_value = "server-3001")]
        server_id: String,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Start => run_start(cli.config).await,
        Commands::Init { output, server_id } => run_init(output, server_id),
        Commands::Validate => run_validate(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Start the coordinator process
async fn run_start(config_path: PathBuf) -> Result<()> {
    tracing::info!("Starting gridlock coordinator...");

    // Load configuration
    let config = match GridlockConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            tracing::error!("Please check that the config file exists and is valid TOML");
            return Err(e);
        }
    };
    let server_id = config.server_id();
    tracing::info!("Loaded configuration for server: {}", server_id);

    // Connect to the coordination store; a coordinator without its store
    // cannot guarantee anything, so this failure is fatal
    tracing::info!("Connecting to store at {}...", config.store.url);
    let store: Arc<dyn CoordStore> = match RedisStore::connect(&config.store).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!("Failed to connect to store: {}", e);
            tracing::error!("  URL: {}", config.store.url);
            tracing::error!("Please check that the store is running and reachable");
            return Err(e);
        }
    };
    tracing::info!("Store connection established");

    let registry = Arc::new(SessionRegistry::new(config.cleanup_delay()));
    let locks = Arc::new(LockManager::new(
        Arc::clone(&store),
        server_id.clone(),
        config.lock_ttl(),
        config.lock_renewal_interval(),
        config.mutex_ttl(),
    ));
    let replicator = Arc::new(Replicator::new(
        store,
        config.store.channel.clone(),
        server_id.clone(),
    ));

    // Replication loop runs for the process lifetime; the store client
    // reconnects its subscription internally
    let replication_registry = Arc::clone(&registry);
    let replication = Arc::clone(&replicator);
    let replication_handle = tokio::spawn(async move {
        if let Err(e) = replication.run(replication_registry).await {
            tracing::error!("Replication loop ended: {}", e);
        }
    });

    let handler = Arc::new(SessionServer::new(
        server_id,
        registry,
        locks,
        replicator,
        config.game.default_game_id.clone(),
    ));
    let server = GameServer::new(config.server.bind_address.clone(), handler);

    tokio::select! {
        result = server.start() => {
            if let Err(e) = result {
                tracing::error!("Game server error: {}", e);
                replication_handle.abort();
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            server.stop();
        }
    }

    replication_handle.abort();
    tracing::info!("Gridlock shutdown complete");
    Ok(())
}

/// Initialize configuration file
fn run_init(output: PathBuf, server_id: String) -> Result<()> {
    let config_content = format!(
        r#"# Gridlock Configuration
# Generated configuration file

[server]
bind_address = "0.0.0.0:3001"
id = "{server_id}"

[store]
url = "redis://127.0.0.1:6379"
channel = "game_updates"
lock_ttl_secs = 30
lock_renewal_interval_ms = 10000
max_reconnect_attempts = 10
reconnect_base_delay_ms = 100
reconnect_max_delay_ms = 3000

[game]
mutex_ttl_secs = 5
cleanup_delay_ms = 30000
default_game_id = "default"

[logging]
level = "info"
format = "pretty"
"#
    );

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to point at your Redis instance.");
    println!("Then start with: gridlock start --config {}", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match GridlockConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Server ID: {}", config.server_id());
            println!("  Bind Address: {}", config.server.bind_address);
            println!("  Store URL: {}", config.store.url);
            println!("  Channel: {}", config.store.channel);
            println!("  Seat Lease TTL: {}s", config.store.lock_ttl_secs);
            println!("  Mutex TTL: {}s", config.game.mutex_ttl_secs);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}
