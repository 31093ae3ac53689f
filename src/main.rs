//! Learou - Personal Learning and Knowledge Tracker
//!
//! Entry point for the `learou` binary: serves the web interface and manages
//! the database.

mod cli;

use clap::{Parser, Subcommand};
use learou_core::{error::Result, LearouConfig};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

use cli::config::ConfigAction;
use cli::helpers::get_db_path;

#[derive(Parser)]
#[command(name = "learou")]
#[command(about = "Personal learning and knowledge tracker", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level (overrides log_level in the config file)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Database path (overrides LEAROU_DB_PATH env var, config and default)
    #[arg(long, global = true)]
    db_path: Option<String>,

    /// Config file (defaults to ./learou.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Server address (overrides server.addr)
        #[arg(long)]
        addr: Option<String>,
    },

    /// Create the database and apply migrations
    Init,

    /// Create the base task, bibliography and project lookup records
    Seed,

    /// List registered entity kinds
    Kinds {
        /// Also print the named routes of each kind
        #[arg(long)]
        routes: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

fn init_tracing(log_level: &str) {
    let level = match log_level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Our crates at the chosen level, noisy dependencies at warn
    let filter = EnvFilter::new(format!(
        "learou={level},learou_core={level},tower_http={level},libsql=warn,hyper=warn",
        level = level.as_str().to_lowercase()
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = LearouConfig::load(cli.config.as_deref())?;

    let log_level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    init_tracing(&log_level);

    debug!("Learou v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve { addr } => {
            let db_path = get_db_path(cli.db_path, &config);
            cli::serve::handle(db_path, addr, &config).await
        }
        Commands::Init => cli::init::handle(get_db_path(cli.db_path, &config)).await,
        Commands::Seed => cli::seed::handle(get_db_path(cli.db_path, &config)).await,
        Commands::Kinds { routes } => cli::kinds::handle(routes),
        Commands::Config { action } => cli::config::handle(action, &config, cli.db_path),
    }
}
