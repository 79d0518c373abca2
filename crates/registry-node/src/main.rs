// registry-node/src/main.rs
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "registry-node")]
#[command(about = "Validator stake registry node", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration
    Init {
        /// Data directory
        #[arg(long, default_value = "./data")]
        data_dir: String,
    },

    /// Run the block ticker
    Start {
        /// Configuration file path
        #[arg(short, long, default_value = "./data/config.toml")]
        config: PathBuf,

        /// Override data directory
        #[arg(long)]
        data_dir: Option<String>,

        /// Stop after this many blocks
        #[arg(short, long)]
        blocks: Option<u64>,
    },

    /// Replay a JSON operation script and print the outcome
    Simulate {
        /// Script file path
        #[arg(short, long)]
        script: PathBuf,
    },

    /// Apply a seeded random workload, checking invariants after every step
    Fuzz {
        #[arg(long, default_value = "0")]
        seed: u64,

        #[arg(long, default_value = "10000")]
        steps: usize,

        /// Top set capacity
        #[arg(long, default_value = "8")]
        capacity: usize,
    },

    /// Print the persisted registry
    Status {
        /// Configuration file path
        #[arg(short, long, default_value = "./data/config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "registry_node={level},stake_registry={level}",
                    level = log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Init { data_dir } => init_node(&data_dir)?,
        Commands::Start {
            config,
            data_dir,
            blocks,
        } => start_node(&config, data_dir, blocks).await?,
        Commands::Simulate { script } => simulate(&script)?,
        Commands::Fuzz {
            seed,
            steps,
            capacity,
        } => {
            let report = registry_node::fuzz::run(seed, steps, capacity)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Status { config } => show_status(&config)?,
    }

    Ok(())
}

fn init_node(data_dir: &str) -> anyhow::Result<()> {
    tracing::info!("Initializing node at {}", data_dir);
    std::fs::create_dir_all(data_dir)?;

    let config = registry_node::NodeConfig {
        data_dir: data_dir.to_string(),
        ..Default::default()
    };
    let path = PathBuf::from(data_dir).join("config.toml");
    config.to_file(&path)?;

    tracing::info!("Edit {} to configure your node", path.display());
    Ok(())
}

async fn start_node(
    config_path: &Path,
    data_dir_override: Option<String>,
    blocks: Option<u64>,
) -> anyhow::Result<()> {
    use registry_node::{Node, NodeConfig};

    tracing::info!("Loading configuration from {}", config_path.display());
    let mut config = NodeConfig::from_file(config_path)?;

    if let Some(data_dir) = data_dir_override {
        config.data_dir = data_dir;
    }

    let node = Node::new(config)?;
    node.run(blocks).await?;
    Ok(())
}

fn simulate(path: &Path) -> anyhow::Result<()> {
    let script = registry_node::Script::from_file(path)?;
    let outcome = script.run()?;

    let failures = outcome.failures().count();
    if failures > 0 {
        tracing::warn!("{} of {} steps rejected", failures, outcome.steps.len());
    }

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn show_status(config_path: &Path) -> anyhow::Result<()> {
    let config = registry_node::NodeConfig::from_file(config_path)?;
    let path = config.snapshot_path();

    if !path.exists() {
        tracing::info!("No snapshot at {}", path.display());
        return Ok(());
    }

    let state = registry_node::PersistedState::load(&path)?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}
