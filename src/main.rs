use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use universe_builder::config::{default_config_path, Config};
use universe_builder::devnet::{self, AuthConfig};
use universe_builder::discovery::OwnershipDiscovery;
use universe_builder::ledger::{LedgerService, MemoryLedger, RpcClient};
use universe_builder::models::{Address, GalaxyDef, ObjectId, UniverseRef};
use universe_builder::plan::{MoveTarget, OperationSequence, Planner};
use universe_builder::reconstruct::{Lookup, Reconstructor};
use universe_builder::submit::Coordinator;
use universe_builder::tree_render::{render_universe, summarize};

/// Package id the devnet serves when none is configured.
const DEVNET_PACKAGE: u128 = 0x2a;

#[derive(Parser)]
#[command(name = "ucli")]
#[command(about = "Plan, launch and inspect universes on a ledger")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, conflicts_with = "no_config")]
    config: Option<PathBuf>,

    /// Ignore config files and read settings from the environment only
    #[arg(long, global = true)]
    no_config: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the operation batch for a galaxy definition without submitting it
    Plan {
        /// JSON galaxy definition
        #[arg(short, long)]
        galaxy: PathBuf,

        /// Target universe id, or "new"
        #[arg(short, long, default_value = "new")]
        into: UniverseRef,
    },
    /// Build and submit a galaxy definition
    Launch {
        #[arg(short, long)]
        galaxy: PathBuf,

        #[arg(short, long, default_value = "new")]
        into: UniverseRef,
    },
    /// Create an empty universe
    NewUniverse,
    /// Show a universe as a tree
    Show { id: ObjectId },
    /// List universes created by one or more accounts
    List {
        /// Account to scan; repeatable. Defaults to the configured sender
        #[arg(short, long)]
        owner: Vec<Address>,
    },
    /// Print the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        write: bool,
    },
    /// Serve an in-memory ledger over JSON-RPC
    Devnet {
        #[arg(short, long, default_value = "9000")]
        port: u16,
    },
}

/// Initialize tracing with output to stderr (for command output) or stdout (for the devnet)
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "universe_builder=info,tower_http=info".into()),
    );

    if use_stderr {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    if cli.no_config {
        return Config::from_env();
    }
    match cli.config.as_deref() {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn read_galaxy(path: &Path) -> Result<GalaxyDef> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read galaxy definition {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse galaxy definition {}", path.display()))
}

fn coordinator(
    config: &Config,
    ledger: Arc<dyn LedgerService>,
    target: MoveTarget,
) -> Result<Coordinator> {
    let reconstructor = Reconstructor::new(ledger.clone(), target);
    Ok(Coordinator::new(ledger, reconstructor, config.sender()?))
}

async fn submit_and_report(coordinator: &Coordinator, sequence: &OperationSequence) -> Result<()> {
    let result = coordinator.submit(sequence).await?;
    println!("Committed {}", result.receipt.digest);
    match (&result.universe, &result.snapshot) {
        (_, Some(universe)) => print!("{}", render_universe(universe)),
        (Some(id), None) => println!("Universe {} (refresh failed)", id),
        (None, None) => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let use_stderr = !matches!(cli.command, Commands::Devnet { .. });
    init_tracing(use_stderr);

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Plan { galaxy, into } => {
            let planner = Planner::new(config.target()?);
            let sequence = planner.build(into, read_galaxy(&galaxy)?)?;
            print!("{}", sequence);
        }
        Commands::Launch { galaxy, into } => {
            let target = config.target()?;
            let sequence = Planner::new(target.clone()).build(into, read_galaxy(&galaxy)?)?;
            let ledger: Arc<dyn LedgerService> = Arc::new(RpcClient::from_config(&config));
            submit_and_report(&coordinator(&config, ledger, target)?, &sequence).await?;
        }
        Commands::NewUniverse => {
            let target = config.target()?;
            let sequence = Planner::new(target.clone()).build_universe()?;
            let ledger: Arc<dyn LedgerService> = Arc::new(RpcClient::from_config(&config));
            submit_and_report(&coordinator(&config, ledger, target)?, &sequence).await?;
        }
        Commands::Show { id } => {
            let ledger: Arc<dyn LedgerService> = Arc::new(RpcClient::from_config(&config));
            let reconstructor = Reconstructor::new(ledger, config.target()?);
            match reconstructor.fetch(&id).await? {
                Lookup::Found(universe) => print!("{}", render_universe(&universe)),
                Lookup::NotFound(id) => anyhow::bail!("Universe {} not found", id),
                Lookup::Invalid { id, reason } => {
                    anyhow::bail!("Object {} is not a universe: {}", id, reason)
                }
            }
        }
        Commands::List { owner } => {
            let owners = if owner.is_empty() {
                vec![config.sender()?]
            } else {
                owner
            };
            let target = config.target()?;
            let ledger: Arc<dyn LedgerService> = Arc::new(RpcClient::from_config(&config));
            let discovery = OwnershipDiscovery::new(ledger.clone(), target.clone())
                .with_paging(config.page_limit, config.max_pages);
            let reconstructor = Reconstructor::new(ledger, target);

            let mut ids: Vec<ObjectId> =
                discovery.discover_many(&owners).await.into_iter().collect();
            ids.sort();
            if ids.is_empty() {
                println!("No universes found");
            }
            for id in ids {
                match reconstructor.fetch(&id).await {
                    Ok(Lookup::Found(universe)) => println!("{}", summarize(&universe)),
                    Ok(_) => println!("{}  (unavailable)", id.short()),
                    Err(e) => println!("{}  (error: {})", id.short(), e),
                }
            }
        }
        Commands::Config { write } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if write {
                let path = match cli.config {
                    Some(path) => path,
                    None => default_config_path()?,
                };
                config.save_to(&path)?;
                eprintln!("Wrote {}", path.display());
            }
        }
        Commands::Devnet { port } => {
            let package = config
                .package_id
                .clone()
                .unwrap_or_else(|| ObjectId::from_u128(DEVNET_PACKAGE));
            let target = MoveTarget::new(package, config.module.clone());
            let ledger: Arc<dyn LedgerService> = Arc::new(MemoryLedger::new(target.clone()));
            let auth = AuthConfig {
                api_key: config.api_key.clone(),
            };
            let app = devnet::create_router(ledger, auth);

            let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
            tracing::info!(
                package = %target.package,
                module = %target.module,
                "Devnet listening on http://127.0.0.1:{}",
                port
            );

            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
