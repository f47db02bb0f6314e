use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bookfeed::config::{default_config_path, ResolvedConfig};
use bookfeed::market_data::{
    DataDomain, DataSourceConfigStore, ExternalDataSourceConfig, JsonFileConfigStore,
    MarketDataService, RefreshScheduler, SourceKind,
};
use bookfeed::models::{Account, AccountTree};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "bookfeed")]
#[command(about = "Market data quotes and account valuation")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Show current configuration
    Config,

    /// Print the latest snapshot for a domain
    Quote {
        /// crypto, stock or exchange-rate
        domain: DataDomain,
        symbols: Vec<String>,
    },

    /// Select the provider for a domain
    SetSource {
        domain: DataDomain,
        provider: String,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        base_currency: Option<String>,
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// none, system or a proxy URL
        #[arg(long)]
        proxy: Option<String>,
        /// Refresh hint for `watch`, e.g. "10m"
        #[arg(long)]
        update_frequency: Option<String>,
        #[arg(long)]
        skip_tls_verify: bool,
    },

    /// Value the accounts in a JSON file
    Value {
        /// JSON array of accounts
        accounts: PathBuf,
        /// Overrides the configured default currency
        #[arg(long)]
        currency: Option<String>,
    },

    /// Keep every configured domain refreshed until interrupted
    Watch,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = ResolvedConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;

    let store: Arc<dyn DataSourceConfigStore> = Arc::new(JsonFileConfigStore::new(&config.data_dir));
    let service = MarketDataService::new(Arc::clone(&store))
        .with_freshness_window(config.freshness_window)
        .with_user_agent(config.user_agent.clone());
    service.seed_defaults(config.sources.to_configs()).await?;

    match cli.command {
        Some(Command::Config) => {
            println!("Config file: {}", config_path.display());
            println!("Data directory: {}", config.data_dir.display());
            println!("Default currency: {}", config.default_currency);
            println!(
                "Freshness window: {}",
                bookfeed::duration::format_duration(config.freshness_window)
            );
            for row in store.list().await? {
                println!("{}: {}", row.domain, row.provider);
            }
        }
        Some(Command::Quote { domain, symbols }) => {
            let snapshot = service.latest(domain, &symbols).await?;
            print_json(snapshot.as_ref())?;
        }
        Some(Command::SetSource {
            domain,
            provider,
            api_key,
            base_currency,
            timeout_ms,
            proxy,
            update_frequency,
            skip_tls_verify,
        }) => {
            let mut row = ExternalDataSourceConfig::new(domain, provider);
            row.api_key = api_key;
            row.base_currency = base_currency;
            if let Some(timeout_ms) = timeout_ms {
                row.request_timeout_ms = timeout_ms;
            }
            row.proxy = proxy;
            row.update_frequency = update_frequency;
            row.skip_tls_verify = skip_tls_verify;

            let kind = SourceKind::from_config(&row)?;
            service.save_config(row).await?;
            println!("{domain}: {}", kind.provider_id());
        }
        Some(Command::Value { accounts, currency }) => {
            let content = std::fs::read_to_string(&accounts)
                .with_context(|| format!("Failed to read {}", accounts.display()))?;
            let accounts: Vec<Account> = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", accounts.display()))?;
            let tree = AccountTree::build(accounts)?;
            let currency = currency.unwrap_or_else(|| config.default_currency.clone());
            print_json(&service.valuate(&tree, &currency).await)?;
        }
        Some(Command::Watch) => {
            let scheduler = RefreshScheduler::new(Arc::new(service), config.watchlist.clone());
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received, shutting down");
                    let _ = shutdown_tx.send(true);
                }
            });
            scheduler.run(shutdown_rx).await;
        }
        None => {
            println!("bookfeed - market data for bookkeeping");
            println!("Config: {}", config_path.display());
            println!("Data directory: {}\n", config.data_dir.display());
            println!("Run 'bookfeed --help' for commands.");
        }
    }

    Ok(())
}
