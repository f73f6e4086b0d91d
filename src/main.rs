use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gridwatch::config::Config;
use gridwatch::models::AddressKey;
use gridwatch::monitor::{LifecycleEngine, Notifier, OutageMonitor, OutageTracker};
use gridwatch::provider::ProviderClient;
use gridwatch::storage::{OutageStore, SqliteOutageStore};
use gridwatch::transport::TelegramTransport;
use gridwatch::utils::retry::RetryConfig;

#[derive(Parser)]
#[command(
    name = "gridwatch",
    version,
    about = "Electric utility outage monitor with Telegram notifications",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll subscribed addresses and deliver outage notifications
    Monitor,

    /// Refresh the local city directory from the provider
    Sync {
        /// Also sync the street directory for this city
        #[arg(long)]
        city_id: Option<i64>,
    },

    /// Search the provider's city directory
    Cities {
        /// City name prefix
        query: String,
    },

    /// Search streets within a city
    Streets {
        /// Provider city identifier
        city_id: i64,

        /// Street name prefix
        query: String,
    },

    /// Subscribe a chat to outage notifications for an address
    Subscribe {
        /// Telegram chat identifier
        subscriber_id: i64,

        /// Provider city identifier
        city_id: i64,

        /// Provider street identifier
        street_id: i64,

        /// House number
        house_num: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;

    tracing::info!("gridwatch starting");

    match cli.command {
        Commands::Monitor => {
            monitor(&config).await?;
        }

        Commands::Sync { city_id } => {
            tracing::info!(city_id = ?city_id, "Starting sync command");
            sync(&config, city_id).await?;
        }

        Commands::Cities { query } => {
            cities(&config, &query).await?;
        }

        Commands::Streets { city_id, query } => {
            streets(&config, city_id, &query).await?;
        }

        Commands::Subscribe {
            subscriber_id,
            city_id,
            street_id,
            house_num,
        } => {
            subscribe(&config, subscriber_id, city_id, street_id, house_num).await?;
        }
    }

    tracing::info!("gridwatch completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("gridwatch=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("gridwatch=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<SqliteOutageStore>> {
    let store = SqliteOutageStore::new(&config.database.sqlite_path)
        .with_context(|| format!("Failed to open {}", config.database.sqlite_path.display()))?;
    Ok(Arc::new(store))
}

fn build_provider(config: &Config) -> Result<Arc<ProviderClient>> {
    let provider = ProviderClient::with_config(
        &config.provider.base_url,
        config.provider.max_requests_per_second,
        config.request_timeout(),
        config.credential_ttl(),
    )
    .context("Failed to build provider client")?;
    Ok(Arc::new(provider))
}

async fn monitor(config: &Config) -> Result<()> {
    config
        .telegram
        .validate()
        .map_err(|e| anyhow::anyhow!("Telegram configuration invalid: {e}"))?;

    let store = open_store(config)?;
    let provider = build_provider(config)?;
    let transport = Arc::new(
        TelegramTransport::new(config.telegram.clone())
            .map_err(|e| anyhow::anyhow!("Failed to build Telegram transport: {e}"))?,
    );

    let tracker = Arc::new(OutageTracker::new());
    let engine = Arc::new(LifecycleEngine::new(
        Arc::clone(&provider),
        store.clone() as Arc<dyn OutageStore>,
        Notifier::new(transport),
        Arc::clone(&tracker),
        RetryConfig::new(config.monitor.persist_retries),
    ));

    let monitor = Arc::new(OutageMonitor::new(
        engine,
        store as Arc<dyn OutageStore>,
        tracker,
        config.poll_cycle_gap(),
        config.per_address_stagger(),
    ));

    let handle = {
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move { monitor.run().await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");
    monitor.stop();

    handle.await.context("Monitor task failed")?;
    Ok(())
}

async fn sync(config: &Config, city_id: Option<i64>) -> Result<()> {
    let store = open_store(config)?;
    let provider = build_provider(config)?;

    match city_id {
        Some(city_id) => {
            let streets = provider.fetch_streets(city_id, "").await?;
            for street in &streets {
                store.upsert_street(city_id, street).await?;
            }
            println!("Synced {} streets for city {city_id}", streets.len());
        }
        None => {
            let cities = provider.fetch_cities("").await?;
            for city in &cities {
                store.upsert_city(city).await?;
            }
            println!("Synced {} cities", cities.len());
        }
    }
    Ok(())
}

async fn cities(config: &Config, query: &str) -> Result<()> {
    let provider = build_provider(config)?;
    let cities = provider.fetch_cities(query).await?;

    if cities.is_empty() {
        println!("No cities match '{query}'");
        return Ok(());
    }
    for city in cities {
        match &city.district_name {
            Some(district) => println!("{:>8}  {} ({district})", city.id, city.name),
            None => println!("{:>8}  {}", city.id, city.name),
        }
    }
    Ok(())
}

async fn streets(config: &Config, city_id: i64, query: &str) -> Result<()> {
    let provider = build_provider(config)?;
    let streets = provider.fetch_streets(city_id, query).await?;

    if streets.is_empty() {
        println!("No streets match '{query}' in city {city_id}");
        return Ok(());
    }
    for street in streets {
        println!("{:>8}  {}", street.id, street.name);
    }
    Ok(())
}

async fn subscribe(
    config: &Config,
    subscriber_id: i64,
    city_id: i64,
    street_id: i64,
    house_num: i64,
) -> Result<()> {
    let store = open_store(config)?;

    let count = store.subscription_count(subscriber_id).await?;
    if count >= config.monitor.max_addresses_per_subscriber {
        anyhow::bail!(
            "Subscriber {subscriber_id} already has {count} addresses (limit {})",
            config.monitor.max_addresses_per_subscriber
        );
    }

    let key = AddressKey {
        city_id,
        street_id,
        house_num,
    };
    store.add_subscription(subscriber_id, key).await?;

    let label = store
        .address_label(key)
        .await
        .unwrap_or_else(|_| key.to_string());
    println!("Subscriber {subscriber_id} now watching {label}");
    Ok(())
}
