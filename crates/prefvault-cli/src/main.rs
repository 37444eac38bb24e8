mod cli;
mod config;
mod storage;
mod values;

use crate::cli::{ConfigCommand, KeyArgs};
use clap::Parser;
use color_eyre::{eyre::bail, Result};
use prefvault_core::storage::{KeyValueStore, TypedKey};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Entry point wiring the CLI to the encrypted store.
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        cli::Command::Version => print_version(),
        cli::Command::Health => run_health_check(&config).await?,
        cli::Command::Config(ConfigCommand::Init) => init_config(&config)?,
        cli::Command::Set { key, value } => run_set(&config, key, &value).await?,
        cli::Command::Get { key } => run_get(&config, key).await?,
        cli::Command::Remove { key } => run_remove(&config, key).await?,
        cli::Command::Contains { key } => run_contains(&config, key).await?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("prefvault {}", env!("CARGO_PKG_VERSION"));
}

/// Runs a quick health check of the encrypted storage path.
async fn run_health_check(config: &config::Config) -> Result<()> {
    let store = storage::store_from_config(config)?;
    run_store_health(&store).await?;
    println!("Storage: ok");
    Ok(())
}

async fn run_store_health<S: KeyValueStore>(store: &S) -> Result<()> {
    let probe_key = TypedKey::<Vec<u8>>::new("health/probe");
    let payload = b"ok".to_vec();
    store.save(&probe_key, payload.clone()).await?;
    let round_trip = store.load(&probe_key).await?;
    store.remove(&probe_key).await?;

    if round_trip.as_deref() != Some(payload.as_slice()) {
        bail!("storage round-trip failed");
    }
    if store.contains(&probe_key).await? {
        bail!("storage probe was not removed");
    }
    Ok(())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

async fn run_set(config: &config::Config, key: KeyArgs, value: &str) -> Result<()> {
    let store = storage::store_from_config(config)?;
    values::set(&store, &key.name, key.kind, value).await?;
    info!(name = %key.name, kind = %key.kind, "value stored");
    Ok(())
}

async fn run_get(config: &config::Config, key: KeyArgs) -> Result<()> {
    let store = storage::store_from_config(config)?;
    match values::get(&store, &key.name, key.kind).await? {
        Some(rendered) => println!("{rendered}"),
        None => bail!("no {} value stored under {:?}", key.kind, key.name),
    }
    Ok(())
}

async fn run_remove(config: &config::Config, key: KeyArgs) -> Result<()> {
    let store = storage::store_from_config(config)?;
    values::remove(&store, &key.name, key.kind).await
}

async fn run_contains(config: &config::Config, key: KeyArgs) -> Result<()> {
    let store = storage::store_from_config(config)?;
    println!("{}", values::contains(&store, &key.name, key.kind).await?);
    Ok(())
}
