mod cli;
mod config;
mod records;
mod storage;

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use crate::cli::{BundleCommand, ConfigCommand};
use clap::Parser;
use color_eyre::{
    eyre::{bail, eyre},
    Result,
};
use serde_json::Value;
use sitevault_core::{
    envelope::{Codec, PlainValue},
    storage::RecordStore,
};
use sitevault_server::AppState;
use sitevault_site::SealedStore;
use sitevault_storage::bundle::{self, SiteBundle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let command = cli.command.unwrap_or(cli::Command::Serve {
        host: None,
        port: None,
    });
    let config = if command.needs_config() {
        config::load()?
    } else {
        config::Config::default()
    };
    match command {
        cli::Command::Serve { host, port } => run_serve(&config, host, port).await?,
        cli::Command::Encrypt { text, json } => {
            let codec = storage::codec_from_config(&config).await?;
            println!("{}", records::encrypt(&codec, text, json)?);
        }
        cli::Command::Decrypt { envelope } => {
            let codec = storage::codec_from_config(&config).await?;
            println!("{}", records::decrypt(&codec, &envelope)?);
        }
        cli::Command::EncryptFile { input, output } => {
            let codec = storage::codec_from_config(&config).await?;
            records::encrypt_file(&codec, &input, &output)?;
        }
        cli::Command::DecryptFile { path } => {
            let codec = storage::codec_from_config(&config).await?;
            println!("{}", records::decrypt_file(&codec, &path)?);
        }
        cli::Command::Bundle(cmd) => run_bundle(cmd, &config).await?,
        cli::Command::Export => {
            let sealed = sealed_store(&config).await?;
            println!("{}", records::export(&sealed).await?);
        }
        cli::Command::Health => run_health_check(&config).await?,
        cli::Command::Config(ConfigCommand::Init) => init_config()?,
        cli::Command::Version => print_version(),
    }

    Ok(())
}

fn init_tracing() {
    // RUST_LOG wins; default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("sitevault {}", env!("CARGO_PKG_VERSION"));
}

async fn run_serve(config: &config::Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| eyre!("invalid listen address {addr}: {e}"))?;

    // Passcode problems must stop startup before the socket is bound.
    let codec = storage::codec_from_config(config).await?;
    let store = storage::store_from_config(config)?;
    sitevault_server::serve(addr, AppState::new(codec, store)).await?;
    Ok(())
}

async fn sealed_store(config: &config::Config) -> Result<SealedStore<dyn RecordStore>> {
    let codec = storage::codec_from_config(config).await?;
    let store = storage::store_from_config(config)?;
    Ok(SealedStore::new(codec, store))
}

async fn run_bundle(cmd: BundleCommand, config: &config::Config) -> Result<()> {
    let codec = storage::codec_from_config(config).await?;
    match cmd {
        BundleCommand::Build { dir } => {
            let dir = bundle_dir(dir, config)?;
            let manifest = SiteBundle::default().build(&dir, &codec)?;
            for file in &manifest.encrypted_files {
                println!("{}", dir.join(file).display());
            }
        }
        BundleCommand::Show { dir } => {
            let dir = bundle_dir(dir, config)?;
            println!("{}", show_bundle(&dir, &codec)?);
        }
    }
    Ok(())
}

fn bundle_dir(dir: Option<PathBuf>, config: &config::Config) -> Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => storage::data_dir_from_config(config),
    }
}

fn show_bundle(dir: &Path, codec: &Codec) -> Result<String> {
    let sections: serde_json::Map<String, Value> = bundle::load(dir, codec)?
        .into_iter()
        .map(|(name, value)| (name, value.into_json()))
        .collect();
    Ok(serde_json::to_string_pretty(&sections)?)
}

/// Round-trips a probe record through the configured backend.
async fn run_health_check(config: &config::Config) -> Result<()> {
    let sealed = sealed_store(config).await?;
    run_store_health(&sealed).await?;
    println!("Storage ({}): ok", sealed.backend());
    Ok(())
}

async fn run_store_health(sealed: &SealedStore<dyn RecordStore>) -> Result<()> {
    let probe_key = "health-probe";
    let payload = PlainValue::Text("ok".to_string());
    sealed.store(probe_key, payload.clone(), None).await?;
    // Remove the health record even when reading it back failed.
    let round_trip = sealed.get(probe_key).await;
    let removed = sealed.delete(probe_key).await;
    let round_trip = round_trip?;
    removed?;

    if round_trip != payload {
        bail!("storage round-trip failed");
    }
    Ok(())
}

fn init_config() -> Result<()> {
    let path = config::write_default_if_missing()?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
