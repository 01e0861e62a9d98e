use std::io::BufRead;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use integration_guard::api::{self, AppState, LogSink, MemoryCredentials};
use integration_guard::config::{self, Config};
use integration_guard::guard::IntegrationGuard;
use integration_guard::vault::{cipher, CredentialVault};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let json_logs = std::env::var("LOG_FORMAT").as_deref() == Ok("json");
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "integration_guard=info,tower_http=info".into()),
        ))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .with(json_logs.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .init();

    let args = cli::Cli::parse();

    // gen-key must work before any key exists
    if let Some(cli::Commands::GenKey) = args.command {
        println!("{}", cipher::generate_key_hex());
        return Ok(());
    }

    let cfg = config::load()?;

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Encrypt { value }) => {
            let vault = configured_vault(&cfg)?;
            println!("{}", vault.encrypt(&value)?);
            Ok(())
        }
        Some(cli::Commands::Decrypt { value }) => {
            let vault = CredentialVault::new(cfg.encryption_key.as_deref());
            println!("{}", vault.decrypt(&value)?);
            Ok(())
        }
        Some(cli::Commands::Migrate) => migrate_stdin(&cfg),
        Some(cli::Commands::GenKey) => Ok(()),
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn configured_vault(cfg: &Config) -> anyhow::Result<CredentialVault> {
    let vault = CredentialVault::new(cfg.encryption_key.as_deref());
    if !vault.is_configured() {
        anyhow::bail!("ENCRYPTION_KEY is missing or not 64 hex chars");
    }
    Ok(vault)
}

fn migrate_stdin(cfg: &Config) -> anyhow::Result<()> {
    let vault = configured_vault(cfg)?;
    let (mut migrated, mut skipped) = (0usize, 0usize);
    for line in std::io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        if line.is_empty() {
            continue;
        }
        match vault.migrate(&line) {
            Some(tag) => {
                migrated += 1;
                println!("{}", tag);
            }
            None => {
                skipped += 1;
                println!("{}", line);
            }
        }
    }
    tracing::info!(migrated, skipped, "credential backfill finished");
    Ok(())
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    tracing::info!(config = ?cfg, "starting integration guard");

    let guard = IntegrationGuard::from_config(&cfg);
    if !guard.vault().is_configured() {
        tracing::warn!("ENCRYPTION_KEY not set; stored credentials cannot be encrypted or decrypted");
    }

    // no database in this binary: credentials come from PARTNER_SHOP_TOKENS
    let credentials = MemoryCredentials::from_pairs(cfg.shop_tokens.iter().cloned());
    if credentials.is_empty() {
        tracing::warn!("PARTNER_SHOP_TOKENS not set; every webhook will be acknowledged as ignored");
    } else {
        tracing::info!(shops = credentials.len(), "seeded shop credentials");
    }

    let state = Arc::new(AppState {
        guard,
        credentials: Arc::new(credentials),
        sink: Arc::new(LogSink),
    });

    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("integration guard listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
