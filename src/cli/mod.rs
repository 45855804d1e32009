
use crate::activity::DEFAULT_HISTORY_LIMIT;
use crate::config::credentials::{CREDENTIAL_ENV_VARS, detect_source};
use crate::config::{Config, load_config};
use crate::dispatcher::EventDispatcher;
use crate::gateway::{self, GatewayState};
use crate::store::{CredentialCache, TokenProvider};
use crate::upsert::Lookup;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "chatledger")]
#[command(about = "Chat webhook to record-store ledger", version)]
pub struct Cli {
    /// Config file (default: ~/.chatledger/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long, short = 'p')]
        port: Option<u16>,
    },
    /// Validate configuration and probe the record-store credentials
    Check,
    /// Show the user record for a user id
    Lookup {
        user_id: String,
    },
    /// Print a user's activity log, oldest first
    History {
        user_id: String,
        #[arg(long, short = 'n', default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: u32,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Check => check(&config).await,
        Commands::Lookup { user_id } => lookup(&config, &user_id).await,
        Commands::History { user_id, limit } => history(&config, &user_id, limit).await,
    }
}

async fn serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }
    if let Err(e) = config.validate_for_serve() {
        error!("refusing to start: {}", e);
        return Err(e.into());
    }

    let dispatcher = Arc::new(EventDispatcher::from_config(&config));
    let state = GatewayState::from_config(&config, dispatcher);
    let handle = gateway::start(&config.gateway.host, config.gateway.port, state).await?;

    tokio::select! {
        res = handle => {
            res.context("gateway task panicked")?;
            bail!("gateway stopped unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }
    Ok(())
}

async fn check(config: &Config) -> Result<()> {
    println!("Credentials:");
    for (name, env) in CREDENTIAL_ENV_VARS {
        println!("  {:<22} {:<8} ({})", name, detect_source(name, config), env);
    }

    match config.validate_for_serve() {
        Ok(()) => println!("Config: ok"),
        Err(e) => println!("Config: {e}"),
    }

    config.require_store()?;
    let tokens = TokenProvider::new(&config.store, Arc::new(CredentialCache::new()));
    let token = tokens.get_access_token().await?;
    println!("Token exchange: ok (expires {})", token.expires_at);
    Ok(())
}

async fn lookup(config: &Config, user_id: &str) -> Result<()> {
    config.require_store()?;
    let dispatcher = EventDispatcher::from_config(config);
    match dispatcher.upserter().locator().find_by_user_id(user_id).await {
        Lookup::Found(record) => {
            println!("record_id: {}", record.record_id);
            println!("{}", serde_json::to_string_pretty(&record.fields)?);
        }
        Lookup::NotFound => println!("No record for {user_id}"),
        Lookup::Failed(e) => return Err(e.into()),
    }
    Ok(())
}

async fn history(config: &Config, user_id: &str, limit: u32) -> Result<()> {
    config.require_store()?;
    let dispatcher = EventDispatcher::from_config(config);
    let items = dispatcher.activity().history(user_id, limit).await?;
    if items.is_empty() {
        println!("No activity for {user_id}");
        return Ok(());
    }
    for item in items {
        let ts = item
            .timestamp
            .as_ref()
            .and_then(|v| v.as_str().map(str::to_string).or_else(|| Some(v.to_string())))
            .unwrap_or_default();
        let body = if item.text.is_empty() {
            &item.payload
        } else {
            &item.text
        };
        println!(
            "{}  {:<8} {:<8} {}",
            ts,
            item.direction.as_deref().unwrap_or("-"),
            item.event_type.as_deref().unwrap_or("-"),
            body
        );
    }
    Ok(())
}
