//! corvid CLI: run the bot, onboarding, and status commands.
//!
//! Usage:
//!   corvid run        Connect and serve until Ctrl+C (default)
//!   corvid onboard    Create a default configuration
//!   corvid status     Show current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use corvid_core::config::{Config, ReconnectDelay};
use corvid_core::dispatch::Dispatcher;
use corvid_core::handlers::builtin_registry;
use corvid_core::reconnect::Reconnector;
use corvid_core::transport::{TcpConnector, TransportFactory};

#[derive(Parser)]
#[command(
    name = "corvid",
    version,
    about = "A small, self-throttling IRC bot",
    long_about = "corvid: an IRC bot that joins your channels, answers commands and keeps itself off the flood list."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the configured server and run until interrupted
    Run {
        /// Config file to use instead of ~/.corvid/config.json
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Create or reset the default configuration
    Onboard,

    /// Show configuration status
    Status {
        /// Config file to use instead of ~/.corvid/config.json
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { config }) => cmd_run(config.as_deref()).await?,
        Some(Commands::Onboard) => cmd_onboard()?,
        Some(Commands::Status { config }) => cmd_status(config.as_deref())?,
        None => cmd_run(None).await?,
    }

    Ok(())
}

// ── Shared Setup ────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("reading config from {}", path.display())),
        None => Config::load(),
    }
}

fn validate_config(config: &Config) -> Result<()> {
    if let Err(errors) = config.validate() {
        eprintln!("\n  \x1b[31m❌ Configuration errors:\x1b[0m");
        for e in &errors {
            eprintln!("     • {}", e);
        }
        eprintln!();
        anyhow::bail!("Fix the above {} error(s) in config.json", errors.len());
    }
    Ok(())
}

// ── Run Command ─────────────────────────────────────────────────────

async fn cmd_run(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    validate_config(&config)?;
    let irc = &config.irc;

    let connector = TcpConnector::new(&irc.host, irc.port, irc.ssl, irc.connect_timeout())?;
    let dispatcher = Arc::new(Dispatcher::new(builtin_registry(), &irc.prefix));
    let handlers = dispatcher.registry().names().join(", ");
    let reconnector = Reconnector::from_config(irc);
    let connector_addr = connector.describe();

    println!();
    println!("  corvid v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Server: {}:{}{} | Nick: {}",
        irc.host,
        irc.port,
        if irc.ssl { " (TLS)" } else { "" },
        irc.nick
    );
    println!("  Channels: {}", irc.channels.join(", "));
    println!("  Handlers: {} | Prefix: {}", handlers, irc.prefix);
    println!("  Press Ctrl+C for graceful shutdown.");
    println!("  ─────────────────────────────────────");

    let cancel = CancellationToken::new();
    let cancel_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n  ⏳ Shutting down gracefully...");
            info!("Ctrl+C received, cancelling");
            cancel_signal.cancel();
        }
    });

    info!(addr = %connector_addr, nick = %irc.nick, "Starting supervisor");
    match reconnector.supervise(&connector, dispatcher, &cancel).await {
        Ok(()) => info!("Supervisor stopped"),
        Err(e) if e.is_interrupt() => info!("Supervisor interrupted"),
        Err(e) => return Err(e.into()),
    }

    println!("  ✅ Shutdown complete.");
    Ok(())
}

// ── Onboard Command ─────────────────────────────────────────────────

fn cmd_onboard() -> Result<()> {
    let path = Config::write_default_template()?;
    println!();
    println!("  ✅ Configuration created at:");
    println!("     {}", path.display());
    println!();
    println!("  Next steps:");
    println!("  1. Edit the config file and set your nick and channels");
    println!("  2. Run `corvid run` to connect");
    println!();
    Ok(())
}

// ── Status Command ──────────────────────────────────────────────────

fn cmd_status(path: Option<&Path>) -> Result<()> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(Config::default_path);

    println!();
    println!("  corvid status");
    println!("  ─────────────────────────────────────");

    if config_path.exists() {
        println!("  Config:    {}", config_path.display());
    } else {
        println!("  Config:    ❌ Not found (run `corvid onboard`)");
        return Ok(());
    }

    let config = load_config(Some(&config_path))?;
    let irc = &config.irc;

    println!(
        "  Server:    {}:{} {}",
        irc.host,
        irc.port,
        if irc.ssl { "(TLS)" } else { "(plain)" }
    );
    println!("  Nick:      {}", irc.nick);
    println!("  Channels:  {}", irc.channels.len());
    match irc.delay {
        ReconnectDelay::Seconds(secs) => match irc.max_retries {
            Some(max) => println!("  Reconnect: every {}s, at most {} times", secs, max),
            None => println!("  Reconnect: every {}s", secs),
        },
        ReconnectDelay::Disabled => println!("  Reconnect: disabled"),
    }
    match config.validate() {
        Ok(()) => println!("  Valid:     ✅"),
        Err(errors) => println!("  Valid:     ❌ {} error(s)", errors.len()),
    }

    println!();
    Ok(())
}
