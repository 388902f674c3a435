// Shallot CLI — run a directory, a relay, a terminal listener, or send
// a message through a fresh onion chain.

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use shallot_core::{
    Directory, DirectoryClient, DirectoryServer, Originator, Relay, RelayConfig, Terminal,
    TerminalConfig,
};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;

#[derive(Parser)]
#[command(name = "shallot")]
#[command(about = "Onion-routed message relaying (demonstration, not protection)")]
#[command(version)]
struct Cli {
    /// Directory service address, overriding the config file for this run
    #[arg(long, global = true)]
    directory: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the router directory service
    Directory {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:9000")]
        listen: String,
    },

    /// Run a relay node
    Relay {
        /// Router name — the directory registration key
        name: String,

        /// Address to listen on (port 0 picks a free port)
        #[arg(short, long, default_value = "127.0.0.1:0")]
        listen: String,
    },

    /// Listen for messages addressed to NAME
    Listen {
        /// Destination name senders will address
        name: String,

        /// Address to listen on (port 0 picks a free port)
        #[arg(short, long, default_value = "127.0.0.1:0")]
        listen: String,
    },

    /// Send a message through a fresh relay chain
    Send {
        /// Destination name, as registered by `listen`
        #[arg(long)]
        to: String,

        /// Message text
        message: String,

        /// Relay chain length, overriding the config file
        #[arg(long)]
        hops: Option<usize>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set a config value
    Set { key: String, value: String },
    /// Get a config value
    Get { key: String },
    /// List all config values
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(directory) = cli.directory {
        // Session override only; never saved.
        config.directory_addr = directory;
    }

    match cli.command {
        Commands::Directory { listen } => cmd_directory(&config, &listen).await,
        Commands::Relay { name, listen } => cmd_relay(&config, name, &listen).await,
        Commands::Listen { name, listen } => cmd_listen(&config, name, &listen).await,
        Commands::Send { to, message, hops } => cmd_send(&config, &to, &message, hops).await,
        Commands::Config { action } => cmd_config(action),
    }
}

async fn cmd_directory(config: &Config, listen: &str) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {listen}"))?;
    println!(
        "{} directory service on {}",
        "✓".green(),
        listener.local_addr()?.to_string().bold()
    );

    info!(listen = %listener.local_addr()?, "starting directory service");
    let server = DirectoryServer::new(config.net());
    server.run(listener).await.context("Directory service failed")
}

async fn cmd_relay(config: &Config, name: String, listen: &str) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {listen}"))?;
    let addr = listener.local_addr()?;

    let directory = directory_client(config);
    let relay = Relay::new(
        RelayConfig {
            name: name.clone(),
            ip: addr.ip().to_string(),
            port: addr.port(),
            net: config.net(),
        },
        directory,
    )
    .context("Keypair generation failed")?;

    println!(
        "{} relay {} on {} (directory {})",
        "✓".green(),
        name.bold(),
        addr,
        config.directory_addr
    );
    info!(relay = %name, directory = %config.directory_addr, "starting relay");
    relay.register().await;
    relay.serve(listener).await.context("Relay failed")
}

async fn cmd_listen(config: &Config, name: String, listen: &str) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {listen}"))?;
    let addr = listener.local_addr()?;

    let directory = directory_client(config);
    let (terminal, mut deliveries) = Terminal::new(
        TerminalConfig {
            name: name.clone(),
            ip: addr.ip().to_string(),
            port: addr.port(),
            net: config.net(),
        },
        directory,
    )
    .context("Keypair generation failed")?;

    println!(
        "{} listening for messages to {} on {}",
        "✓".green(),
        name.bold(),
        addr
    );
    info!(terminal = %name, directory = %config.directory_addr, "starting terminal listener");
    terminal.register().await;
    tokio::spawn(terminal.serve(listener));

    while let Some(message) = deliveries.recv().await {
        println!("{} {}", "message:".cyan().bold(), message);
    }
    Ok(())
}

async fn cmd_send(config: &Config, to: &str, message: &str, hops: Option<usize>) -> Result<()> {
    let mut net = config.net();
    if let Some(hops) = hops {
        net.hops = hops;
    }

    let directory = Arc::new(DirectoryClient::new(config.directory_addr.clone(), &net));
    let originator = Originator::new(directory, net);
    originator
        .send(message, to)
        .await
        .context("Send failed")?;

    info!(%to, "envelope accepted by the first hop");
    println!("{} envelope accepted by the first hop", "✓".green());
    Ok(())
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            println!("{} {} = {}", "✓".green(), key, value);
        }
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => anyhow::bail!("Unknown config key: {}", key),
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            println!("{}", "Configuration:".bold());
            for (key, value) in config.list() {
                println!("  {key} = {value}");
            }
        }
    }
    Ok(())
}

fn directory_client(config: &Config) -> Arc<dyn Directory> {
    Arc::new(DirectoryClient::new(
        config.directory_addr.clone(),
        &config.net(),
    ))
}
