// peerchat — terminal front end for the peerchat node host
//
// Runs a gossipsub node host in-process and drives it through a bridge client,
// the same way a browser tab drives the background host.

mod config;
mod topics;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use peerchat_core::bridge::{BridgeClient, MessageHandler};
use peerchat_core::host::NodeHost;
use peerchat_core::identity::IdentityManager;
use peerchat_core::protocol::{ChatMessage, ConnectionStatus};
use peerchat_core::store::MessageArchive;
use peerchat_core::transport::{GossipsubTransport, SwarmSettings};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "peerchat")]
#[command(about = "Peer-to-peer topic chat over gossipsub", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node and chat on a topic
    Start {
        #[arg(short, long)]
        port: Option<u16>,
        /// Topic to join (defaults to the configured one)
        #[arg(short, long)]
        topic: Option<String>,
    },
    /// Show identity information
    Identity,
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// View archived messages
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
    Bootstrap {
        #[command(subcommand)]
        action: BootstrapAction,
    },
}

#[derive(Subcommand)]
enum BootstrapAction {
    Add { multiaddr: String },
    Remove { multiaddr: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { port, topic } => cmd_start(port, topic).await,
        Commands::Identity => cmd_identity(),
        Commands::Config { action } => cmd_config(action),
        Commands::History { limit } => cmd_history(limit).await,
    }
}

fn cmd_identity() -> Result<()> {
    let config = config::Config::load()?;
    let mut manager = IdentityManager::with_path(config.data_dir()?.join("identity"))?;
    let identity = manager.initialize().context("Failed to load identity")?;

    println!("{}", "Identity Information".bold());
    println!("  Peer ID:     {}", identity.peer_id().to_string().bright_cyan());
    println!("  Fingerprint: {}", identity.fingerprint().bright_yellow());
    Ok(())
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    let mut config = config::Config::load()?;

    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            println!("{} {} = {}", "✓".green(), key, value);
        }
        ConfigAction::Get { key } => match config.get(&key) {
            Some(value) => println!("{}", value),
            None => anyhow::bail!("Unknown or unset config key: {}", key),
        },
        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            for (key, value) in config.list() {
                println!("  {:<22} {}", key, value.bright_cyan());
            }
            println!();
            println!("Config file: {}", config::Config::config_file()?.display());
        }
        ConfigAction::Bootstrap { action } => match action {
            BootstrapAction::Add { multiaddr } => {
                config.add_bootstrap_node(multiaddr.clone())?;
                config.save()?;
                println!("{} Added {}", "✓".green(), multiaddr);
            }
            BootstrapAction::Remove { multiaddr } => {
                config.remove_bootstrap_node(&multiaddr);
                config.save()?;
                println!("{} Removed {}", "✓".green(), multiaddr);
            }
            BootstrapAction::List => {
                if config.bootstrap_nodes.is_empty() {
                    println!("No bootstrap nodes configured.");
                }
                for node in &config.bootstrap_nodes {
                    println!("  • {}", node);
                }
            }
        },
    }
    Ok(())
}

async fn cmd_history(limit: usize) -> Result<()> {
    let config = config::Config::load()?;
    let archive = MessageArchive::open(config.data_dir()?.join("archive"))?;
    let messages = archive.load_recent(limit).await?;

    if messages.is_empty() {
        println!("No messages archived.");
        return Ok(());
    }
    for message in messages {
        print_message(&message);
    }
    Ok(())
}

fn print_message(message: &ChatMessage) {
    println!("{} {}: {}", "←".bright_blue(), short_peer(&message.from).bright_cyan(), message.content);
}

fn short_peer(peer_id: &str) -> &str {
    let start = peer_id.len().saturating_sub(8);
    peer_id.get(start..).unwrap_or(peer_id)
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

async fn cmd_start(port: Option<u16>, topic: Option<String>) -> Result<()> {
    let config = config::Config::load()?;
    let data_dir = config.data_dir()?;

    let mut identity = IdentityManager::with_path(data_dir.join("identity"))?;
    let keypair = identity
        .initialize()
        .context("Failed to load identity")?
        .keypair()
        .clone();
    let archive = Arc::new(MessageArchive::open(data_dir.join("archive"))?);

    println!("{}", "peerchat — Starting...".bold());
    println!();

    let port = port.unwrap_or(config.listen_port);
    let settings = SwarmSettings {
        listen_addr: Some(format!("/ip4/0.0.0.0/tcp/{}", port).parse()?),
        bootstrap: config.bootstrap_addrs(),
        enable_mdns: config.enable_mdns,
    };
    let transport = Arc::new(GossipsubTransport::start(keypair, settings).await?);
    let host = NodeHost::spawn(transport.clone(), config.host_config());
    println!("{} Peer ID: {}", "✓".green(), host.peer_id().bright_cyan());
    for addr in transport.listen_addrs().await {
        println!("{} Listening on {}", "✓".green(), addr);
    }

    let bridge = BridgeClient::global();
    bridge.add_status_handler(Arc::new(|status: ConnectionStatus| {
        let label = match status {
            ConnectionStatus::Connected => status.to_string().green(),
            ConnectionStatus::Connecting => status.to_string().yellow(),
            ConnectionStatus::Disconnected => status.to_string().red(),
        };
        println!("\n{} Host {}", "•".bold(), label);
        prompt();
    }));
    host.attach_bridge(&bridge);

    tokio::time::timeout(Duration::from_secs(10), async {
        while !bridge.is_ready() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .context("Host did not become ready")?;

    let mut topics = topics::TopicHandlers::new();
    let mut current = topic.unwrap_or_else(|| config.default_topic.clone());
    join_topic(&bridge, &mut topics, &archive, &current);

    println!();
    println!("{}", "Commands:".bold());
    println!("  {} <topic>   switch to a topic", "/join".bright_green());
    println!("  {} <topic>  leave a topic", "/leave".bright_green());
    println!("  {}          list joined topics", "/topics".bright_green());
    println!("  {}           list connected peers", "/peers".bright_green());
    println!("  {}            exit", "/quit".bright_green());
    println!("  anything else is sent to the current topic");
    println!();

    use tokio::io::AsyncBufReadExt;
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    prompt();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, arg) = match line.split_once(' ') {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "/quit" | "/exit" => break,
            "/join" if !arg.is_empty() => {
                current = arg.to_string();
                join_topic(&bridge, &mut topics, &archive, &current);
            }
            "/leave" if !arg.is_empty() => {
                if topics.leave(&bridge, arg) {
                    println!("{} Left {}", "✓".green(), arg);
                }
            }
            "/topics" => {
                for topic in bridge.intended_topics() {
                    let marker = if topic == current { "*" } else { " " };
                    println!(" {} {}", marker, topic.bright_cyan());
                }
            }
            "/peers" => {
                bridge.request_peer_list();
                tokio::time::sleep(Duration::from_millis(200)).await;
                let peers = bridge.known_peers();
                if peers.is_empty() {
                    println!("No peers.");
                }
                for peer in peers {
                    println!("  • {}", peer);
                }
            }
            _ if command.starts_with('/') => {
                println!("Unknown command: {}", command);
            }
            _ => {
                let message = ChatMessage::new(host.peer_id(), "", line);
                match bridge.publish_tracked(&current, message.to_value()) {
                    Ok(outcome) => {
                        let topic = current.clone();
                        tokio::spawn(async move {
                            if let Ok(outcome) = outcome.await {
                                if !outcome.success {
                                    println!(
                                        "\n{} Not delivered to {}: {}",
                                        "✗".red(),
                                        topic,
                                        outcome.error.unwrap_or_default()
                                    );
                                    prompt();
                                }
                            }
                        });
                    }
                    Err(e) => println!("{} {}", "✗".red(), e),
                }
            }
        }
        prompt();
    }

    println!("Shutting down...");
    bridge.dispose();
    host.shutdown().await;
    if let Err(e) = transport.shutdown().await {
        tracing::debug!("Transport shutdown: {}", e);
    }
    Ok(())
}

/// Subscribe to `topic`, printing and archiving what arrives on it
fn join_topic(
    bridge: &Arc<BridgeClient>,
    topics: &mut topics::TopicHandlers,
    archive: &Arc<MessageArchive>,
    topic: &str,
) {
    if topics.is_joined(bridge, topic) {
        println!("{} Now chatting in {}", "✓".green(), topic.bright_cyan());
        return;
    }

    let me = bridge.peer_id().unwrap_or_default();
    let archive = archive.clone();
    let joined = topics.join(bridge, topic, move || -> MessageHandler {
        Arc::new(move |message: &ChatMessage| {
            if message.from != me {
                print!("\r");
                print_message(message);
                prompt();
            }
            let archive = archive.clone();
            let message = message.clone();
            tokio::spawn(async move {
                if let Err(e) = archive.store(&message).await {
                    tracing::warn!("Failed to archive message {}: {}", message.id, e);
                }
            });
        })
    });

    if joined {
        println!("{} Joined {}", "✓".green(), topic.bright_cyan());
    } else {
        println!("{} Could not join {}", "✗".red(), topic);
    }
}
