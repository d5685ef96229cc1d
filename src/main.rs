//! topicdeck - Main entry point
//!
//! CLI over the deck: monitor a broker's topic space, invoke a catalog
//! tool once, or inspect configuration.

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use topicdeck::config::DeckConfig;
use topicdeck::deck::TopicDeck;
use topicdeck::observability::init_default_logging;
use topicdeck::tools::builtin::deck_catalog;
use tracing::{error, info};

/// MQTT session manager and topic-state engine
#[derive(Parser)]
#[command(name = "topicdeck")]
#[command(about = "MQTT session manager and topic-state engine")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and watch the topic space until interrupted
    Monitor {
        /// Broker URL, overriding the configured one
        #[arg(long)]
        url: Option<String>,
    },
    /// Invoke a single catalog tool and print its JSON result
    Call {
        /// Tool name (see `topicdeck call list_topics '{}'`)
        tool: String,
        /// Tool input as a JSON object
        input: String,
        /// Broker URL, overriding the configured one
        #[arg(long)]
        url: Option<String>,
    },
    /// Validate configuration
    Config {
        /// Show resolved configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Monitor { url } => monitor(config, url).await,
        Commands::Call { tool, input, url } => call_tool(config, &tool, &input, url).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(config_path: &Option<PathBuf>) -> Result<DeckConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(DeckConfig::load_from_file(path)?)
        }
        None => {
            for path_str in ["deck.toml", "config/deck.toml"] {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(DeckConfig::load_from_file(&path)?);
                }
            }
            // No file: local broker defaults
            Ok(DeckConfig::with_broker_url("mqtt://localhost:1883"))
        }
    }
}

async fn monitor(config: DeckConfig, url: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let broker_url = url.unwrap_or_else(|| config.broker.url.clone());
    let deck = TopicDeck::new(config);

    info!("Connecting to {}", broker_url);
    deck.connect(&broker_url).await?;
    info!("Watching topic space, Ctrl-C to stop");

    let mut last_revision = deck.registry_revision().await;
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            _ = ticker.tick() => {
                let revision = deck.registry_revision().await;
                if revision != last_revision {
                    last_revision = revision;
                    print_topics(&deck).await;
                }
            }
        }
    }

    info!("Shutting down");
    deck.disconnect().await?;
    deck.save_prefs().await?;
    Ok(())
}

async fn print_topics(deck: &TopicDeck) {
    use topicdeck::engine::DisplayGroup;

    println!("--- topics ---");
    for group in deck.grouped_topics().await {
        match group {
            DisplayGroup::Flat(topic) => println!("{topic}"),
            DisplayGroup::Group { label, topics } => {
                println!("{label}/");
                for topic in topics {
                    println!("  {topic}");
                }
            }
        }
    }
}

async fn call_tool(
    config: DeckConfig,
    tool: &str,
    input: &str,
    url: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let parameters: Value = serde_json::from_str(input)?;
    let broker_url = url.unwrap_or_else(|| config.broker.url.clone());
    let deck = TopicDeck::new(config);

    // The connect tool manages its own connection
    if tool != "connect" {
        deck.connect(&broker_url).await?;
    }

    let catalog = deck_catalog(deck.clone());
    let result = catalog.invoke(tool, &parameters).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if deck.is_connected() {
        deck.disconnect().await?;
    }
    Ok(())
}

fn handle_config_command(config: DeckConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    info!("Configuration is valid");
    if show {
        println!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}
