//! Chatloom CLI, the main entry point.
//!
//! Commands:
//! - `chat`    Interactive conversation (REPL)
//! - `ask`     Send a single message and print the answer
//! - `config`  Show, locate or validate the configuration
//! - `tools`   List the registered tools and their schemas
//! - `history` Show the stored summary and recent turns of a session

use std::path::PathBuf;

use chatloom_config::{AppConfig, ConfigError};
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "chatloom",
    about = "Chatloom: a tool-augmented conversation orchestrator",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.chatloom/config.toml)
    #[arg(short, long, global = true, env = "CHATLOOM_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive conversation
    Chat {
        /// Resume (or name) a session; a new id is generated otherwise
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Send one message and print the answer
    Ask {
        /// The message to send
        message: String,

        /// Session to run the turn in
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// List registered tools
    Tools,

    /// Show a session's stored summary and recent turns
    History {
        #[arg(short, long)]
        session: String,

        /// Number of turns to show (defaults to memory.max_history_pairs)
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (API key redacted)
    Show,
    /// Print the default config file path
    Path,
    /// Check the configuration for errors
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with answers on stdout.
    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    let config_path = cli.config.clone();
    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(load_config(&config_path)?).await?,
            ConfigAction::Path => commands::config_cmd::path(config_path.as_deref()).await?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path.as_deref()).await?,
        },
        Commands::Chat { session } => commands::chat::run(load_config(&config_path)?, session).await?,
        Commands::Ask { message, session } => {
            commands::chat::ask(load_config(&config_path)?, &message, session).await?
        }
        Commands::Tools => commands::tools::run(load_config(&config_path)?).await?,
        Commands::History { session, limit } => {
            commands::history::run(load_config(&config_path)?, &session, limit).await?
        }
    }

    Ok(())
}

fn load_config(path: &Option<PathBuf>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    }
}
