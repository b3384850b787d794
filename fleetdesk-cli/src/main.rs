#![cfg_attr(not(test), forbid(unsafe_code))]

//! Main entry point for the FleetDesk CLI.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use shared::config::{Config, ConfigOverrides};
use url::Url;

mod commands;
mod logging;
mod render;

/// FleetDesk CLI
#[derive(Parser, Debug)]
#[command(name = "fleetdesk")]
#[command(about = "Command-line client for FleetDesk conversations", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Path to the configuration file (YAML, JSON or TOML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// REST API base URL, e.g. `http://localhost:8080/api/`
    #[arg(long, global = true)]
    api_url: Option<Url>,

    /// Live channel URL, e.g. `ws://localhost:8080/ws`
    #[arg(long, global = true)]
    channel_url: Option<Url>,

    /// Log level or filter directive for diagnostics on stderr
    #[arg(long, global = true)]
    log_level: Option<String>,
}

impl GlobalArgs {
    fn load_config(&self) -> Result<Config> {
        let overrides = ConfigOverrides {
            api_url: self.api_url.clone(),
            channel_url: self.channel_url.clone(),
            log_level: self.log_level.clone(),
        };
        Config::load_config(self.config.clone(), &overrides).context("failed to load configuration")
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage the signed-in session
    Session {
        #[command(subcommand)]
        command: commands::session::SessionCommand,
    },

    /// List conversations with their unread counts
    Conversations,

    /// Print one page of a conversation's history
    History(commands::history::HistoryArgs),

    /// Open a conversation and chat over the live channel
    Chat(commands::chat::ChatArgs),

    /// Generate shell completion scripts for the CLI
    Completion {
        /// The shell to generate the script for (bash, zsh, fish, powershell, elvish)
        #[arg(long, short)]
        shell: clap_complete::Shell,
    },

    /// Write a configuration file with default values to the current directory
    Config {
        /// File format: yaml, json or toml
        #[arg(long, short, default_value = "yaml")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Completion { shell } => {
            commands::completion::generate_completion(*shell);
            return Ok(());
        }
        Commands::Config { format } => return commands::config::generate_config(format),
        _ => {}
    }

    let config = cli.global.load_config()?;
    logging::initialize_tracing(&config);

    match cli.command {
        Commands::Session { command } => commands::session::run(command, &config).await,
        Commands::Conversations => commands::conversations::list(&config).await,
        Commands::History(args) => commands::history::show(args, &config).await,
        Commands::Chat(args) => commands::chat::run(args, config).await,
        Commands::Completion { .. } | Commands::Config { .. } => Ok(()),
    }
}
