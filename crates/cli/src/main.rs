//! PageSpeed Tracker CLI
//!
//! Manage tracked URLs, settings and the comparison report of a running
//! tracker daemon.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{report, settings, trackers};

/// PageSpeed Tracker CLI
#[derive(Parser)]
#[command(name = "psi")]
#[command(author, version, about = "CLI for PageSpeed Tracker", long_about = None)]
pub struct Cli {
    /// Daemon URL (defaults to the config file, then http://localhost:8080)
    #[arg(long, env = "PSI_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List tracked URLs with their status and summaries
    List,

    /// Track a URL and run its first cycle immediately
    Add {
        url: String,

        /// Display label
        #[arg(long, short)]
        label: Option<String>,
    },

    /// Resume scheduled cycles for a URL
    Start { url: String },

    /// Pause a URL
    Stop { url: String },

    /// Run a cycle for a URL now
    Run { url: String },

    /// Stop tracking a URL and drop its samples
    Remove { url: String },

    /// Start every tracked URL
    StartAll,

    /// Stop every tracked URL
    StopAll,

    /// Remove every tracked URL
    Clear {
        /// Confirm removal
        #[arg(long)]
        yes: bool,
    },

    /// Move a URL to a new position in the display order
    Move {
        url: String,

        /// Zero-based target position
        index: usize,
    },

    /// Show or change daemon settings
    #[command(subcommand)]
    Settings(SettingsCommands),

    /// Set the baseline URL, or clear it when no URL is given
    Baseline { url: Option<String> },

    /// Choose the report sort column
    Sort {
        #[arg(value_enum)]
        column: report::SortKey,

        /// Sort descending
        #[arg(long)]
        desc: bool,
    },

    /// Show the side-by-side comparison report
    Report,
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Show current settings
    Show,

    /// Save the API key and poll interval
    Set {
        /// PageSpeed Insights API key
        #[arg(long, env = "PSI_API_KEY")]
        api_key: String,

        /// Poll interval in seconds (minimum 60)
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        output::print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;
    let format = config.format(cli.format);

    // Initialize client
    let client = client::ApiClient::new(&config.api_url(cli.api_url))?;

    // Execute command
    match cli.command {
        Commands::List => trackers::list(&client, format).await?,
        Commands::Add { url, label } => trackers::add(&client, &url, label, format).await?,
        Commands::Start { url } => trackers::start(&client, &url, format).await?,
        Commands::Stop { url } => trackers::stop(&client, &url, format).await?,
        Commands::Run { url } => trackers::run(&client, &url, format).await?,
        Commands::Remove { url } => trackers::remove(&client, &url).await?,
        Commands::StartAll => trackers::start_all(&client).await?,
        Commands::StopAll => trackers::stop_all(&client).await?,
        Commands::Clear { yes } => trackers::clear(&client, yes).await?,
        Commands::Move { url, index } => trackers::move_to(&client, &url, index, format).await?,
        Commands::Settings(settings_cmd) => match settings_cmd {
            SettingsCommands::Show => settings::show(&client, format).await?,
            SettingsCommands::Set { api_key, interval } => {
                settings::set(&client, api_key, interval, format).await?
            }
        },
        Commands::Baseline { url } => report::baseline(&client, url, format).await?,
        Commands::Sort { column, desc } => report::sort(&client, column, desc, format).await?,
        Commands::Report => report::show(&client, format).await?,
    }

    Ok(())
}
