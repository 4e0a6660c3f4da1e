mod backends;
mod commands;
mod console;
mod render;
mod utils;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use caldraft_core::config::CaldraftConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::commands::process::ProcessArgs;

#[derive(Parser)]
#[command(name = "caldraft")]
#[command(about = "Turn emails and web pages into calendar events with a language model")]
struct Cli {
    /// Debug logging, echoed to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract an event from each file (or stdin) and publish it
    Process {
        files: Vec<PathBuf>,

        /// Ask the operator when something is missing, and before publishing
        #[arg(short, long)]
        interactive: bool,

        /// Backend to start with (by name)
        #[arg(short, long)]
        backend: Option<String>,

        /// Destination calendar (by name)
        #[arg(short, long)]
        destination: Option<String>,

        /// Event title to fall back on (default: first line of the text)
        #[arg(long)]
        subject: Option<String>,

        /// Reference instant for relative dates (RFC 3339; default: file mtime)
        #[arg(long)]
        date: Option<String>,

        /// Skip (or confirm) items older than this, e.g. "3days"
        #[arg(long)]
        max_age: Option<String>,

        /// Publish without confirmation
        #[arg(long)]
        no_confirm: bool,
    },
    /// List configured backends
    Models {
        /// Send this prompt to every backend and time the replies
        #[arg(long)]
        evaluate: Option<String>,
    },
    /// Show configuration paths and settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = CaldraftConfig::load().context("Could not load configuration")?;
    init_logging(config.log_path().as_deref(), cli.verbose);

    match cli.command {
        Commands::Process {
            files,
            interactive,
            backend,
            destination,
            subject,
            date,
            max_age,
            no_confirm,
        } => {
            let args = ProcessArgs {
                files,
                subject,
                date,
                max_age,
                interactive,
                backend,
                destination,
                no_confirm,
            };
            commands::process::run(&config, args).await
        }
        Commands::Models { evaluate } => match evaluate {
            Some(prompt) => commands::models::evaluate(&config, &prompt).await,
            None => commands::models::list(&config),
        },
        Commands::Config => commands::config::run(&config),
    }
}

/// Log to the configured file; with `--verbose`, or when the file cannot be
/// opened, also to stderr.
fn init_logging(log_path: Option<&Path>, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "caldraft={level},caldraft_core={level}",
            level = default_level
        ))
    });

    let file = log_path.and_then(|path| {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok()?;
        }
        OpenOptions::new().create(true).append(true).open(path).ok()
    });

    let to_stderr = verbose || file.is_none();
    let file_layer = file.map(|f| fmt::layer().with_ansi(false).with_writer(Mutex::new(f)));
    let stderr_layer = to_stderr.then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
}
