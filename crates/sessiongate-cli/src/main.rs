//! SessionGate - command-line access to the storefront admin API.
//!
//! Logs in once, runs the requested calls through a single gateway (so
//! expired tokens are renewed transparently), then logs out.

mod app;

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sessiongate")]
#[command(author, version, about = "Admin API client with transparent session renewal", long_about = None)]
pub struct Cli {
    /// Backend base URL (overrides config file and SESSIONGATE_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Admin account email
    #[arg(long, global = true, env = "SESSIONGATE_EMAIL")]
    pub email: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch one or more resources concurrently and print their JSON
    Get {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Print every item of a cursor-paginated collection, one per line
    List { path: String },
    /// Show the logged-in administrator
    Whoami,
    /// Send a password reset email
    ResetPassword { email: String },
}

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG to control the level (e.g., RUST_LOG=sessiongate_core=debug).
fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path.file_name().unwrap_or_else(|| OsStr::new("sessiongate.log"));
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));

            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_deref());
    info!("SessionGate starting");

    let result = app::run(cli).await;

    info!("SessionGate shutting down");
    result
}
