//! nofile command-line client.

mod app;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nofile", version, about = "End-to-end encrypted file transfers")]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file [default: ~/.config/nofile/client.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Channel endpoint, overrides the configuration
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// Site root for share links, overrides the configuration
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Encrypt and upload files, one after another
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Retention in days, 0 = unlimited
        #[arg(long)]
        delay: Option<u32>,

        /// Delete after the first download
        #[arg(long)]
        burn: bool,

        /// Password the server asks for before serving the file
        #[arg(long)]
        password: Option<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Download and decrypt a shared file
    Download {
        /// Share link including the #key fragment
        link: String,

        /// Number of chunks, as shown on the download page
        #[arg(long)]
        total: u32,

        #[arg(long)]
        password: Option<String>,

        /// The file is password protected
        #[arg(long)]
        password_required: bool,

        /// Output path [default: the declared file name]
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(ws_url) = cli.ws_url {
        config.ws_url = ws_url;
    }
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    tracing::debug!(ws_url = %config.ws_url, base_url = %config.base_url, "configuration ready");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config, cli.command))
}
