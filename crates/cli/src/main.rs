//! retorrent - keeps torrents in your client in sync with their tracker pages.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use engine::{Engine, FileStore};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracker::{HttpClient, HttpConfig};

#[derive(Parser)]
#[command(name = "retorrent", version)]
#[command(about = "Replaces outdated torrents with fresh ones from their tracker pages")]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,
    /// State file with plugin settings and registered torrents
    #[arg(long, global = true, env = "RETORRENT_CONFIG", default_value = "retorrent.toml")]
    config: PathBuf,
    /// Proxy URL for tracker traffic
    #[arg(long, global = true, env = "RETORRENT_TUNNEL")]
    tunnel: Option<String>,
    #[command(subcommand)]
    command: commands::Command,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let http = HttpClient::new(HttpConfig {
        tunnel: cli.tunnel.clone(),
        dump_dir: cli.command.dump_dir(),
        ..HttpConfig::default()
    })?;
    let store = Arc::new(FileStore::open(&cli.config).await?);
    tracing::debug!("Using state file {}", store.path().display());

    let engine = Arc::new(Engine::open(store, http).await?);
    commands::handle_command(&engine, cli.command).await
}
