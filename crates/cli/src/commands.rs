use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;
use engine::{Engine, WalkOptions};

#[derive(Debug, Subcommand)]
#[command(rename_all = "snake_case")]
pub enum Command {
    /// Show known torrent clients and whether they are configured
    ListRpc,
    /// Show supported trackers
    ListTrackers,
    /// Show registered torrents
    ListTorrents,
    /// Show known notifiers and whether they are configured
    ListNotifiers,
    /// Configure a torrent client: `configure_rpc transmission host=nas port=9091`
    ConfigureRpc {
        alias: String,
        /// key=value pairs
        params: Vec<String>,
    },
    /// Configure a tracker, usually with username=... password=...
    ConfigureTracker { alias: String, params: Vec<String> },
    /// Configure a notifier
    ConfigureNotifier { alias: String, params: Vec<String> },
    /// Configure a chat bot
    ConfigureBot { alias: String, params: Vec<String> },
    /// Remove a notifier's settings
    RemoveNotifier { alias: String },
    /// Remove a bot's settings
    RemoveBot { alias: String },
    /// Check registered torrents for updates
    Walk {
        /// Ignore the walk interval
        #[arg(short, long)]
        forced: bool,
        /// Log errors and exit successfully
        #[arg(short, long)]
        silent: bool,
        /// Keep outdated torrents in the clients
        #[arg(long)]
        keep_outdated: bool,
        /// Save every fetched tracker page into this directory
        #[arg(long, value_name = "DIR")]
        dump: Option<PathBuf>,
    },
    /// Run chat bots until interrupted (all configured ones by default)
    RunBots { aliases: Vec<String> },
    /// Minimal number of hours between two walks
    SetWalkInterval { hours: u64 },
    EnableRpc { alias: String },
    DisableRpc { alias: String },
    /// Download a torrent from a tracker page, add it to every enabled client and register it
    AddTorrent {
        url: String,
        #[arg(short, long)]
        download_to: Option<String>,
    },
    /// Remove a torrent from every enabled client and unregister it
    RemoveTorrent {
        hash: String,
        /// Also delete downloaded data
        #[arg(short = 'd', long)]
        with_data: bool,
    },
    /// Register a torrent already present in a client
    RegisterTorrent {
        hash: String,
        /// Tracker page URL; the torrent comment is used when omitted
        #[arg(short, long)]
        url: Option<String>,
    },
    UnregisterTorrent { hash: String },
}

impl Command {
    /// Page dump directory requested by the command, if any.
    pub fn dump_dir(&self) -> Option<PathBuf> {
        match self {
            Command::Walk { dump, .. } => dump.clone(),
            _ => None,
        }
    }
}

fn settings(alias: &str, params: &[String]) -> anyhow::Result<model::PluginSettings> {
    model::parse_pairs(alias, params.iter().map(String::as_str))
        .with_context(|| format!("Bad parameters for {}", alias))
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

pub async fn handle_command(engine: &Arc<Engine>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::ListRpc => {
            for status in engine.rpc_statuses() {
                println!(
                    "{:<14} configured: {:<3}  enabled: {}",
                    status.alias,
                    yes_no(status.configured),
                    yes_no(status.enabled)
                );
            }
        }
        Command::ListTrackers => {
            for status in engine.tracker_statuses() {
                let kind = if status.login_required { "private" } else { "public" };
                let state = if status.active { "active" } else { "not configured" };
                println!("{:<18} {:<8} {}", status.alias, kind, state);
            }
        }
        Command::ListTorrents => {
            let torrents = engine.registered_torrents().await?;
            if torrents.is_empty() {
                println!("No torrents are registered");
            }
            for torrent in torrents {
                println!("{}  {}\n    {}", torrent.hash, torrent.display_name(), torrent.url);
            }
        }
        Command::ListNotifiers => {
            for status in engine.notifier_statuses() {
                println!("{:<14} configured: {}", status.alias, yes_no(status.configured));
            }
        }
        Command::ConfigureRpc { alias, params } => {
            engine.configure_rpc(&alias, settings(&alias, &params)?).await?;
            println!("{} is configured", alias);
        }
        Command::ConfigureTracker { alias, params } => {
            engine.configure_tracker(&alias, settings(&alias, &params)?).await?;
            println!("{} is configured", alias);
        }
        Command::ConfigureNotifier { alias, params } => {
            engine.configure_notifier(&alias, settings(&alias, &params)?).await?;
            println!("{} is configured", alias);
        }
        Command::ConfigureBot { alias, params } => {
            engine.configure_bot(&alias, settings(&alias, &params)?).await?;
            println!("{} is configured", alias);
        }
        Command::RemoveNotifier { alias } => engine.remove_notifier(&alias).await?,
        Command::RemoveBot { alias } => engine.remove_bot(&alias).await?,
        Command::Walk {
            forced,
            silent,
            keep_outdated,
            dump: _,
        } => {
            let report = engine
                .walk(WalkOptions {
                    forced,
                    silent,
                    remove_outdated: !keep_outdated,
                })
                .await?;
            if !report.postponed {
                for (old, new) in &report.updated {
                    println!("{} -> {}  {}", old, new.hash, new.display_name());
                }
                tracing::info!("{} torrent(s) updated", report.updated.len());
            }
        }
        Command::RunBots { aliases } => engine.run_bots(&aliases).await?,
        Command::SetWalkInterval { hours } => engine.set_walk_interval(hours).await?,
        Command::EnableRpc { alias } => engine.toggle_rpc(&alias, true).await?,
        Command::DisableRpc { alias } => engine.toggle_rpc(&alias, false).await?,
        Command::AddTorrent { url, download_to } => {
            let record = engine.add_torrent_from_url(&url, download_to.as_deref()).await?;
            println!("Added {}  {}", record.hash, record.display_name());
        }
        Command::RemoveTorrent { hash, with_data } => {
            engine.remove_torrent(&hash, with_data).await?;
            println!("Removed {}", hash);
        }
        Command::RegisterTorrent { hash, url } => {
            let record = engine.register_torrent(&hash, url.as_deref()).await?;
            println!("Registered {}  {}", record.hash, record.url);
        }
        Command::UnregisterTorrent { hash } => {
            if !engine.unregister_torrent(&hash).await? {
                anyhow::bail!("{} is not registered", hash);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::*;
    use crate::Cli;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_version_is_the_package_version() {
        assert_eq!(Cli::command().get_version(), Some(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_snake_case_subcommands() {
        let cli = Cli::try_parse_from(["retorrent", "configure_rpc", "transmission", "host=nas", "port=9091"]).unwrap();
        match cli.command {
            Command::ConfigureRpc { alias, params } => {
                assert_eq!(alias, "transmission");
                assert_eq!(params, ["host=nas", "port=9091"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_walk_flags() {
        let cli = Cli::try_parse_from(["retorrent", "walk", "-f", "--dump", "/tmp/pages", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.command.dump_dir(), Some(PathBuf::from("/tmp/pages")));
        assert!(matches!(
            cli.command,
            Command::Walk {
                forced: true,
                silent: false,
                keep_outdated: false,
                ..
            }
        ));
    }

    #[test]
    fn test_remove_torrent_with_data() {
        let cli = Cli::try_parse_from(["retorrent", "remove_torrent", "ABCD", "-d"]).unwrap();
        assert!(matches!(cli.command, Command::RemoveTorrent { with_data: true, .. }));
    }

    #[test]
    fn test_settings_from_pairs() {
        let table = settings("deluge", &["port=8112".into(), "password=x".into()]).unwrap();
        assert_eq!(table["port"].as_integer(), Some(8112));
        assert!(settings("deluge", &["nonsense".into()]).is_err());
    }
}
