//! IPTV Playlists - command line front-end
//! Adds, refreshes and browses M3U playlists kept in the local store.

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iptv_playlists::catalog;
use iptv_playlists::config::AppConfig;
use iptv_playlists::fetcher::HttpSource;
use iptv_playlists::library::{Favorites, RecentlyWatched};
use iptv_playlists::scheduler::{UpdateInterval, UpdateScheduler, UPDATE_INTERVALS};
use iptv_playlists::storage::{FileStore, KeyValueStore};
use iptv_playlists::{Channel, PlaylistRepository};

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "iptv-playlists", version, about = "Manage IPTV M3U playlists")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download a playlist and add it
    Add {
        url: String,
        /// Display name, derived from the URL when omitted
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove a playlist
    Remove { id: String },
    /// Re-download one playlist, or all of them
    Refresh {
        id: Option<String>,
        /// New display name (single playlist only)
        #[arg(long, requires = "id")]
        name: Option<String>,
    },
    /// List playlists
    List,
    /// List channels
    Channels {
        #[arg(long)]
        playlist: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// List channel categories
    Categories,
    /// Find channels by name or category
    Search { query: String },
    /// Add or remove a channel from favorites
    Favorite { channel_id: String },
    /// List favorite channels
    Favorites,
    /// Print a channel's stream URL and remember it as watched
    Open { channel_id: String },
    /// List recently watched channels
    Recent {
        #[arg(long)]
        clear: bool,
    },
    /// Show or set the automatic update interval in minutes (0 = manual only)
    Interval { minutes: Option<u32> },
    /// Refresh all playlists if the update interval has elapsed
    Check {
        #[arg(long)]
        force: bool,
    },
    /// Keep running and refresh playlists on schedule
    Daemon {
        #[arg(long, default_value_t = 15)]
        poll_minutes: u64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    init_logging(&config.log_filter);

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(command: Command, config: &AppConfig) -> CliResult {
    let store: Arc<dyn KeyValueStore> = Arc::new(match &config.data_dir {
        Some(dir) => FileStore::new(dir)?,
        None => FileStore::default_location()?,
    });
    let source = Arc::new(HttpSource::new(config.http_options()));
    let repo = Arc::new(PlaylistRepository::open(store.clone(), source)?);

    match command {
        Command::Add { url, name } => {
            let playlist = repo.add_from_url(&url, name.as_deref())?;
            println!(
                "Added '{}' with {} channels (id {})",
                playlist.name,
                playlist.channels.len(),
                playlist.id
            );
        }
        Command::Remove { id } => {
            repo.remove(&id)?;
            println!("Removed {}", id);
        }
        Command::Refresh { id: Some(id), name } => {
            if repo.get(&id).is_none() {
                return Err(format!("no playlist with id {}", id).into());
            }
            repo.refresh_with_name(&id, name.as_deref())?;
            println!("Refreshed {}", id);
        }
        Command::Refresh { id: None, .. } => {
            let report = repo.refresh_all()?;
            println!(
                "Refreshed {} playlists, {} kept their previous channels",
                report.refreshed.len(),
                report.failed.len()
            );
        }
        Command::List => {
            for playlist in repo.playlists() {
                println!(
                    "{}  {}  {} channels  updated {}",
                    playlist.id,
                    playlist.name,
                    playlist.channels.len(),
                    playlist.last_updated.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                );
            }
        }
        Command::Channels { playlist, category } => {
            let playlists = match playlist {
                Some(id) => repo.get(&id).into_iter().collect(),
                None => repo.playlists(),
            };
            let channels = match &category {
                Some(category) => catalog::channels_in_category(&playlists, category),
                None => catalog::all_channels(&playlists).collect(),
            };
            print_channels(&channels);
        }
        Command::Categories => {
            let playlists = repo.playlists();
            for category in catalog::categories(&playlists) {
                println!("{}", category);
            }
        }
        Command::Search { query } => {
            let playlists = repo.playlists();
            print_channels(&catalog::search(&playlists, &query));
        }
        Command::Favorite { channel_id } => {
            let favorites = Favorites::open(store)?;
            if favorites.toggle(&channel_id)? {
                println!("Added {} to favorites", channel_id);
            } else {
                println!("Removed {} from favorites", channel_id);
            }
        }
        Command::Favorites => {
            let playlists = repo.playlists();
            let ids = Favorites::open(store)?.ids();
            print_channels(&catalog::resolve(&playlists, &ids));
        }
        Command::Open { channel_id } => {
            let playlists = repo.playlists();
            let channel = catalog::find_channel(&playlists, &channel_id)
                .ok_or_else(|| format!("no channel with id {}", channel_id))?;
            RecentlyWatched::open(store)?.add(&channel.id)?;
            println!("{}", channel.url);
        }
        Command::Recent { clear: true } => {
            RecentlyWatched::open(store)?.clear()?;
        }
        Command::Recent { clear: false } => {
            let playlists = repo.playlists();
            let ids = RecentlyWatched::open(store)?.ids();
            print_channels(&catalog::resolve(&playlists, &ids));
        }
        Command::Interval { minutes } => {
            let scheduler = UpdateScheduler::new(repo, store);
            if let Some(minutes) = minutes {
                scheduler.set_update_interval(UpdateInterval::from_minutes(minutes))?;
            }
            let current = scheduler.update_interval()?;
            println!("Update interval: {}", current.label());
            if minutes.is_none() {
                let choices: Vec<String> = UPDATE_INTERVALS
                    .iter()
                    .map(|(label, interval)| format!("{} ({})", interval.minutes(), label))
                    .collect();
                println!("Choices: {}", choices.join(", "));
            }
        }
        Command::Check { force } => {
            let scheduler = UpdateScheduler::new(repo, store);
            let ran = if force {
                scheduler.perform_update(Utc::now())?
            } else {
                scheduler.check_for_updates_if_needed(Utc::now())?
            };
            println!("{}", if ran { "Playlists updated" } else { "Playlists are up to date" });
        }
        Command::Daemon { poll_minutes } => {
            let scheduler = Arc::new(UpdateScheduler::new(repo, store));
            info!(poll_minutes, "starting update scheduler");
            scheduler.spawn(Duration::from_secs(poll_minutes.max(1) * 60)).wait();
        }
    }

    Ok(())
}

fn print_channels(channels: &[&Channel]) {
    for channel in channels {
        println!("{}  {}  [{}]  {}", channel.id, channel.name, channel.category, channel.url);
    }
}
