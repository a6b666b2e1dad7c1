// showcache - Episode rotation with a bounded local cache
// Copyright (C) 2025 The showcache contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use showcache::catalog::EpisodeCatalog;
use showcache::download::FetchOutcome;
use showcache::storage::{Database, SqliteCredentialStore};
use showcache::{logging, AppContext, Credentials, LoadOutcome, WatchConfig, WatchEvent};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "showcache-cli")]
#[command(about = "showcache CLI - Desktop testing tool", long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print every event
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file with default values
    Init,
    /// Store credentials in the local database
    Credentials {
        #[arg(long)]
        access_key_id: String,
        #[arg(long)]
        secret_access_key: String,
        #[arg(long)]
        bucket: String,
    },
    /// List groups in the bucket
    Groups,
    /// Load a group and print its episodes in order
    List {
        group: String,
        /// Apply the weighted shuffle
        #[arg(short, long)]
        shuffle: bool,
    },
    /// Download upcoming episodes
    Prefetch {
        group: String,
        #[arg(short, default_value_t = 1)]
        n: usize,
    },
    /// Download one episode now
    Fetch { group: String, key: String },
    /// Mark an episode as played
    Finish { group: String, key: String },
    /// Rate an episode (0-5)
    Rate {
        group: String,
        key: String,
        rating: u8,
    },
    /// Rebuild the cache tiers from disk
    Warm { group: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(logging::DEFAULT_FILTER);
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(WatchConfig::config_path);
    let config = WatchConfig::load_or_default(Some(config_path.as_path()))
        .with_context(|| format!("loading {}", config_path.display()))?;

    match &cli.command {
        Commands::Init => {
            if config_path.exists() {
                bail!("{} already exists", config_path.display());
            }
            config.save(&config_path)?;
            println!("Wrote {}", config_path.display());
            return Ok(());
        }
        Commands::Credentials {
            access_key_id,
            secret_access_key,
            bucket,
        } => {
            let database = Database::new(&config.paths.database_path).await?;
            let store = SqliteCredentialStore::new(database.pool().clone());
            let credentials = Credentials {
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                bucket_name: bucket.clone(),
            };
            credentials.save(&store).await?;
            database.close().await?;
            println!("Saved credentials for bucket {}", credentials.bucket_name);
            return Ok(());
        }
        _ => {}
    }

    let verbose = cli.verbose;
    let events = Arc::new(move |event: WatchEvent| {
        if verbose {
            println!("[{}] {:?}", event.kind(), event);
        } else if let WatchEvent::LoadError { message, .. } | WatchEvent::DownloadError { message, .. } = &event {
            eprintln!("{}: {}", event.kind(), message);
        }
    });
    let context = AppContext::new(&config, events).await?;

    match cli.command {
        Commands::Groups => {
            for group in context.coordinator().list_groups().await? {
                println!("{}", group);
            }
        }
        Commands::List { group, shuffle } => {
            let catalog = load(&context, &group, shuffle).await?;
            for (index, episode) in catalog.episodes().iter().enumerate() {
                let played = episode
                    .last_played
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:>3}  {}  rating {}  played {}",
                    index + 1,
                    episode.printable_title(),
                    episode.rating,
                    played
                );
            }
            catalog.flush_preferences().await;
        }
        Commands::Prefetch { group, n } => {
            let catalog = load(&context, &group, true).await?;
            let report = catalog.prefetch_upcoming(n).await;
            for (key, path) in &report.local {
                println!("{} already at {}", key, path.display());
            }
            for handle in report.started {
                let key = handle.key().to_string();
                let poller = context.watch_progress(
                    handle.monitor(),
                    Arc::new({
                        let key = key.clone();
                        move |fraction: f64| println!("{} {:>5.1}%", key, fraction * 100.0)
                    }),
                );
                let result = handle.wait().await;
                poller.cancel();
                match result {
                    Ok(done) => println!("{} -> {}", key, done.path.display()),
                    Err(e) => eprintln!("{} failed: {}", key, e.user_message()),
                }
            }
            if report.at_capacity {
                println!("Download limit reached");
            }
            catalog.flush_preferences().await;
        }
        Commands::Fetch { group, key } => {
            let catalog = load(&context, &group, false).await?;
            let Some(episode) = catalog.episode(&key) else {
                bail!("no episode {} in {}", key, group);
            };
            match context.coordinator().fetch(&episode).await? {
                FetchOutcome::Local(path) => println!("Already at {}", path.display()),
                FetchOutcome::InFlight => println!("Already downloading"),
                FetchOutcome::AtCapacity => println!("Download limit reached"),
                FetchOutcome::Started(handle) => {
                    let done = handle.wait().await?;
                    println!("{} -> {}", key, done.path.display());
                }
            }
        }
        Commands::Finish { group, key } => {
            let catalog = load(&context, &group, false).await?;
            match catalog.episode_finished(&key).await {
                Some(path) => println!("Played file kept at {}", path.display()),
                None => println!("Played file removed"),
            }
            catalog.flush_preferences().await;
        }
        Commands::Rate { group, key, rating } => {
            let catalog = load(&context, &group, false).await?;
            if !catalog.set_rating(&key, rating) {
                bail!("no episode {} in {}", key, group);
            }
            catalog.flush_preferences().await;
            println!("Rated {} {}", key, rating.min(showcache::episode::MAX_RATING));
        }
        Commands::Warm { group } => {
            let report = context.cache().warm_cache(&group).await?;
            println!(
                "cache {}  precache {}  demoted {}",
                report.cached, report.precached, report.demoted
            );
        }
        Commands::Init | Commands::Credentials { .. } => {}
    }

    context.shutdown().await?;
    Ok(())
}

async fn load(context: &AppContext, group: &str, shuffle: bool) -> anyhow::Result<EpisodeCatalog> {
    let catalog = context.catalog();
    match catalog.load_group(group, shuffle).await? {
        LoadOutcome::Loaded {
            count,
            has_changes,
            failures,
        } => {
            if failures > 0 {
                eprintln!("Loaded {} episodes with {} failed source(s)", count, failures);
            } else if has_changes {
                println!("Loaded {} episodes (preferences updated)", count);
            }
        }
        other => bail!("load did not complete: {:?}", other),
    }
    Ok(catalog)
}
