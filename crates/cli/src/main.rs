//! trackflow CLI - learning track progression.

mod document;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use trackflow_core::{Identity, Level, ModuleId, TrackId, TrackStatus, UserId};
use trackflow_progress::{EngineConfig, TrackEngine, TrackFilter};
use trackflow_storage::{JsonStorage, Storage};

use crate::document::TrackDocument;

#[derive(Parser)]
#[command(name = "trackflow")]
#[command(about = "Learning track progression and access control", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory for the JSON store
    #[arg(short, long, default_value = ".trackflow", global = true)]
    data_dir: PathBuf,

    /// SQLite database URL; replaces the JSON store
    #[cfg(feature = "sqlite")]
    #[arg(long, global = true)]
    sqlite: Option<String>,

    /// Timeout for each store call, in milliseconds
    #[arg(long, default_value = "5000", global = true)]
    timeout_ms: u64,

    /// Acting user
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a track from a JSON document
    Import {
        /// Path to the document
        file: PathBuf,
    },
    /// List published tracks
    List {
        /// Text to search in titles, subtitles and categories
        #[arg(long)]
        search: Option<String>,
        /// Category filter (repeatable)
        #[arg(long = "category")]
        categories: Vec<String>,
        /// Level filter (repeatable)
        #[arg(long = "level")]
        levels: Vec<String>,
        /// Status filter (repeatable): not_started, in_progress, completed
        #[arg(long = "status")]
        statuses: Vec<String>,
        /// Maximum number of tracks
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show a track with its modules
    Show {
        /// Track ID
        track: String,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Start or resume a track
    Start {
        /// Track ID
        track: String,
    },
    /// Mark a module completed
    Complete {
        /// Track ID
        track: String,
        /// Module ID
        module: String,
    },
    /// Check whether a module may be opened
    Access {
        /// Track ID
        track: String,
        /// Module ID
        module: String,
    },
    /// Toggle the favorite flag
    Favorite {
        /// Track ID
        track: String,
    },
    /// Rate a track
    Review {
        /// Track ID
        track: String,
        /// Rating from 1 to 5
        #[arg(long)]
        rating: i64,
        /// Optional comment
        #[arg(long)]
        comment: Option<String>,
    },
    /// Remove your review
    Unreview {
        /// Track ID
        track: String,
    },
    /// Show the aggregate rating
    Rating {
        /// Track ID
        track: String,
    },
    /// Grant or revoke the premium tier
    SetPremium {
        /// User ID
        user_id: String,
        /// Revoke instead of grant
        #[arg(long)]
        off: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(feature = "sqlite")]
async fn open_sqlite(cli: &Cli) -> Result<Option<Arc<dyn Storage>>> {
    let Some(url) = &cli.sqlite else {
        return Ok(None);
    };
    let storage = trackflow_storage::SqliteStorage::new(url)
        .await
        .with_context(|| format!("opening {}", url))?;
    let storage: Arc<dyn Storage> = Arc::new(storage);
    Ok(Some(storage))
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite(_cli: &Cli) -> Result<Option<Arc<dyn Storage>>> {
    Ok(None)
}

async fn open_storage(cli: &Cli) -> Result<Arc<dyn Storage>> {
    if let Some(storage) = open_sqlite(cli).await? {
        return Ok(storage);
    }
    let storage = JsonStorage::new(&cli.data_dir)
        .await
        .with_context(|| format!("opening {}", cli.data_dir.display()))?;
    Ok(Arc::new(storage))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let storage = open_storage(&cli).await?;
    let engine = TrackEngine::new(storage).with_config(
        EngineConfig::default().with_store_timeout(Duration::from_millis(cli.timeout_ms)),
    );

    match &cli.command {
        Commands::Import { file } => {
            let raw = tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let doc: TrackDocument = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", file.display()))?;
            let (track, modules) = doc.into_parts()?;
            let track = engine.import_track(track, modules).await?;
            println!("Imported track: {} - {} ({} modules)", track.id, track.title, track.total_modules);
        }
        Commands::List { search, categories, levels, statuses, limit } => {
            let filter = TrackFilter {
                search: search.clone(),
                categories: categories.clone(),
                levels: levels
                    .iter()
                    .map(|l| l.parse::<Level>())
                    .collect::<std::result::Result<_, _>>()?,
                statuses: statuses
                    .iter()
                    .map(|s| parse_status(s).with_context(|| format!("unknown status {}", s)))
                    .collect::<Result<_>>()?,
                limit: *limit,
            };
            let caller = optional_identity(&engine, &cli).await?;
            let tracks = engine.list_tracks(&filter, caller.as_ref()).await?;

            println!("Tracks ({})", tracks.len());
            for entry in tracks {
                println!(
                    "  {} | {:<12} | {:>3}% | {}{}{}",
                    entry.track.id,
                    entry.track.level.as_str(),
                    entry.progress_percentage,
                    format_status(entry.status),
                    if entry.track.is_premium { " | PREMIUM" } else { "" },
                    if entry.is_favorite { " *" } else { "" },
                );
                println!("      {}", entry.track.title);
            }
        }
        Commands::Show { track, json } => {
            let caller = optional_identity(&engine, &cli).await?;
            let view = engine
                .track_with_modules(parse_track(track)?, caller.as_ref())
                .await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&view)?);
                return Ok(());
            }

            println!("Track: {}", view.track.id);
            println!("  Title: {}", view.track.title);
            if let Some(subtitle) = &view.track.subtitle {
                println!("  Subtitle: {}", subtitle);
            }
            println!("  Level: {}", view.track.level.as_str());
            println!("  Premium: {}", view.track.is_premium);
            match view.average_rating {
                Some(avg) => println!("  Rating: {:.1} ({} reviews)", avg, view.total_reviews),
                None => println!("  Rating: no reviews"),
            }
            if let Some(progress) = &view.user_progress {
                println!(
                    "  Progress: {}% ({})",
                    progress.progress_percentage,
                    format_status(progress.status())
                );
            }
            println!("  Modules:");
            for (i, module) in view.modules.iter().enumerate() {
                let state = view
                    .module_states
                    .get(i)
                    .map(|e| format!("{:?}", e.state).to_uppercase())
                    .unwrap_or_default();
                println!("    {}. {} | {} {}", module.order_index, module.id, module.title, state);
            }
        }
        Commands::Start { track } => {
            let identity = require_identity(&engine, &cli).await?;
            let view = engine.start_track(&identity, parse_track(track)?).await?;
            println!("Started {} at {}", view.track_id, view.started_at);
            if let Some(current) = view.current_module_id {
                println!("  Next module: {}", current);
            }
        }
        Commands::Complete { track, module } => {
            let identity = require_identity(&engine, &cli).await?;
            let snap = engine
                .complete_module(&identity, parse_track(track)?, parse_module(module)?)
                .await?;
            println!(
                "Progress: {}% ({}/{})",
                snap.progress.progress_percentage, snap.completed_modules, snap.total_modules
            );
            if !snap.newly_completed {
                println!("  Module was already completed");
            }
            if let Some(at) = snap.progress.completed_at {
                println!("  Track completed at {}", at);
            }
        }
        Commands::Access { track, module } => {
            let identity = require_identity(&engine, &cli).await?;
            let access = engine
                .check_module_access(&identity, parse_track(track)?, parse_module(module)?)
                .await?;
            match access.reason {
                None => println!("ALLOWED"),
                Some(reason) => println!("DENIED: {}", reason.as_str()),
            }
        }
        Commands::Favorite { track } => {
            let identity = require_identity(&engine, &cli).await?;
            let on = engine.toggle_favorite(&identity, parse_track(track)?).await?;
            println!("Favorite: {}", on);
        }
        Commands::Review { track, rating, comment } => {
            let identity = require_identity(&engine, &cli).await?;
            let review = engine
                .submit_review(&identity, parse_track(track)?, *rating, comment.as_deref())
                .await?;
            println!("Review {}: {} stars", review.id, review.rating.value());
        }
        Commands::Unreview { track } => {
            let identity = require_identity(&engine, &cli).await?;
            if engine.delete_review(&identity, parse_track(track)?).await? {
                println!("Review removed");
            } else {
                println!("No review to remove");
            }
        }
        Commands::Rating { track } => {
            let summary = engine.aggregate_rating(parse_track(track)?).await?;
            match summary.average_rating {
                Some(avg) => println!("{:.2} ({} reviews)", avg, summary.total_reviews),
                None => println!("No reviews"),
            }
        }
        Commands::SetPremium { user_id, off } => {
            engine.set_premium(UserId::new(user_id.as_str()), !off).await?;
            info!(user = %user_id, premium = !off, "premium updated");
            println!("{}: {}", user_id, if *off { "free" } else { "premium" });
        }
    }

    Ok(())
}

async fn optional_identity(engine: &TrackEngine, cli: &Cli) -> Result<Option<Identity>> {
    match &cli.user {
        Some(user) => Ok(Some(engine.identity(UserId::new(user.as_str())).await?)),
        None => Ok(None),
    }
}

async fn require_identity(engine: &TrackEngine, cli: &Cli) -> Result<Identity> {
    optional_identity(engine, cli)
        .await?
        .context("this command needs --user")
}

fn parse_track(s: &str) -> Result<TrackId> {
    s.parse().map_err(|_| anyhow::anyhow!("Invalid track ID: {}", s))
}

fn parse_module(s: &str) -> Result<ModuleId> {
    s.parse().map_err(|_| anyhow::anyhow!("Invalid module ID: {}", s))
}

fn parse_status(s: &str) -> Option<TrackStatus> {
    match s.to_lowercase().as_str() {
        "not_started" | "not-started" => Some(TrackStatus::NotStarted),
        "in_progress" | "in-progress" => Some(TrackStatus::InProgress),
        "completed" | "done" => Some(TrackStatus::Completed),
        _ => None,
    }
}

fn format_status(status: TrackStatus) -> &'static str {
    match status {
        TrackStatus::NotStarted => "NOT STARTED",
        TrackStatus::InProgress => "IN PROGRESS",
        TrackStatus::Completed => "COMPLETED",
    }
}
