use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use sport_news::config::Config;
use sport_news::feed::FeedClient;
use sport_news::logging::{LogFormat, Logging};
use sport_news::scheduler::Scheduler;
use sport_news::storage::{Database, DatabaseError, DEFAULT_TEAM_ID};
use sport_news::sync::Synchronizer;

#[derive(Parser, Debug)]
#[command(
    name = "sport-news",
    about = "Keeps a local article store in sync with a club news feed"
)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, value_name = "FILE", default_value = "sport-news.toml")]
    config: PathBuf,

    /// Run one sync immediately and exit
    #[arg(long)]
    once: bool,

    /// Delete every stored article before starting
    #[arg(long)]
    reset_db: bool,

    /// Print stored articles for a team as JSON and exit
    #[arg(long, value_name = "TEAM", num_args = 0..=1, default_missing_value = DEFAULT_TEAM_ID)]
    list: Option<String>,

    /// Print a single stored article as JSON and exit
    #[arg(long, value_name = "ID")]
    show: Option<String>,

    /// Maximum number of articles printed by --list
    #[arg(long, value_name = "N")]
    limit: Option<i64>,

    /// Log output format
    #[arg(
        long,
        value_enum,
        env = "SPORT_NEWS_LOG_FORMAT",
        default_value_t = LogFormat::Text
    )]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Installed before the config is read so its warnings are not lost
    let logging = Logging::init(args.log_format);

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    config
        .apply_env()
        .context("Invalid SPORT_NEWS_* environment override")?;
    config.validate().context("Invalid configuration")?;

    logging
        .apply_level(&config.log_level)
        .context("Invalid log_level")?;

    let db_path = config
        .storage
        .database_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path).await {
        Ok(db) => db,
        Err(DatabaseError::Locked) => {
            eprintln!(
                "Error: Database {} is locked by another process. Please close it and try again.",
                db_path
            );
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    if args.reset_db {
        let removed = db.delete_all().await.context("Failed to reset database")?;
        tracing::info!(removed = removed, "Database reset");
        println!("Database reset: {} articles removed.", removed);
    }

    if let Some(team) = &args.list {
        if !db.team_exists(team).await? {
            eprintln!("No articles stored for team {}", team);
        }
        let articles = db.articles_for_team(team, args.limit).await?;
        println!("{}", serde_json::to_string_pretty(&articles)?);
        return Ok(());
    }

    if let Some(id) = &args.show {
        match db.article_by_id(DEFAULT_TEAM_ID, id).await? {
            Some(article) => println!("{}", serde_json::to_string_pretty(&article)?),
            None => {
                eprintln!("Article {} not found", id);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let feed = FeedClient::new(config.feed.base_url.clone())
        .context("Failed to build HTTP client")?
        .with_request_timeout(config.request_timeout());
    let sync = Synchronizer::new(Arc::new(db), feed, config.sync_settings());
    let scheduler = Scheduler::new(Arc::new(sync), config.interval());

    if args.once {
        match scheduler.run_once().await {
            Some(Ok(report)) => println!(
                "Sync complete: {} listed, {} new, {} inserted, {} dropped",
                report.listed, report.discovered, report.inserted, report.dropped
            ),
            Some(Err(e)) => return Err(e).context("Sync run failed"),
            None => {}
        }
        return Ok(());
    }

    if !config.feed.enabled {
        tracing::info!("Feed sync disabled, not scheduling");
        return Ok(());
    }

    let handle = scheduler.start();
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested, waiting for in-flight run");
    handle.shutdown().await;

    println!("Goodbye!");
    Ok(())
}
