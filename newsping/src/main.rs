/*
newsping - one-shot push-notification job.
Selects a few recent news posts at random, composes a randomized delivery
time and teaser for each, and sends them through the push service. Meant to
be invoked by an external scheduler (cron); each run is stateless and exits.
*/

use anyhow::Result;
use clap::Parser;
use common::Config;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sqlx::MySqlPool;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use newsping::compose::Composer;
use newsping::dispatch::PushClient;
use newsping::selection;

#[derive(Parser, Debug)]
#[command(
    name = "newsping",
    about = "Randomized push-notification job for recent news posts"
)]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Compose and log drafts without delivering them
    #[arg(long)]
    dry_run: bool,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() {
            Some(p)
        } else {
            None
        }
    };

    let config = match Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(%e, "failed to load configuration");
            return Err(e);
        }
    };
    info!(default = ?default_path, override_file = ?override_path, "configuration loaded");

    let pool = match common::init_db_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            error!(%e, host = %config.database.host, "failed to initialize database pool");
            return Err(e);
        }
    };

    // Run the single pass, then release the pool whatever the outcome was.
    let result = run_once(&pool, &config, args.dry_run).await;
    pool.close().await;

    if let Err(e) = &result {
        error!(%e, "run aborted");
    }
    result
}

/// One select -> compose -> deliver pass.
///
/// A query failure aborts the run (the caller still releases the pool). An
/// empty candidate set ends the run normally. A delivery failure is logged
/// per draft and never aborts the remaining drafts or the process.
async fn run_once(pool: &MySqlPool, config: &Config, dry_run: bool) -> Result<()> {
    let candidates = selection::fetch_recent_posts(pool).await?;

    let mut rng = StdRng::from_entropy();
    let selected = selection::select_posts(candidates, &mut rng);
    if selected.is_empty() {
        info!("no active posts from the last 7 days, nothing to notify about");
        return Ok(());
    }
    info!(count = selected.len(), "selected posts for notification");

    let push_client = if dry_run {
        info!("dry run: drafts will be logged, not delivered");
        None
    } else {
        match config.push.as_ref() {
            Some(push_cfg) => Some(PushClient::from_config(push_cfg)?),
            None => {
                info!("no [push] configuration, drafts will be logged only");
                None
            }
        }
    };

    let composer = Composer::new();
    for post in &selected {
        let draft = composer.compose(post, &mut rng);
        info!(
            time = %draft.scheduled_time(),
            title = %draft.title,
            "composed notification draft"
        );

        if let Some(client) = &push_client {
            match client.send(&draft).await {
                Ok(receipt) => {
                    info!(attempts = receipt.attempts, title = %draft.title, "notification delivered")
                }
                Err(e) => error!(%e, title = %draft.title, "failed to deliver notification"),
            }
        }
    }

    Ok(())
}
