use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::{Stream, StreamExt};
use std::path::PathBuf;
use std::time::Duration;

use newsdesk::config::Config;
use newsdesk::news::NewsApi;
use newsdesk::storage::{CachedArticle, Database, DatabaseError};
use newsdesk::util::{format_published, truncate_chars};
use newsdesk::{HeadlineRepository, NewsViewModel, RefreshStatus};

/// Longest title printed before truncation
const MAX_TITLE_CHARS: usize = 96;

/// Get the config directory path (~/.config/newsdesk/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newsdesk"))
}

#[derive(Parser, Debug)]
#[command(name = "newsdesk", about = "Top headlines with local bookmarks")]
struct Args {
    /// Config file (default: ~/.config/newsdesk/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Headline cache (default: ~/.config/newsdesk/headlines.db)
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Reset database (delete and recreate)
    #[arg(long)]
    reset_db: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch fresh headlines and print them (default)
    Refresh,
    /// Print cached headlines without touching the network
    List,
    /// Print bookmarked headlines
    Bookmarks,
    /// Bookmark a cached headline by its exact title
    Bookmark { title: String },
    /// Remove the bookmark from a cached headline
    Unbookmark { title: String },
    /// Print bookmarks whenever they change until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    // The cache holds the user's bookmarks; keep the directory user-only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = args
        .db
        .clone()
        .unwrap_or_else(|| config_dir.join("headlines.db"));
    if args.reset_db && db_path.exists() {
        std::fs::remove_file(&db_path).context("Failed to delete database")?;
        println!("Database reset.");
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of newsdesk appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let api = NewsApi::from_config(reqwest::Client::new(), &config)
        .context("Invalid news API settings")?;
    let view_model = NewsViewModel::new(HeadlineRepository::new(db, api));

    match args.command.unwrap_or(Command::Refresh) {
        Command::Refresh => refresh(&view_model).await,
        Command::List => {
            print_headlines(&first(view_model.cached_news()).await?);
            Ok(())
        }
        Command::Bookmarks => {
            print_headlines(&first(view_model.bookmarked_news()).await?);
            Ok(())
        }
        Command::Bookmark { title } => set_bookmark(&view_model, &title, true).await,
        Command::Unbookmark { title } => set_bookmark(&view_model, &title, false).await,
        Command::Watch => watch(&view_model, config.refresh_interval_minutes).await,
    }
}

async fn refresh(view_model: &NewsViewModel) -> Result<()> {
    let mut statuses = Box::pin(view_model.headline_news());
    while let Some(status) = statuses.next().await {
        match status {
            RefreshStatus::Loading => println!("Fetching headlines..."),
            RefreshStatus::Success(rows) => print_headlines(&rows),
            RefreshStatus::Error(message) => anyhow::bail!("Refresh failed: {}", message),
        }
    }
    Ok(())
}

async fn set_bookmark(view_model: &NewsViewModel, title: &str, bookmarked: bool) -> Result<()> {
    let rows = first(view_model.cached_news()).await?;
    let Some(article) = rows.iter().find(|r| r.title == title) else {
        anyhow::bail!(
            "No cached headline titled {:?}; run `newsdesk refresh` first",
            title
        );
    };

    if bookmarked {
        view_model.save_news(article).await?;
        println!("Bookmarked: {}", article.title);
    } else {
        view_model.delete_news(article).await?;
        println!("Bookmark removed: {}", article.title);
    }
    Ok(())
}

async fn watch(view_model: &NewsViewModel, interval_minutes: u64) -> Result<()> {
    let refresher = (interval_minutes > 0).then(|| {
        let view_model = view_model.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_period(interval_minutes));
            loop {
                ticker.tick().await;
                let mut statuses = Box::pin(view_model.headline_news());
                while let Some(status) = statuses.next().await {
                    if let RefreshStatus::Error(message) = status {
                        tracing::warn!(error = %message, "Scheduled refresh failed");
                    }
                }
            }
        })
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut bookmarks = Box::pin(view_model.bookmarked_news());

    let result = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Ok(()),
            next = bookmarks.next() => match next {
                Some(Ok(rows)) => {
                    println!("--- {} bookmarked ---", rows.len());
                    print_headlines(&rows);
                }
                Some(Err(e)) => break Err(e.into()),
                None => break Ok(()),
            },
        }
    };

    if let Some(handle) = refresher {
        handle.abort();
    }
    result
}

/// Longest period between scheduled refreshes in `watch`
const MAX_REFRESH_PERIOD: Duration = Duration::from_secs(30 * 24 * 60 * 60);

fn refresh_period(interval_minutes: u64) -> Duration {
    Duration::from_secs(interval_minutes.saturating_mul(60)).min(MAX_REFRESH_PERIOD)
}

/// Take the current snapshot from a watch stream.
async fn first<S>(stream: S) -> Result<Vec<CachedArticle>>
where
    S: Stream<Item = Result<Vec<CachedArticle>, DatabaseError>>,
{
    let mut stream = Box::pin(stream);
    match stream.next().await {
        Some(rows) => Ok(rows?),
        None => Ok(Vec::new()),
    }
}

fn print_headlines(rows: &[CachedArticle]) {
    if rows.is_empty() {
        println!("No headlines cached.");
        return;
    }
    for row in rows {
        let mark = if row.bookmarked { "*" } else { " " };
        println!(
            "{} {}  {}",
            mark,
            format_published(&row.published_at),
            truncate_chars(&row.title, MAX_TITLE_CHARS)
        );
        if let Some(url) = &row.url {
            println!("    {}", url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_period_minutes() {
        assert_eq!(refresh_period(15), Duration::from_secs(900));
    }

    #[test]
    fn test_refresh_period_saturates() {
        assert_eq!(refresh_period(u64::MAX), MAX_REFRESH_PERIOD);
        assert_eq!(refresh_period(1 << 62), MAX_REFRESH_PERIOD);
        assert!(refresh_period(1 << 62) > Duration::ZERO);
    }
}
