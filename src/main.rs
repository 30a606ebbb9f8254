use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use artshelf::collection::{CollectionReader, CollectionScanner, LocalHost, WorkAssembler};
use artshelf::config::{self, AppConfig};
use artshelf::{CollectionSession, LoadOutcome, Work};

/// Browse and search a local art collection / 本地作品集浏览与搜索
#[derive(Parser, Debug)]
#[command(
    name = "artshelf",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("BUILD_TIME"), ")"),
    about
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a collection and print every work as it is discovered / 扫描集合
    Scan {
        collection: PathBuf,
    },
    /// Load a collection and search it / 搜索集合
    Search {
        collection: PathBuf,
        query: String,
    },
    /// Manage the favorites list of a collection / 管理收藏夹
    Favorites {
        collection: PathBuf,
        #[command(subcommand)]
        action: FavoritesAction,
    },
}

#[derive(Subcommand, Debug)]
enum FavoritesAction {
    /// Print the list / 列出
    List,
    /// Add works by relative path / 添加
    Add { paths: Vec<String> },
    /// Remove works by relative path / 移除
    Remove { paths: Vec<String> },
    /// Empty the list / 清空
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "artshelf=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration / 加载配置
    let app_config = config::init_config().map_err(|e| anyhow!(e))?.read().clone();

    match cli.command {
        Command::Scan { collection } => scan(&app_config, collection).await,
        Command::Search { collection, query } => search(&app_config, collection, &query).await,
        Command::Favorites { collection, action } => favorites(&app_config, collection, action).await,
    }
}

async fn scan(app_config: &AppConfig, collection: PathBuf) -> Result<()> {
    let scanner = CollectionScanner::new(WorkAssembler::default(), app_config.scan.scan_options());
    let host = Arc::new(LocalHost::new(scanner, app_config.scan.max_chunk_works));
    let mut chunks = Box::pin(CollectionReader::new(host, &collection, app_config.scan.poll_interval()).into_stream());

    let mut works = 0;
    let mut warnings = 0;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.with_context(|| format!("Cannot scan {}", collection.display()))?;
        for work in &chunk.works {
            print_work(work);
        }
        for warning in &chunk.warnings {
            eprintln!("warning: {}", warning);
        }
        works += chunk.works.len();
        warnings += chunk.warnings.len();
    }
    println!("{} works, {} warnings", works, warnings);
    Ok(())
}

async fn search(app_config: &AppConfig, collection: PathBuf, query: &str) -> Result<()> {
    let session = load(app_config, &collection).await?;
    session.search_ready().await?;

    let mut results = session
        .search(query)
        .await?
        .ok_or_else(|| anyhow!("search index is not ready"))?;
    let total = results.len();
    if app_config.search.max_results > 0 {
        results.truncate(app_config.search.max_results);
    }
    for work in &results {
        print_work(work);
    }
    println!("{} of {} matching works", results.len(), total);
    Ok(())
}

async fn favorites(app_config: &AppConfig, collection: PathBuf, action: FavoritesAction) -> Result<()> {
    let session = load(app_config, &collection).await?;
    let store = session
        .favorites()
        .ok_or_else(|| anyhow!("list '{}' is not available", app_config.favorites.list_name))?;

    match action {
        FavoritesAction::List => {}
        FavoritesAction::Add { paths } => {
            let works = paths
                .iter()
                .map(|path| session.find_work(path).ok_or_else(|| anyhow!("no work at '{}'", path)))
                .collect::<Result<Vec<Work>>>()?;
            store.add(&works).await?;
        }
        FavoritesAction::Remove { paths } => {
            let works: Vec<Work> = paths
                .iter()
                .filter_map(|path| {
                    let work = session.find_work(path);
                    if work.is_none() {
                        tracing::warn!("No work at {}", path);
                    }
                    work
                })
                .collect();
            store.remove(&works).await?;
        }
        FavoritesAction::Clear => store.clear().await?,
    }

    for work in store.works().await {
        print_work(&work);
    }
    Ok(())
}

async fn load(app_config: &AppConfig, collection: &Path) -> Result<CollectionSession> {
    let session = CollectionSession::from_config(app_config);
    match session.load(collection).await? {
        LoadOutcome::Loaded { works, warnings } => {
            for warning in session.warnings() {
                eprintln!("warning: {}", warning);
            }
            tracing::info!("{} works loaded, {} warnings", works, warnings);
            Ok(session)
        }
        LoadOutcome::Superseded => bail!("loading {} was interrupted", collection.display()),
    }
}

fn print_work(work: &Work) {
    let tags = work.tags.as_ref().map(|tags| tags.join(", ")).unwrap_or_default();
    if tags.is_empty() {
        println!("{}\t{}", work.relative_path, work.title);
    } else {
        println!("{}\t{}\t[{}]", work.relative_path, work.title, tags);
    }
}
