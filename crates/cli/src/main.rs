//! fetchcache entry point.
//!
//! Fetched bodies go to stdout untouched; logs go to stderr as JSON.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

use args::{Cli, Commands, RequestArgs};
use fetchcache_client::fetch::{Method, header_map};
use fetchcache_client::{CachingConfig, CachingFetcher, FetchConfig, FetchRequest, Fetcher};
use fetchcache_core::{AppConfig, CacheBackend, CacheStore, Closer, DirectoryStore, SqliteCache, TtlCacheStore};

mod args;

/// The configured store, kept concrete for the backend-specific commands.
enum Store {
    Directory(Arc<DirectoryStore>),
    Sqlite(Arc<SqliteCache>),
}

impl Store {
    async fn open(config: &AppConfig) -> Result<Self> {
        let store = match config.backend {
            CacheBackend::Directory => Self::Directory(Arc::new(
                DirectoryStore::open(&config.cache_dir)
                    .await
                    .with_context(|| format!("opening cache directory {}", config.cache_dir.display()))?,
            )),
            CacheBackend::Sqlite => Self::Sqlite(Arc::new(
                SqliteCache::open_with_ttl(&config.db_path, &config.namespace, config.default_ttl())
                    .await
                    .with_context(|| format!("opening cache database {}", config.db_path.display()))?,
            )),
        };
        Ok(store)
    }

    fn shared(&self) -> Arc<dyn CacheStore> {
        match self {
            Self::Directory(store) => store.clone(),
            Self::Sqlite(store) => store.clone(),
        }
    }

    async fn entries(&self) -> Result<u64> {
        match self {
            Self::Directory(store) => {
                let mut count = 0;
                let mut dir = tokio::fs::read_dir(store.root()).await?;
                while let Some(entry) = dir.next_entry().await? {
                    if entry.file_type().await?.is_file() {
                        count += 1;
                    }
                }
                Ok(count)
            }
            Self::Sqlite(store) => Ok(store.count().await?),
        }
    }

    async fn close(&self) -> Result<()> {
        if let Self::Sqlite(store) = self {
            store.close().await?;
        }
        Ok(())
    }
}

fn build_request(method: Method, args: RequestArgs, payload: String) -> Result<FetchRequest> {
    let headers: BTreeMap<String, String> = args.headers.into_iter().collect();
    let mut request = FetchRequest::new(method, args.url)
        .with_payload(payload)
        .with_headers(header_map(&headers)?)
        .with_keys(args.keys);
    if let Some(proxy) = args.proxy {
        request = request.with_proxy(proxy);
    }
    Ok(request)
}

async fn run(cli: Cli, config: &AppConfig, store: &Store) -> Result<()> {
    let fetch_config = FetchConfig::try_from(config)?;
    let fetcher = CachingFetcher::new(store.shared(), CachingConfig::new(fetch_config))?;

    let request = match cli.command {
        Commands::Get(args) => build_request(Method::GET, args, String::new())?,
        Commands::Post(args) => build_request(Method::POST, args.request, args.payload)?,
        Commands::Put(args) => build_request(Method::PUT, args.request, args.payload)?,
        Commands::Delete { request, payload } => {
            let request = build_request(Method::GET, request, payload)?;
            fetcher.delete_cache(&request).await?;
            tracing::info!(key = %fetcher.cache_key(&request), "cache entry deleted");
            return Ok(());
        }
        Commands::Clean => {
            let Store::Sqlite(sqlite) = store else {
                bail!("clean needs the sqlite backend; directory entries never expire");
            };
            let removed = sqlite.clean_expired().await?;
            println!("{removed}");
            return Ok(());
        }
        Commands::Stats => {
            println!("{}", store.entries().await?);
            return Ok(());
        }
    };

    let body = fetcher.fetch(request).await?;
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&body).await?;
    stdout.flush().await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    tracing::debug!(backend = ?config.backend, "configuration loaded");

    let store = Store::open(&config).await?;
    let result = run(cli, &config, &store).await;
    let closed = store.close().await;

    finish(result, closed)
}

/// Outcome of a run whose store has been closed; the command's own error wins.
fn finish(result: Result<()>, closed: Result<()>) -> Result<()> {
    match (result, closed) {
        (Ok(()), closed) => closed.context("closing cache store"),
        (Err(err), Err(close_err)) => {
            tracing::warn!(error = %close_err, "failed to close cache store");
            Err(err)
        }
        (Err(err), Ok(())) => Err(err),
    }
}
