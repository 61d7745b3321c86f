//! Command-line surface for `fetchcache`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "fetchcache", version, about = "Cache-first HTTP fetcher", long_about = None)]
pub struct Cli {
    /// TOML configuration file (overridden by FETCHCACHE_* variables)
    #[arg(long, global = true, env = "FETCHCACHE_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch a URL with GET, answering from the cache when possible
    Get(RequestArgs),
    /// POST a payload, cached by URL and payload
    Post(PayloadArgs),
    /// PUT a payload, cached by URL and payload
    Put(PayloadArgs),
    /// Drop the cache entry of a request
    Delete {
        #[command(flatten)]
        request: RequestArgs,
        /// Payload of the cached request, if it had one
        #[arg(long, default_value = "")]
        payload: String,
    },
    /// Remove expired entries from the SQLite cache
    Clean,
    /// Show the number of cached entries
    Stats,
}

#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    pub url: String,

    /// Extra request header, `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Explicit cache key replacing `url + payload` (repeatable)
    #[arg(short, long = "key")]
    pub keys: Vec<String>,

    /// Proxy for this request only
    #[arg(long)]
    pub proxy: Option<Url>,
}

#[derive(Args, Debug, Clone)]
pub struct PayloadArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Request body
    pub payload: String,
}

pub fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw.split_once(':').ok_or_else(|| format!("expected `Name: value`, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in {raw:?}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
