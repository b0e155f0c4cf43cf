use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub static_dir: String,
    pub max_upload_bytes: usize,
    /// Run on the in-memory stores instead of SQLite + disk.
    pub in_memory: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "WallPoll wallpaper voting server")]
pub struct Args {
    /// Host to bind to (overrides WALLPOLL_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides WALLPOLL_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where image payloads are stored (overrides WALLPOLL_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides WALLPOLL_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory of frontend assets (overrides WALLPOLL_STATIC_DIR)
    #[arg(long)]
    pub static_dir: Option<String>,

    /// Maximum upload request size in bytes (overrides WALLPOLL_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Keep all state in memory; nothing is written to disk
    #[arg(long)]
    pub in_memory: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read an optional numeric env var, failing loudly on garbage.
fn parse_var<T>(
    lookup: &impl Fn(&str) -> Result<String, env::VarError>,
    name: &str,
    default: T,
) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        Self::from_sources(Args::parse(), |name| env::var(name))
    }

    /// Merge `args` over the variables visible through `lookup`.
    pub fn from_sources(
        args: Args,
        lookup: impl Fn(&str) -> Result<String, env::VarError>,
    ) -> Result<(Self, bool)> {
        // --- Environment fallback ---
        let env_host = lookup("WALLPOLL_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_var(&lookup, "WALLPOLL_PORT", 8787u16)?;
        let env_storage =
            lookup("WALLPOLL_STORAGE_DIR").unwrap_or_else(|_| "./data/images".into());
        let env_db = lookup("WALLPOLL_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/wallpoll.db".into());
        let env_static = lookup("WALLPOLL_STATIC_DIR").unwrap_or_else(|_| "./public".into());
        let env_max_upload =
            parse_var(&lookup, "WALLPOLL_MAX_UPLOAD_BYTES", 10 * 1024 * 1024usize)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            static_dir: args.static_dir.unwrap_or(env_static),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
            in_memory: args.in_memory,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn static_path(&self) -> PathBuf {
        PathBuf::from(&self.static_dir)
    }
}
