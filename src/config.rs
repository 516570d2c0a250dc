use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Base URL prepended to resource and public URLs; empty keeps them relative.
    pub public_url: String,
    pub max_concurrent_deliveries: usize,
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Content-addressed resource store with webhook notifications")]
pub struct Args {
    /// Host to bind to (overrides RESOURCE_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides RESOURCE_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where resource blobs are stored (overrides RESOURCE_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides RESOURCE_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// External base URL (overrides RESOURCE_STORE_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Upper bound on in-flight webhook deliveries (overrides RESOURCE_STORE_MAX_DELIVERIES)
    #[arg(long)]
    pub max_concurrent_deliveries: Option<usize>,

    /// Maximum multipart body size in bytes (overrides RESOURCE_STORE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("RESOURCE_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_number("RESOURCE_STORE_PORT", 8080u16)?;
        let env_storage =
            env::var("RESOURCE_STORE_STORAGE_DIR").unwrap_or_else(|_| "./data/storage".into());
        let env_db = env::var("RESOURCE_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/resource_store.db".into());
        let env_public_url = env::var("RESOURCE_STORE_PUBLIC_URL").unwrap_or_default();
        let env_deliveries = env_number("RESOURCE_STORE_MAX_DELIVERIES", 32usize)?;
        let env_upload = env_number("RESOURCE_STORE_MAX_UPLOAD_BYTES", 1usize << 30)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_url: args
                .public_url
                .unwrap_or(env_public_url)
                .trim_end_matches('/')
                .to_string(),
            max_concurrent_deliveries: args
                .max_concurrent_deliveries
                .unwrap_or(env_deliveries)
                .max(1),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_upload),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_number<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
