//! Settings of the `loyalty` binary.
//!
//! Sources, lowest priority first: built-in defaults, `settings.toml` (or the
//! file given with `--config`), `LOYALTY__*` environment variables, and the
//! `-a`/`-d`/`-r` flags with their `RUN_ADDRESS`, `DATABASE_URI` and
//! `ACCRUAL_SYSTEM_ADDRESS` environment fallbacks.

use std::time::Duration;

use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use engine::PoolConfig;
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "settings";

#[derive(Debug, Parser)]
#[command(name = "loyalty", version, about = "Loyalty order reconciliation service")]
struct Args {
    /// Optional config file path (TOML).
    #[arg(long)]
    config: Option<String>,
    /// Address the HTTP server binds to.
    #[arg(short = 'a', env = "RUN_ADDRESS")]
    address: Option<String>,
    /// Database connection string.
    #[arg(short = 'd', env = "DATABASE_URI")]
    database: Option<String>,
    /// Base address of the accrual authority.
    #[arg(short = 'r', env = "ACCRUAL_SYSTEM_ADDRESS")]
    accrual: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    /// Path of a sqlite file, created if missing.
    Sqlite(String),
    /// Connection string passed to the driver as is.
    Url(String),
}

#[derive(Debug, Deserialize)]
pub struct Accrual {
    pub address: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Workers {
    pub count: Option<usize>,
    pub queue_capacity: usize,
    pub poll_interval_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub max_attempts: u32,
}

impl Workers {
    pub fn pool_config(&self) -> PoolConfig {
        let defaults = PoolConfig::default();
        PoolConfig {
            workers: self.count.unwrap_or(defaults.workers),
            queue_capacity: self.queue_capacity,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
            max_attempts: self.max_attempts,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    pub server: Server,
    pub database: Database,
    pub accrual: Accrual,
    pub workers: Workers,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let args = Args::parse();
        let config_path = args.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
        let settings = Self::builder(config_path)?.build()?;
        let mut settings: Self = settings.try_deserialize()?;

        if let Some(address) = args.address {
            settings.server.address = address;
        }
        if let Some(database) = args.database {
            settings.database = Database::Url(database);
        }
        if let Some(accrual) = args.accrual {
            settings.accrual.address = accrual;
        }

        Ok(settings)
    }

    fn builder(
        config_path: &str,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let defaults = PoolConfig::default();
        Ok(Config::builder()
            .set_default("app.level", "info")?
            .set_default("server.address", "localhost:8081")?
            .set_default("database", "memory")?
            .set_default("accrual.address", "http://localhost:8080")?
            .set_default("accrual.timeout_ms", 5_000)?
            .set_default("workers.queue_capacity", defaults.queue_capacity as u64)?
            .set_default(
                "workers.poll_interval_ms",
                defaults.poll_interval.as_millis() as u64,
            )?
            .set_default(
                "workers.backoff_base_ms",
                defaults.backoff_base.as_millis() as u64,
            )?
            .set_default(
                "workers.backoff_max_ms",
                defaults.backoff_max.as_millis() as u64,
            )?
            .set_default("workers.max_attempts", defaults.max_attempts)?
            .add_source(File::with_name(config_path).required(false))
            .add_source(
                Environment::with_prefix("LOYALTY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            ))
    }
}
