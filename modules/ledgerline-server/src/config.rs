use std::time::Duration;

use anyhow::{Context, Result};
use ledgerline_events::WriteMode;
use ledgerline_postgres::PoolConfig;

/// Server configuration loaded from environment variables (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    /// Absent selects the in-memory backend.
    pub database_url: Option<String>,
    pub web_host: String,
    pub web_port: u16,
    pub database_max_connections: u32,
    pub database_acquire_timeout: Duration,
    pub snapshot_write_mode: WriteMode,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            web_host: lookup("WEB_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            web_port: lookup("WEB_PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .context("WEB_PORT must be a port number")?,
            database_max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?,
            database_acquire_timeout: Duration::from_millis(
                lookup("DATABASE_ACQUIRE_TIMEOUT_MS")
                    .unwrap_or_else(|| "5000".to_string())
                    .parse()
                    .context("DATABASE_ACQUIRE_TIMEOUT_MS must be milliseconds")?,
            ),
            snapshot_write_mode: lookup("SNAPSHOT_WRITE_MODE")
                .unwrap_or_else(|| "APPEND".to_string())
                .parse()
                .map_err(anyhow::Error::msg)
                .context("SNAPSHOT_WRITE_MODE")?,
        };

        config.log_settings();
        Ok(config)
    }

    pub fn pool_config(&self) -> Option<PoolConfig> {
        let url = self.database_url.as_ref()?;
        Some(PoolConfig {
            database_url: url.clone(),
            max_connections: self.database_max_connections,
            acquire_timeout: self.database_acquire_timeout,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.web_host, self.web_port)
    }

    fn log_settings(&self) {
        let backend = if self.database_url.is_some() {
            "postgres"
        } else {
            "memory"
        };
        tracing::info!(
            backend,
            addr = %self.addr(),
            write_mode = %self.snapshot_write_mode,
            "Config loaded"
        );
    }
}
