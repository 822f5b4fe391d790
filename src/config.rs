//! Environment-driven configuration

use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::collections::HashMap;

/// 貸出台帳の保存先
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// PostgreSQL（行ロックとトランザクション）
    Postgres,
    /// プロセス内メモリ（行ごとのミューテックス）。起動時にサンプルデータを投入する
    Memory,
}

impl StorageBackend {
    fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Postgres => "postgres",
            StorageBackend::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage: StorageBackend,
    pub database_url: String,
    #[serde(rename = "db_max_connections")]
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            storage: StorageBackend::Postgres,
            database_url: "postgres://localhost/library".to_string(),
            max_connections: 10,
            run_migrations: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Unset variables fall back to the defaults. Call `dotenvy::dotenv()`
    /// first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Build from the process environment, or from `vars` when given
    fn load(vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("storage", defaults.storage.as_str())?
            .set_default("database_url", defaults.database_url)?
            .set_default("db_max_connections", i64::from(defaults.max_connections))?
            .set_default("run_migrations", defaults.run_migrations)?
            // HOST, PORT, STORAGE, DATABASE_URL, DB_MAX_CONNECTIONS, RUN_MIGRATIONS
            .add_source(Environment::default().try_parsing(true).source(vars))
            .build()?;

        config.try_deserialize()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
