/*!
common/src/lib.rs

Shared configuration types and DB helper functions for newsping.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader for a TOML config file, with default/override merging
- A helper to initialize the MySQL connection pool used by the job
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::MySqlPool;
use std::path::Path;
use std::time::Duration;

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// MySQL server hostname (e.g. "localhost")
    pub host: String,
    /// TCP port; defaults to 3306 when omitted
    pub port: Option<u16>,
    pub user: String,
    /// Password given inline. Prefer `password_env` for anything real.
    pub password: Option<String>,
    /// Name of an environment variable holding the password.
    /// Takes precedence over `password` when both are set.
    pub password_env: Option<String>,
    /// Database (schema) name holding the news tables
    pub name: String,
}

impl DatabaseConfig {
    /// Resolve the effective password, reading the environment when
    /// `password_env` is configured.
    pub fn resolve_password(&self) -> Result<Option<String>> {
        if let Some(var) = &self.password_env {
            let value = std::env::var(var)
                .with_context(|| format!("DB password env var '{}' not set", var))?;
            return Ok(Some(value));
        }
        Ok(self.password.clone())
    }
}

/// Push service configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Endpoint to POST notifications to. Defaults to the OneSignal
    /// create-notification endpoint when omitted (overridable for tests).
    pub api_url: Option<String>,
    /// OneSignal application id
    pub app_id: String,
    /// Name of an environment variable holding the REST API key
    pub api_key_env: String,
    /// Android notification channel to deliver through, if any
    pub android_channel_id: Option<String>,
    pub timeout_seconds: Option<u64>,
}

impl PushConfig {
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .with_context(|| format!("push API key env var '{}' not set", self.api_key_env))
    }
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub push: Option<PushConfig>,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(
        default_path: Option<&Path>,
        override_path: Option<&Path>,
    ) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        if let Some(path) = default_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read default config: {}", path.display()))?;
                let val: toml::Value =
                    toml::from_str(&data).context("Failed to parse default configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        if let Some(path) = override_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read override config: {}", path.display()))?;
                let val: toml::Value =
                    toml::from_str(&data).context("Failed to parse override configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        let cfg: Config = config_value
            .try_into()
            .context("Failed to parse merged configuration")?;
        Ok(cfg)
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Initialize the MySQL connection pool for the news database.
///
/// The pool is deliberately small: the job runs a single query per process, so
/// anything beyond a handful of connections is waste. Defaults:
/// - max_connections: 5
/// - acquire timeout: 10 seconds
///
/// Callers own the pool's lifetime and should `pool.close().await` on every
/// exit path once the run is over.
pub async fn init_db_pool(cfg: &DatabaseConfig) -> Result<MySqlPool> {
    let mut options = MySqlConnectOptions::new()
        .host(&cfg.host)
        .port(cfg.port.unwrap_or(3306))
        .username(&cfg.user)
        .database(&cfg.name);

    if let Some(password) = cfg.resolve_password()? {
        options = options.password(&password);
    }

    let pool = MySqlPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
        .with_context(|| {
            format!(
                "Failed to connect to MySQL database '{}' at {}",
                cfg.name, cfg.host
            )
        })?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_minimal_toml() {
        let toml = r#"
            [database]
            host = "localhost"
            user = "news"
            password = "secret"
            name = "newsdb"

            [push]
            app_id = "app-1234"
            api_key_env = "ONESIGNAL_API_KEY"
            android_channel_id = "news-channel"
        "#;

        let cfg: Config = toml::from_str(toml).expect("parse config");
        assert_eq!(cfg.database.host, "localhost");
        assert_eq!(cfg.database.port, None);
        let push = cfg.push.expect("push section");
        assert_eq!(push.app_id, "app-1234");
        assert_eq!(push.android_channel_id.as_deref(), Some("news-channel"));
        assert_eq!(push.api_url, None);
    }

    #[test]
    fn password_env_takes_precedence() {
        std::env::set_var("NEWSPING_TEST_DB_PASSWORD", "from-env");
        let cfg = DatabaseConfig {
            host: "localhost".into(),
            port: None,
            user: "news".into(),
            password: Some("inline".into()),
            password_env: Some("NEWSPING_TEST_DB_PASSWORD".into()),
            name: "newsdb".into(),
        };
        assert_eq!(cfg.resolve_password().unwrap().as_deref(), Some("from-env"));
    }

    #[tokio::test]
    async fn load_with_defaults_merges_override() {
        let dir = std::env::temp_dir().join(format!(
            "newsping_cfg_{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time")
                .as_millis()
        ));
        std::fs::create_dir_all(&dir).expect("create temp dir");

        let default_path = dir.join("config.default.toml");
        let override_path = dir.join("config.toml");
        std::fs::write(
            &default_path,
            r#"
            [database]
            host = "localhost"
            user = "news"
            name = "newsdb"
            "#,
        )
        .expect("write default");
        std::fs::write(
            &override_path,
            r#"
            [database]
            host = "db.internal"
            "#,
        )
        .expect("write override");

        let cfg = Config::load_with_defaults(Some(&default_path), Some(&override_path))
            .await
            .expect("load merged config");
        assert_eq!(cfg.database.host, "db.internal");
        assert_eq!(cfg.database.user, "news");
        assert!(cfg.push.is_none());
    }
}
