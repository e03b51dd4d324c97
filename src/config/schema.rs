//! Configuration schema definitions

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    /// External login service; optional, login2/phoneLogin return 503 without it
    #[serde(default)]
    pub identity_bridge: Option<IdentityBridgeConfig>,

    /// External face recognition service; optional, uploads go untagged without it
    #[serde(default)]
    pub recognition: Option<RecognitionConfig>,
}

/// Server configuration for the HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,

    /// Include error detail in logs meant for local debugging
    #[serde(default)]
    pub development: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            uploads_dir: default_uploads_dir(),
            development: false,
        }
    }
}

/// PostgreSQL connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default = "default_db_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_db_name")]
    pub dbname: String,

    /// Upper bound on concurrently checked-out connections
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Physical attempts per retryable query, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_db_name() -> String {
    "classpix".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_max_retries() -> u32 {
    3
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            user: default_db_user(),
            password: String::new(),
            dbname: default_db_name(),
            pool_size: default_pool_size(),
            max_retries: default_max_retries(),
        }
    }
}

impl DatabaseConfig {
    /// Connection string in tokio-postgres key/value form
    pub fn conn_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            self.host, self.port, self.user, self.password, self.dbname
        )
    }
}

/// Token signing and lifetime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC signing secret. Required; there is no built-in default.
    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default = "default_access_token_hours")]
    pub access_token_hours: i64,

    #[serde(default = "default_refresh_token_days")]
    pub refresh_token_days: i64,
}

fn default_access_token_hours() -> i64 {
    24
}

fn default_refresh_token_days() -> i64 {
    7
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            access_token_hours: default_access_token_hours(),
            refresh_token_days: default_refresh_token_days(),
        }
    }
}

/// External login service delegation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityBridgeConfig {
    pub base_url: String,

    #[serde(default = "default_bridge_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_bridge_timeout_secs() -> u64 {
    10
}

/// External face recognition service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    pub base_url: String,

    #[serde(default = "default_recognition_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_recognition_retries")]
    pub max_retries: u32,
}

fn default_recognition_timeout_secs() -> u64 {
    60
}

fn default_recognition_retries() -> u32 {
    3
}

impl Config {
    /// Reject configurations the server must not start with.
    ///
    /// The signing secret has no fallback: a missing secret is a startup
    /// error, not a silently shared development key.
    pub fn validate(&self) -> Result<()> {
        match self.auth.secret.as_deref() {
            None | Some("") => {
                return Err(Error::Config(
                    "auth.secret must be set (e.g. via ${CLASSPIX_SECRET})".to_string(),
                ))
            }
            Some(_) => {}
        }
        if self.database.pool_size == 0 {
            return Err(Error::Config("database.pool_size must be at least 1".to_string()));
        }
        if self.database.max_retries == 0 {
            return Err(Error::Config("database.max_retries must be at least 1".to_string()));
        }
        Ok(())
    }

    /// The signing secret, after `validate` has passed.
    pub fn secret(&self) -> &str {
        self.auth.secret.as_deref().unwrap_or_default()
    }
}
