use serde::{Deserialize, Serialize};

use super::EmbeddingModelIdentity;

/// Main configuration structure for Reembed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Embedding provider and current model
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Migration execution tuning
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Drift detection tuning
    #[serde(default)]
    pub drift: DriftConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".reembed/reembed.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Log file rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling JSON log files (stderr only when unset)
    #[serde(default)]
    pub log_dir: Option<String>,

    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: RotationPolicy::default(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    9210
}

const fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: default_true(),
        }
    }
}

/// Embedding provider configuration.
///
/// `model_name` + `provider` is the currently configured model identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    #[serde(default = "default_embedding_model")]
    pub model_name: String,

    /// Base URL of an OpenAI-compatible embeddings API
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,

    /// API key. Falls back to `OPENAI_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum texts per single API request
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Client-side request rate limit
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

const fn default_embedding_dimension() -> usize {
    1536
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_max_batch_size() -> usize {
    2048
}

const fn default_requests_per_second() -> u32 {
    10
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model_name: default_embedding_model(),
            base_url: default_embedding_base_url(),
            api_key: None,
            dimension: default_embedding_dimension(),
            request_timeout_secs: default_request_timeout_secs(),
            max_batch_size: default_max_batch_size(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

impl EmbeddingConfig {
    /// Identity of the configured model.
    pub fn current_model(&self) -> EmbeddingModelIdentity {
        EmbeddingModelIdentity::new(self.model_name.clone(), self.provider.clone())
    }
}

/// Migration execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MigrationConfig {
    /// Items re-embedded per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Attempts per batch before the task fails
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Upper bound on a single provider call
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// Recommended client polling interval
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Terminal tasks older than this are archived
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

const fn default_batch_size() -> usize {
    100
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_provider_timeout_secs() -> u64 {
    60
}

const fn default_poll_interval_secs() -> u64 {
    2
}

const fn default_retention_days() -> u32 {
    90
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            provider_timeout_secs: default_provider_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            retention_days: default_retention_days(),
        }
    }
}

/// Drift detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DriftConfig {
    /// Coverage gaps shorter than this are ignored
    #[serde(default = "default_gap_granularity_secs")]
    pub gap_granularity_secs: u64,
}

const fn default_gap_granularity_secs() -> u64 {
    86_400
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            gap_granularity_secs: default_gap_granularity_secs(),
        }
    }
}
