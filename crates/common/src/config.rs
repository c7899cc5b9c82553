//! Application configuration.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Discover feed weights.
    #[serde(default)]
    pub discover: DiscoverWeights,
    /// Retry policy for backend calls.
    #[serde(default)]
    pub retry: RetrySettings,
    /// Admission limits for bulk backend writes.
    #[serde(default)]
    pub admission: AdmissionSettings,
    /// Expiry sweep schedule.
    #[serde(default)]
    pub sweep: SweepSettings,
    /// Remote function endpoints.
    #[serde(default)]
    pub functions: FunctionsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance.
    pub url: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Weights of the Discover feed score.
///
/// Every term is additive; the score is unbounded above.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoverWeights {
    /// Bonus when the viewer already follows the creator.
    pub follows_creator: f64,
    /// Per friend who joined the collection.
    pub per_friend_joined: f64,
    /// Per friend who starred the post.
    pub per_friend_starred: f64,
    /// Per friend who posted into the same collection.
    pub per_friend_posted: f64,
    /// Per friend who follows the creator.
    pub per_friend_following_creator: f64,
    /// Per unit of popularity (members or stars).
    pub popularity: f64,
    /// Popularity units beyond this are ignored.
    pub popularity_cap: f64,
    /// Recency bonus for brand-new content.
    pub recency_max: f64,
    /// Hours over which the recency bonus decays to zero.
    pub recency_window_hours: f64,
    /// Upper bound of the uniform freshness jitter.
    pub jitter_max: f64,
}

impl Default for DiscoverWeights {
    fn default() -> Self {
        Self {
            follows_creator: 10.0,
            per_friend_joined: 8.0,
            per_friend_starred: 6.0,
            per_friend_posted: 3.0,
            per_friend_following_creator: 4.0,
            popularity: 0.5,
            popularity_cap: 10.0,
            recency_max: 10.0,
            recency_window_hours: 10.0,
            jitter_max: 3.0,
        }
    }
}

/// Retry policy settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Delay cap, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

/// Admission limiter settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AdmissionSettings {
    /// Operations admitted per rolling window.
    pub max_per_window: usize,
    /// Window length in seconds.
    pub window_secs: u64,
    /// Operations allowed in flight at once.
    pub max_concurrent: usize,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            max_per_window: 30,
            window_secs: 60,
            max_concurrent: 5,
        }
    }
}

/// Expiry sweep settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SweepSettings {
    /// Whether the background sweeps run at all.
    pub enabled: bool,
    /// Days a soft-deleted collection is kept before purge.
    pub collection_retention_days: i64,
    /// Seconds between collection purge runs.
    pub collection_interval_secs: u64,
    /// Hours a notification lives.
    pub notification_ttl_hours: i64,
    /// Seconds between notification purge runs.
    pub notification_interval_secs: u64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            collection_retention_days: 15,
            collection_interval_secs: 3600,
            notification_ttl_hours: 24,
            notification_interval_secs: 600,
        }
    }
}

/// Remote function configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FunctionsConfig {
    /// Base URL of the block/unblock functions. Direct writes are used when unset.
    pub base_url: Option<String>,
    /// Bearer token presented to the functions endpoint.
    pub token: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `COTERIE_ENV`)
    /// 3. Environment variables with `COTERIE__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("COTERIE_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("COTERIE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
