use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::governor::{cache::DEFAULT_MAX_ENTRIES, CallPolicy, GovernorPolicy, RetryPlan};

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Gemini API key
    pub gemini_api_key: String,

    /// Gemini API base URL
    #[serde(default = "default_gemini_api_url")]
    pub gemini_api_url: String,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Use `streamGenerateContent` instead of single-shot requests
    #[serde(default)]
    pub gemini_stream: bool,

    /// Client-side timeout for one provider request
    #[serde(default = "default_gemini_timeout_secs")]
    pub gemini_timeout_secs: u64,

    /// Redis connection URL; results are cached in process memory when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Entry bound for the in-memory result cache
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_text_min_interval_secs")]
    pub text_min_interval_secs: u64,

    #[serde(default = "default_vision_min_interval_secs")]
    pub vision_min_interval_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,

    /// Number of entries in the backoff schedule
    #[serde(default = "default_backoff_steps")]
    pub backoff_steps: usize,

    #[serde(default = "default_recommendation_ttl_secs")]
    pub recommendation_ttl_secs: u64,

    #[serde(default = "default_vision_ttl_secs")]
    pub vision_ttl_secs: u64,

    #[serde(default = "default_profile_ttl_secs")]
    pub profile_ttl_secs: u64,

    /// Provider calls allowed per 24h window; unlimited when unset
    #[serde(default)]
    pub daily_call_limit: Option<u32>,
}

fn default_gemini_api_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_gemini_timeout_secs() -> u64 {
    60
}

fn default_cache_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_text_min_interval_secs() -> u64 {
    5
}

fn default_vision_min_interval_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    5
}

fn default_backoff_multiplier() -> u32 {
    2
}

fn default_backoff_steps() -> usize {
    5
}

fn default_recommendation_ttl_secs() -> u64 {
    2 * 60 * 60
}

fn default_vision_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_profile_ttl_secs() -> u64 {
    24 * 60 * 60
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn gemini_timeout(&self) -> Duration {
        Duration::from_secs(self.gemini_timeout_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the per-call-site pacing, caching and retry policy
    pub fn governor_policy(&self) -> AppResult<GovernorPolicy> {
        if self.daily_call_limit == Some(0) {
            return Err(AppError::Config(
                "DAILY_CALL_LIMIT must be positive when set".to_string(),
            ));
        }

        let retry = RetryPlan::geometric(
            self.max_attempts,
            Duration::from_secs(self.backoff_base_secs),
            self.backoff_multiplier,
            self.backoff_steps,
        )?;

        let text_interval = Duration::from_secs(self.text_min_interval_secs);

        Ok(GovernorPolicy {
            recommendation: CallPolicy {
                min_interval: text_interval,
                ttl: Duration::from_secs(self.recommendation_ttl_secs),
                retry: retry.clone(),
            },
            vision: CallPolicy {
                min_interval: Duration::from_secs(self.vision_min_interval_secs),
                ttl: Duration::from_secs(self.vision_ttl_secs),
                retry: retry.clone(),
            },
            profile: CallPolicy {
                min_interval: text_interval,
                ttl: Duration::from_secs(self.profile_ttl_secs),
                retry,
            },
            daily_call_limit: self.daily_call_limit,
        })
    }
}
