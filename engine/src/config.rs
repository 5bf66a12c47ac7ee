use std::time::Duration;

/// Engine configuration, loaded from the environment. All knobs have safe
/// defaults so the engine runs without any configuration in tests.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the content-generator service.
    pub generator_base_url: String,
    /// Disables outbound generator calls entirely (local fallbacks only).
    pub generator_enabled: bool,
    /// Per-request timeout for generator calls.
    pub generator_timeout: Duration,
    /// Transport-level retry attempts for generator calls.
    pub generator_retry_attempts: u32,
    /// Fixed backoff between generator retries.
    pub generator_retry_backoff: Duration,
    /// Attempts when loading a chat that may not be visible yet.
    pub chat_load_attempts: u32,
    /// Fixed delay between chat load attempts.
    pub chat_load_delay: Duration,
    /// Time-to-live for cached flow patterns.
    pub flow_cache_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            generator_base_url: "http://localhost:8000".to_string(),
            generator_enabled: true,
            generator_timeout: Duration::from_millis(3000),
            generator_retry_attempts: 3,
            generator_retry_backoff: Duration::from_millis(200),
            chat_load_attempts: 3,
            chat_load_delay: Duration::from_millis(200),
            flow_cache_ttl: Duration::from_secs(300),
        }
    }
}

impl EngineConfig {
    /// Read configuration from the environment (and `.env` if present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Self {
            generator_base_url: env_string("MENTORA_GENERATOR_URL")
                .unwrap_or(defaults.generator_base_url),
            generator_enabled: env_bool("MENTORA_GENERATOR_ENABLED")
                .unwrap_or(defaults.generator_enabled),
            generator_timeout: env_millis("MENTORA_GENERATOR_TIMEOUT_MS")
                .unwrap_or(defaults.generator_timeout),
            generator_retry_attempts: env_u32("MENTORA_GENERATOR_RETRY_ATTEMPTS")
                .unwrap_or(defaults.generator_retry_attempts),
            generator_retry_backoff: env_millis("MENTORA_GENERATOR_RETRY_BACKOFF_MS")
                .unwrap_or(defaults.generator_retry_backoff),
            chat_load_attempts: env_u32("MENTORA_CHAT_LOAD_ATTEMPTS")
                .unwrap_or(defaults.chat_load_attempts),
            chat_load_delay: env_millis("MENTORA_CHAT_LOAD_DELAY_MS")
                .unwrap_or(defaults.chat_load_delay),
            flow_cache_ttl: env_millis("MENTORA_FLOW_CACHE_TTL_MS")
                .unwrap_or(defaults.flow_cache_ttl),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn env_u32(key: &str) -> Option<u32> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_string(key)
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
}
