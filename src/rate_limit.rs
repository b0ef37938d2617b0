use regex::Regex;
use rocket::http::Header;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::Request;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One entry in the ordered route-pattern table: first regex match against
/// the request path wins. Generalizes route-specific buckets to patterns
/// so limits apply by route shape rather than a fixed named-action enum.
struct RoutePattern {
    regex: Regex,
    max: usize,
    window_secs: u64,
}

pub struct RateLimitConfig {
    patterns: Vec<RoutePattern>,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let mut config = Self { patterns: Vec::new() };
        config.push_env("^/api/auth/register", "RATE_LIMIT_REGISTER", 5, 60);
        config.push_env("^/api/auth/verify", "RATE_LIMIT_VERIFY", 20, 60);
        config.push_env("^/api/mailbox/.*/messages$", "RATE_LIMIT_MESSAGES", 30, 60);
        config.push_env("^/api/chat/.*/messages$", "RATE_LIMIT_MESSAGES", 30, 60);
        config.push_env("^/api/stream", "RATE_LIMIT_SSE_CONNECT", 5, 60);
        config.push_env("^/api/.*", "RATE_LIMIT_DEFAULT", 60, 60);
        config
    }

    fn push_env(&mut self, pattern: &str, env_key: &str, default_max: usize, window_secs: u64) {
        let max = std::env::var(env_key).ok().and_then(|v| v.parse().ok()).unwrap_or(default_max);
        let regex = Regex::new(pattern).expect("rate limit pattern is a valid regex");
        self.patterns.push(RoutePattern { regex, max, window_secs });
    }

    /// First pattern whose regex matches `path` wins; the catch-all `.*`
    /// pattern guarantees a match always exists.
    fn limit_for(&self, path: &str) -> (usize, u64) {
        for p in &self.patterns {
            if p.regex.is_match(path) {
                return (p.max, p.window_secs);
            }
        }
        (60, 60)
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub allowed: bool,
    pub limit: usize,
    pub remaining: usize,
    pub retry_after_secs: u64,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        RateLimiter { config, buckets: Mutex::new(HashMap::new()) }
    }

    /// `key` should be the authenticated identity when available, else the
    /// first `X-Forwarded-For` value, else `"unknown"`.
    pub fn check(&self, path: &str, key: &str) -> RateLimitInfo {
        let (max, window_secs) = self.config.limit_for(path);
        let bucket_key = format!("{path}:{key}");
        self.check_with(&bucket_key, max, window_secs)
    }

    fn check_with(&self, bucket_key: &str, max: usize, window_secs: u64) -> RateLimitInfo {
        let mut buckets = self.buckets.lock().unwrap();
        let now = Instant::now();
        let window = Duration::from_secs(window_secs);

        let entries = buckets.entry(bucket_key.to_string()).or_default();
        entries.retain(|t| now.duration_since(*t) < window);

        if entries.len() >= max {
            let oldest = entries.iter().min().copied().unwrap_or(now);
            let elapsed = now.duration_since(oldest);
            let retry_after = if elapsed < window { (window - elapsed).as_secs() + 1 } else { 1 };
            return RateLimitInfo { allowed: false, limit: max, remaining: 0, retry_after_secs: retry_after };
        }

        entries.push(now);
        RateLimitInfo { allowed: true, limit: max, remaining: max - entries.len(), retry_after_secs: 0 }
    }

    /// Drops buckets that are entirely stale, so long-idle keys don't pin
    /// memory forever. Run from a 5-minute background sweep.
    pub fn sweep(&self) {
        let mut buckets = self.buckets.lock().unwrap();
        let now = Instant::now();
        buckets.retain(|_, entries| {
            entries.retain(|t| now.duration_since(*t) < Duration::from_secs(3600));
            !entries.is_empty()
        });
    }
}

/// Determines the rate-limit key for a request: authenticated identity if
/// present, else `X-Forwarded-For`'s first hop, else `"unknown"`.
pub fn client_key(identity: Option<&str>, forwarded_for: Option<&str>) -> String {
    if let Some(id) = identity {
        return id.to_string();
    }
    if let Some(xff) = forwarded_for {
        if let Some(first) = xff.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    "unknown".to_string()
}

/// Wraps any JSON response with `X-RateLimit-*` headers.
pub struct RateLimited<T> {
    pub inner: Json<T>,
    pub info: RateLimitInfo,
}

impl<T> RateLimited<T> {
    pub fn new(inner: Json<T>, info: RateLimitInfo) -> Self {
        Self { inner, info }
    }
}

impl<'r, 'o: 'r, T: serde::Serialize + 'o> Responder<'r, 'o> for RateLimited<T> {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let response = Response::build_from(self.inner.respond_to(req)?)
            .header(Header::new("X-RateLimit-Limit", self.info.limit.to_string()))
            .header(Header::new("X-RateLimit-Remaining", self.info.remaining.to_string()))
            .header(Header::new("X-RateLimit-Reset", self.info.retry_after_secs.to_string()))
            .finalize();
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_pattern_wins_over_catch_all() {
        let config = RateLimitConfig::from_env();
        let (max, _) = config.limit_for("/api/auth/register");
        assert_eq!(max, 5);
        let (max, _) = config.limit_for("/api/swarm/projects");
        assert_eq!(max, 60);
    }

    #[test]
    fn fifth_request_in_window_is_denied() {
        let limiter = RateLimiter::new(RateLimitConfig::from_env());
        for _ in 0..5 {
            assert!(limiter.check("/api/auth/register", "alice").allowed);
        }
        let blocked = limiter.check("/api/auth/register", "alice");
        assert!(!blocked.allowed);
        assert!(blocked.retry_after_secs > 0);
    }

    #[test]
    fn client_key_prefers_identity_then_forwarded_for() {
        assert_eq!(client_key(Some("alice"), Some("1.2.3.4")), "alice");
        assert_eq!(client_key(None, Some("1.2.3.4, 5.6.7.8")), "1.2.3.4");
        assert_eq!(client_key(None, None), "unknown");
    }
}
