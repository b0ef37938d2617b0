use crate::config::HiveConfig;
use crate::db::Db;
use hmac::{Hmac, Mac};
use rusqlite::params;
use sha2::Sha256;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum SsrfError {
    #[error("URL scheme must be http or https")]
    BadScheme,
    #[error("URL has no host")]
    NoHost,
    #[error("host '{0}' is blocked by the outbound URL policy")]
    BlockedHost(String),
    #[error("could not parse URL: {0}")]
    Unparseable(String),
}

const BLOCKED_HOST_SUFFIXES: &[&str] = &[".local", ".internal"];
const BLOCKED_HOSTS: &[&str] = &["localhost", "metadata.google.internal"];

/// Shared by the webhook dispatcher and workflow-document fetcher: reject
/// non-http(s) schemes, reject localhost/.local/.internal/the GCE metadata
/// hostname, and reject IPs in loopback/private/link-local/`0.*` ranges.
/// `allowed_hosts` is a configurable bypass for named internal hosts a
/// deployment legitimately wants to reach.
pub fn check_outbound_url(raw: &str, allowed_hosts: &[String]) -> Result<Url, SsrfError> {
    let url = Url::parse(raw).map_err(|e| SsrfError::Unparseable(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(SsrfError::BadScheme);
    }

    let host = url.host_str().ok_or(SsrfError::NoHost)?.to_lowercase();

    if allowed_hosts.iter().any(|h| h == &host) {
        return Ok(url);
    }

    if BLOCKED_HOSTS.contains(&host.as_str()) {
        return Err(SsrfError::BlockedHost(host));
    }
    if BLOCKED_HOST_SUFFIXES.iter().any(|suffix| host.ends_with(suffix)) {
        return Err(SsrfError::BlockedHost(host));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_blocked_ip(ip) {
            return Err(SsrfError::BlockedHost(host));
        }
    }

    Ok(url)
}

fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.octets()[0] == 0
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified() || v6.is_unique_local(),
    }
}

/// A webhook target: the outbound URL plus the bearer token to sign/auth
/// with. Cached for 60 s per identity, cleared on mutation.
#[derive(Debug, Clone)]
pub struct WebhookTarget {
    pub url: String,
    pub token: String,
}

pub struct WebhookConfigCache {
    entries: Mutex<HashMap<String, (Option<WebhookTarget>, Instant)>>,
    ttl: Duration,
}

impl WebhookConfigCache {
    pub fn new(ttl_secs: u64) -> Self {
        WebhookConfigCache { entries: Mutex::new(HashMap::new()), ttl: Duration::from_secs(ttl_secs) }
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    fn lookup(&self, db: &Db, identity: &str) -> Option<WebhookTarget> {
        {
            let entries = self.entries.lock().unwrap();
            if let Some((target, at)) = entries.get(identity) {
                if at.elapsed() < self.ttl {
                    return target.clone();
                }
            }
        }

        let conn = db.conn.lock().unwrap();
        let target: Option<(Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT webhook_url, webhook_token FROM mailbox_tokens
                 WHERE identity = ?1 AND revoked_at IS NULL
                 ORDER BY created_at DESC LIMIT 1",
                params![identity],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();
        drop(conn);

        let resolved = target.and_then(|(url, token)| match (url, token) {
            (Some(url), Some(token)) => Some(WebhookTarget { url, token }),
            _ => None,
        });

        self.entries.lock().unwrap().insert(identity.to_string(), (resolved.clone(), Instant::now()));
        resolved
    }
}

/// Fire-and-forget POST of `{message, wakeMode}` to `identity`'s webhook, if
/// one is configured. Failure is logged and swallowed; the caller never
/// learns the outcome.
pub fn dispatch_message(
    client: reqwest::Client,
    db: std::sync::Arc<Db>,
    cache: std::sync::Arc<WebhookConfigCache>,
    allowed_hosts: Vec<String>,
    identity: String,
    message: serde_json::Value,
) {
    tokio::spawn(async move {
        let target = cache.lookup(&db, &identity);
        let Some(target) = target else { return };

        let url = match check_outbound_url(&target.url, &allowed_hosts) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(identity = %identity, error = %e, "webhook url blocked by ssrf guard");
                return;
            }
        };

        let body = serde_json::json!({ "message": message, "wakeMode": "now" });

        let result = client
            .post(url)
            .header("Authorization", format!("Bearer {}", target.token))
            .json(&body)
            .send()
            .await;

        match result {
            Ok(resp) if !resp.status().is_success() => {
                tracing::warn!(identity = %identity, status = %resp.status(), "webhook delivery failed");
            }
            Err(e) => {
                tracing::warn!(identity = %identity, error = %e, "webhook delivery error");
            }
            _ => {}
        }
    });
}

/// HMAC-SHA256-signs `body` with `secret`, hex-encoded into the
/// `sha256=<hex>` header convention.
pub fn sign_body(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

pub fn http_client(config: &HiveConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.webhook_timeout_secs))
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("failed to build webhook http client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_scheme() {
        assert!(matches!(check_outbound_url("ftp://example.com", &[]), Err(SsrfError::BadScheme)));
    }

    #[test]
    fn rejects_localhost_and_internal_suffixes() {
        assert!(check_outbound_url("http://localhost/", &[]).is_err());
        assert!(check_outbound_url("http://foo.local/", &[]).is_err());
        assert!(check_outbound_url("http://foo.internal/", &[]).is_err());
        assert!(check_outbound_url("http://metadata.google.internal/", &[]).is_err());
    }

    #[test]
    fn rejects_loopback_private_and_link_local_ips() {
        assert!(check_outbound_url("http://127.0.0.1/", &[]).is_err());
        assert!(check_outbound_url("http://10.0.0.5/", &[]).is_err());
        assert!(check_outbound_url("http://172.16.0.1/", &[]).is_err());
        assert!(check_outbound_url("http://192.168.1.1/", &[]).is_err());
        assert!(check_outbound_url("http://169.254.169.254/", &[]).is_err());
        assert!(check_outbound_url("http://0.0.0.0/", &[]).is_err());
    }

    #[test]
    fn allows_public_host() {
        assert!(check_outbound_url("https://example.com/webhook", &[]).is_ok());
    }

    #[test]
    fn allowed_hosts_bypass_the_guard() {
        let allowed = vec!["internal-gateway".to_string()];
        assert!(check_outbound_url("http://internal-gateway/hook", &allowed).is_ok());
    }

    #[test]
    fn signature_is_deterministic() {
        let a = sign_body("secret", b"payload").unwrap();
        let b = sign_body("secret", b"payload").unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("sha256="));
    }
}
