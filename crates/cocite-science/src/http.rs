use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cocite_core::HttpConfig;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, ScienceError};

// ─── Delay ────────────────────────────────────────────────────────────────────

/// Source of every wait in the fetch path: request spacing, retry backoff
/// and analysis pacing. Tests swap in [`NoDelay`].
#[async_trait]
pub trait Delay: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;

#[async_trait]
impl Delay for NoDelay {
    async fn sleep(&self, _duration: Duration) {}
}

// ─── RateLimitedClient ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub retry_after_default: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            retry_after_default: Duration::from_secs(config.retry_after_default_secs),
        }
    }

    /// `base · 2^attempt`, saturating.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&HttpConfig::default())
    }
}

pub struct RateLimitedClient {
    client: reqwest::Client,
    min_interval: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
    policy: RetryPolicy,
    delay: Arc<dyn Delay>,
}

impl RateLimitedClient {
    pub fn new(min_interval: Duration, policy: RetryPolicy, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            min_interval,
            last_request: Arc::new(Mutex::new(None)),
            policy,
            delay: Arc::new(TokioDelay),
        })
    }

    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < self.min_interval {
                self.delay.sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub async fn get(&self, url: &str) -> Result<String> {
        self.get_with_headers(url, HeaderMap::new()).await
    }

    /// GET with bounded retries. 429 waits for `Retry-After` (or the policy
    /// default), transport errors back off exponentially; both give up after
    /// `max_retries` extra attempts. 404 maps to [`ScienceError::NotFound`].
    pub async fn get_with_headers(&self, url: &str, headers: HeaderMap) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            self.wait_for_rate_limit().await;
            let resp = self.client.get(url).headers(headers.clone()).send().await;
            match resp {
                Ok(r) if r.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = r
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.trim().parse::<u64>().ok())
                        .map(Duration::from_secs)
                        .unwrap_or(self.policy.retry_after_default);
                    if attempt >= self.policy.max_retries {
                        return Err(ScienceError::RateLimit(host_of(url), wait.as_secs()));
                    }
                    warn!(url, attempt, wait_secs = wait.as_secs(), "rate limited, backing off");
                    self.delay.sleep(wait).await;
                    attempt += 1;
                }
                Ok(r) if r.status() == StatusCode::NOT_FOUND => {
                    return Err(ScienceError::NotFound(url.to_string()));
                }
                Ok(r) if !r.status().is_success() => {
                    let status = r.status().as_u16();
                    let body = r.text().await.unwrap_or_default();
                    return Err(ScienceError::ApiError(
                        url.to_string(),
                        format!("HTTP {status}: {body}"),
                    ));
                }
                Ok(r) => return r.text().await.map_err(ScienceError::Http),
                Err(e) => {
                    if attempt >= self.policy.max_retries {
                        return Err(ScienceError::Http(e));
                    }
                    let backoff = self.policy.backoff(attempt);
                    debug!(url, attempt, error = %e, "request failed, retrying");
                    self.delay.sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, headers: HeaderMap) -> Result<T> {
        let text = self.get_with_headers(url, headers).await?;
        serde_json::from_str(&text).map_err(|e| ScienceError::Parse(e.to_string()))
    }
}

fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(ToOwned::to_owned))
        .unwrap_or_else(|| "server".to_string())
}

// ─── DiskCache ────────────────────────────────────────────────────────────────

pub struct DiskCache {
    dir: PathBuf,
    ttl: Duration,
}

fn cache_key_to_path(dir: &Path, key: &str) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let hash = hasher.finish();
    dir.join(format!("{hash:016x}.json"))
}

#[derive(Serialize, serde::Deserialize)]
struct CacheEntry<T> {
    stored_at: u64, // Unix timestamp secs
    value: T,
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl DiskCache {
    pub fn new(root: &Path, namespace: &str, ttl: Duration) -> Self {
        let dir = root.join(namespace);
        let _ = std::fs::create_dir_all(&dir);
        Self { dir, ttl }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = cache_key_to_path(&self.dir, key);
        let data = tokio::fs::read(&path).await.ok()?;
        let entry: CacheEntry<T> = serde_json::from_slice(&data).ok()?;
        if now_secs().saturating_sub(entry.stored_at) > self.ttl.as_secs() {
            let _ = tokio::fs::remove_file(&path).await;
            return None;
        }
        Some(entry.value)
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let path = cache_key_to_path(&self.dir, key);
        let entry = CacheEntry {
            stored_at: now_secs(),
            value,
        };
        if let Ok(data) = serde_json::to_vec(&entry) {
            let _ = tokio::fs::write(&path, data).await;
        }
    }
}
