use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks5,
}

impl ProxyProtocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Socks5 => "socks5",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProxyParseError {
    #[error("invalid proxy url `{0}`")]
    InvalidUrl(String),
    #[error("unsupported proxy scheme `{0}`")]
    UnsupportedScheme(String),
    #[error("proxy `{0}` has no port")]
    MissingPort(String),
}

/// A proxy endpoint plus its health snapshot.
#[derive(Debug, Clone)]
pub struct ProxyEndpoint {
    pub protocol: ProxyProtocol,
    pub host: String,
    pub port: u16,
    pub credentials: Option<ProxyCredentials>,
    pub country: Option<String>,
    pub quality_score: f64,
    pub success_rate: f64,
    pub avg_response_ms: f64,
    pub healthy: bool,
    pub last_used_at: Option<Instant>,
}

impl ProxyEndpoint {
    pub fn new(protocol: ProxyProtocol, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol,
            host: host.into(),
            port,
            credentials: None,
            country: None,
            quality_score: 1.0,
            success_rate: 1.0,
            avg_response_ms: 0.0,
            healthy: true,
            last_used_at: None,
        }
    }

    /// Parses `scheme://[user:pass@]host:port[#CC]`; a bare `host:port` is http.
    pub fn parse(raw: &str) -> Result<Self, ProxyParseError> {
        let raw = raw.trim();
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{raw}")
        };
        let url = Url::parse(&with_scheme).map_err(|_| ProxyParseError::InvalidUrl(raw.to_string()))?;

        let protocol = match url.scheme() {
            "http" => ProxyProtocol::Http,
            "https" => ProxyProtocol::Https,
            "socks5" | "socks5h" => ProxyProtocol::Socks5,
            other => return Err(ProxyParseError::UnsupportedScheme(other.to_string())),
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ProxyParseError::InvalidUrl(raw.to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ProxyParseError::MissingPort(raw.to_string()))?;

        let mut endpoint = Self::new(protocol, host, port);
        if !url.username().is_empty() {
            endpoint.credentials = Some(ProxyCredentials {
                username: url.username().to_string(),
                password: url.password().unwrap_or_default().to_string(),
            });
        }
        endpoint.country = url.fragment().filter(|c| !c.is_empty()).map(str::to_uppercase);
        Ok(endpoint)
    }

    /// Identity key used for failure bookkeeping.
    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `scheme://host:port` without credentials (browser launch flag form).
    pub fn server(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }

    /// Full proxy url including credentials, for HTTP clients.
    pub fn url(&self) -> String {
        match &self.credentials {
            Some(c) => format!(
                "{}://{}:{}@{}:{}",
                self.protocol.scheme(),
                c.username,
                c.password,
                self.host,
                self.port
            ),
            None => self.server(),
        }
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.server())
    }
}

/// Comma or newline separated list; malformed entries are skipped with a warning.
pub fn parse_proxy_list(raw: &str) -> Vec<ProxyEndpoint> {
    raw.split(|c| c == ',' || c == '\n')
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.starts_with('#'))
        .filter_map(|entry| match ProxyEndpoint::parse(entry) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Skipping proxy entry: {}", e);
                None
            }
        })
        .collect()
}

// ── Pool ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct PoolPolicy {
    pub max_failures: u32,
    pub failure_window: Duration,
    pub ema_alpha: f64,
    pub unhealthy_below: f64,
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self {
            max_failures: 3,
            failure_window: Duration::from_secs(30 * 60),
            ema_alpha: 0.3,
            unhealthy_below: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub healthy: usize,
    pub failed: usize,
    /// Share of eligible endpoints, in percent.
    pub success_rate: f64,
    pub rotations: u64,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} proxies working ({:.1}%), {} rotations",
            self.healthy, self.total, self.success_rate, self.rotations
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct FailureRecord {
    count: u32,
    last_failed: Instant,
}

#[derive(Debug)]
struct PoolState {
    endpoints: Vec<ProxyEndpoint>,
    failures: HashMap<String, FailureRecord>,
    cursor: usize,
    rotations: u64,
}

impl PoolState {
    /// Drops failure records whose window has lapsed and re-enables their endpoints.
    fn expire_failures(&mut self, now: Instant, window: Duration) {
        let expired: Vec<String> = self
            .failures
            .iter()
            .filter(|(_, r)| now.saturating_duration_since(r.last_failed) >= window)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.failures.remove(&key);
            if let Some(ep) = self.endpoints.iter_mut().find(|e| e.key() == key) {
                ep.healthy = true;
                debug!("Proxy {} back in rotation after cool-down", ep);
            }
        }
    }

    fn eligible(&self, max_failures: u32) -> Vec<usize> {
        self.endpoints
            .iter()
            .enumerate()
            .filter(|(_, ep)| {
                self.failures
                    .get(&ep.key())
                    .map_or(true, |r| r.count < max_failures)
            })
            .map(|(i, _)| i)
            .collect()
    }

    fn force_reset(&mut self) {
        self.failures.clear();
        self.cursor = 0;
        for ep in &mut self.endpoints {
            ep.healthy = true;
        }
    }

    fn touch(&mut self, idx: usize, now: Instant) -> ProxyEndpoint {
        let ep = &mut self.endpoints[idx];
        ep.last_used_at = Some(now);
        ep.clone()
    }
}

/// Proxy rotation with per-endpoint failure windows. Shared via `Arc`.
#[derive(Debug)]
pub struct ProxyPool {
    state: Mutex<PoolState>,
    policy: PoolPolicy,
}

impl ProxyPool {
    pub fn new(endpoints: Vec<ProxyEndpoint>) -> Self {
        Self::with_policy(endpoints, PoolPolicy::default())
    }

    pub fn with_policy(endpoints: Vec<ProxyEndpoint>, policy: PoolPolicy) -> Self {
        info!("Proxy pool initialised with {} endpoints", endpoints.len());
        Self {
            state: Mutex::new(PoolState {
                endpoints,
                failures: HashMap::new(),
                cursor: 0,
                rotations: 0,
            }),
            policy,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        // a poisoned pool still holds consistent counters
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().endpoints.is_empty()
    }

    pub fn current(&self) -> Option<ProxyEndpoint> {
        self.current_at(Instant::now())
    }

    pub fn current_at(&self, now: Instant) -> Option<ProxyEndpoint> {
        let mut st = self.lock();
        if st.endpoints.is_empty() {
            return None;
        }
        st.expire_failures(now, self.policy.failure_window);
        let eligible = st.eligible(self.policy.max_failures);
        if eligible.is_empty() {
            warn!("⚠️ No eligible proxies left, clearing failure cache");
            st.force_reset();
            return Some(st.touch(0, now));
        }
        let idx = eligible[st.cursor % eligible.len()];
        Some(st.touch(idx, now))
    }

    pub fn rotate(&self) -> Option<ProxyEndpoint> {
        self.rotate_at(Instant::now())
    }

    /// Cursor advances modulo the number of currently eligible endpoints.
    pub fn rotate_at(&self, now: Instant) -> Option<ProxyEndpoint> {
        let mut st = self.lock();
        if st.endpoints.is_empty() {
            return None;
        }
        st.expire_failures(now, self.policy.failure_window);
        let eligible = st.eligible(self.policy.max_failures);
        if eligible.is_empty() {
            warn!("⚠️ No eligible proxies left, clearing failure cache");
            st.force_reset();
            st.rotations += 1;
            return Some(st.touch(0, now));
        }
        st.cursor = (st.cursor + 1) % eligible.len().max(1);
        st.rotations += 1;
        let idx = eligible[st.cursor];
        let ep = st.touch(idx, now);
        info!("🔄 Rotated to proxy {}", ep);
        Some(ep)
    }

    pub fn mark_failed(&self, endpoint: &ProxyEndpoint, reason: &str) {
        self.mark_failed_at(endpoint, reason, Instant::now());
    }

    pub fn mark_failed_at(&self, endpoint: &ProxyEndpoint, reason: &str, now: Instant) {
        let key = endpoint.key();
        let policy = self.policy;
        let mut st = self.lock();

        let record = st.failures.entry(key.clone()).or_insert(FailureRecord { count: 0, last_failed: now });
        record.count += 1;
        record.last_failed = now;
        let count = record.count;

        if let Some(ep) = st.endpoints.iter_mut().find(|e| e.key() == key) {
            ep.success_rate *= 1.0 - policy.ema_alpha;
            ep.quality_score = ep.success_rate;
            if ep.success_rate < policy.unhealthy_below || count >= policy.max_failures {
                ep.healthy = false;
            }
        }
        warn!("Proxy {} failed ({}x): {}", endpoint, count, reason);
    }

    pub fn mark_successful(&self, endpoint: &ProxyEndpoint, response_time: Option<Duration>) {
        let key = endpoint.key();
        let policy = self.policy;
        let mut st = self.lock();

        let mut remaining = 0;
        if let Some(record) = st.failures.get_mut(&key) {
            record.count = record.count.saturating_sub(1);
            remaining = record.count;
        }
        if remaining == 0 {
            st.failures.remove(&key);
        }

        if let Some(ep) = st.endpoints.iter_mut().find(|e| e.key() == key) {
            ep.success_rate = policy.ema_alpha + (1.0 - policy.ema_alpha) * ep.success_rate;
            if let Some(rt) = response_time {
                let ms = rt.as_secs_f64() * 1000.0;
                ep.avg_response_ms = if ep.avg_response_ms == 0.0 {
                    ms
                } else {
                    ep.avg_response_ms * 0.8 + ms * 0.2
                };
            }
            ep.quality_score = ep.success_rate;
            ep.healthy = ep.success_rate >= policy.unhealthy_below && remaining < policy.max_failures;
        }
    }

    pub fn failure_count(&self, endpoint: &ProxyEndpoint) -> u32 {
        self.lock().failures.get(&endpoint.key()).map_or(0, |r| r.count)
    }

    pub fn stats(&self) -> PoolStats {
        self.stats_at(Instant::now())
    }

    pub fn stats_at(&self, now: Instant) -> PoolStats {
        let mut st = self.lock();
        st.expire_failures(now, self.policy.failure_window);
        let total = st.endpoints.len();
        let healthy = st.eligible(self.policy.max_failures).len();
        PoolStats {
            total,
            healthy,
            failed: total - healthy,
            success_rate: if total == 0 { 0.0 } else { healthy as f64 / total as f64 * 100.0 },
            rotations: st.rotations,
        }
    }

    pub fn reset(&self) {
        self.lock().force_reset();
        info!("Proxy pool reset");
    }
}
