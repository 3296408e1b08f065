use crate::error::{ClientError, ErrorKind};
use crate::headers::{api_headers, navigation_headers, SiteProfile};
use crate::pacing::{PacingConfig, RateGate};
use crate::retry::{Decision, Failure, RetryPolicy};
use crate::transport::{ReqwestTransport, Transport, TransportRequest};
use identity_pool::{FingerprintPool, NetworkIdentity, ProxyEndpoint, ProxyPool};
use logger::{EventLogger, RequestFailedEvent};
use rand::Rng;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub pacing: PacingConfig,
    pub retry: RetryPolicy,
    /// Site whose homepage is visited before the first API call.
    pub site: Option<SiteProfile>,
    pub warmup_delay_min: Duration,
    pub warmup_delay_max: Duration,
    /// Swap the active fingerprint after this many requests.
    pub identity_every: u64,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pacing: PacingConfig::default(),
            retry: RetryPolicy::default(),
            site: Some(SiteProfile::sofascore()),
            warmup_delay_min: Duration::from_secs(3),
            warmup_delay_max: Duration::from_secs(7),
            identity_every: 10,
            request_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Option<Method>,
    /// Overall deadline for the call including every retry.
    pub deadline: Option<Duration>,
    pub headers: Vec<(String, String)>,
}

struct SessionState {
    initialized: bool,
    request_count: u64,
    identity: Arc<NetworkIdentity>,
    last_request_at: Option<Instant>,
}

/// One scraping session: pacing gate, warm-up state, identity rotation and
/// the per-call retry loop. Owned by the caller and shared by reference.
pub struct ClientSession<T: Transport = ReqwestTransport> {
    transport: T,
    proxies: Option<Arc<ProxyPool>>,
    fingerprints: Arc<FingerprintPool>,
    gate: RateGate,
    config: SessionConfig,
    state: Mutex<SessionState>,
    /// Held across the warm-up check and send; one homepage visit at a time.
    bootstrap: Mutex<()>,
    audit: Option<EventLogger>,
}

impl ClientSession<ReqwestTransport> {
    pub fn new(
        proxies: Option<Arc<ProxyPool>>,
        fingerprints: Arc<FingerprintPool>,
        config: SessionConfig,
    ) -> Self {
        let transport = ReqwestTransport::new(config.connect_timeout);
        Self::with_transport(transport, proxies, fingerprints, config)
    }
}

impl<T: Transport> ClientSession<T> {
    pub fn with_transport(
        transport: T,
        proxies: Option<Arc<ProxyPool>>,
        fingerprints: Arc<FingerprintPool>,
        config: SessionConfig,
    ) -> Self {
        let identity = fingerprints.current();
        Self {
            transport,
            proxies: proxies.filter(|p| !p.is_empty()),
            fingerprints,
            gate: RateGate::new(&config.pacing),
            config,
            state: Mutex::new(SessionState {
                initialized: false,
                request_count: 0,
                identity,
                last_request_at: None,
            }),
            bootstrap: Mutex::new(()),
            audit: None,
        }
    }

    pub fn with_audit_log(mut self, log_dir: impl Into<std::path::PathBuf>) -> Self {
        self.audit = Some(EventLogger::new(log_dir));
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn proxies(&self) -> Option<&Arc<ProxyPool>> {
        self.proxies.as_ref()
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.lock().await.initialized
    }

    pub async fn request_count(&self) -> u64 {
        self.state.lock().await.request_count
    }

    pub async fn get_json<D: DeserializeOwned>(&self, url: &str) -> Result<D, ClientError> {
        self.request_json(url, RequestOptions::default()).await
    }

    pub async fn request_json<D: DeserializeOwned>(
        &self,
        url: &str,
        opts: RequestOptions,
    ) -> Result<D, ClientError> {
        let value = self.request(url, opts).await?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::new(ErrorKind::ParseError, url, e.to_string()))
    }

    /// Issues one logical call and returns its parsed JSON body.
    pub async fn request(&self, url: &str, opts: RequestOptions) -> Result<serde_json::Value, ClientError> {
        let result = match opts.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.run_with_retries(url, &opts))
                .await
                .unwrap_or_else(|_| {
                    Err(ClientError::new(ErrorKind::Timeout, url, format!("deadline of {deadline:?} exceeded")))
                }),
            None => self.run_with_retries(url, &opts).await,
        };

        if let Err(e) = &result {
            if !e.is_not_found() {
                self.audit_failure(e);
            }
        }
        result
    }

    async fn run_with_retries(&self, url: &str, opts: &RequestOptions) -> Result<serde_json::Value, ClientError> {
        let policy = &self.config.retry;
        let mut retry: u32 = 0;
        let mut forbidden_seen: u32 = 0;

        loop {
            self.ensure_bootstrap().await;
            self.pace(retry).await;

            let permit = self
                .gate
                .acquire()
                .await
                .ok_or_else(|| ClientError::new(ErrorKind::NetworkError, url, "rate gate closed"))?;
            let (identity, proxy) = self.next_identity().await;

            let mut headers = api_headers(&identity, url, self.config.site.as_ref());
            headers.extend(opts.headers.iter().cloned());
            let started = Instant::now();
            let outcome = self
                .transport
                .send(TransportRequest {
                    method: opts.method.clone().unwrap_or(Method::GET),
                    url: url.to_string(),
                    headers,
                    proxy: proxy.clone(),
                    timeout: self.config.request_timeout,
                })
                .await;
            let latency = started.elapsed();
            {
                let mut st = self.state.lock().await;
                st.request_count += 1;
                st.last_request_at = Some(Instant::now());
            }
            drop(permit);

            let failure = match outcome {
                Ok(resp) if (200..300).contains(&resp.status) => {
                    let parsed = serde_json::from_str::<serde_json::Value>(&resp.body);
                    return match parsed {
                        Ok(value) => {
                            if let (Some(pool), Some(p)) = (&self.proxies, &proxy) {
                                pool.mark_successful(p, Some(latency));
                            }
                            debug!("✅ {} ({} ms)", url, latency.as_millis());
                            Ok(value)
                        }
                        Err(e) => Err(ClientError {
                            retries: retry,
                            ..ClientError::new(ErrorKind::ParseError, url, e.to_string())
                        }),
                    };
                }
                Ok(resp) => Failure::Status(resp.status),
                Err(e) => {
                    if e.is_proxy_class() {
                        self.mark_proxy_failed(proxy.as_ref(), &e.to_string());
                    }
                    match e {
                        crate::transport::TransportError::Timeout => Failure::Timeout,
                        other => Failure::Network(other.to_string()),
                    }
                }
            };

            if let Failure::Status(status) = failure {
                if status == 403 || status == 407 {
                    self.mark_proxy_failed(proxy.as_ref(), &format!("HTTP {status}"));
                }
                if status == 403 {
                    forbidden_seen += 1;
                }
            }

            match policy.decide(&failure, retry, forbidden_seen) {
                Decision::Fatal(kind) => {
                    let mut err = ClientError::new(kind, url, failure.describe());
                    err.retries = retry;
                    if kind == ErrorKind::Forbidden {
                        err.pool = self.proxies.as_ref().map(|p| p.stats());
                        if let Some(stats) = &err.pool {
                            warn!("🚫 Blocked on {}: {}", url, stats);
                        }
                    }
                    return Err(err);
                }
                Decision::Retry { wait, rotate_identity } => {
                    warn!(
                        "{} on {} (retry {}), waiting {:?}",
                        failure.describe(),
                        url,
                        retry + 1,
                        wait
                    );
                    if rotate_identity {
                        self.rotate_after_block().await;
                    }
                    sleep(wait).await;
                    retry += 1;
                }
            }
        }
    }

    fn mark_proxy_failed(&self, proxy: Option<&ProxyEndpoint>, reason: &str) {
        if let (Some(pool), Some(p)) = (&self.proxies, proxy) {
            pool.mark_failed(p, reason);
        }
    }

    /// Fresh proxy, fresh fingerprint, and a new warm-up before the next call.
    async fn rotate_after_block(&self) {
        if let Some(pool) = &self.proxies {
            pool.rotate();
        }
        let mut st = self.state.lock().await;
        st.initialized = false;
        st.request_count = 0;
        st.identity = self.fingerprints.next();
        info!("🔄 Session reset after block, new identity {}", st.identity.user_agent);
    }

    async fn next_identity(&self) -> (Arc<NetworkIdentity>, Option<ProxyEndpoint>) {
        let mut st = self.state.lock().await;
        let every = self.config.identity_every.max(1);
        if st.request_count > 0 && st.request_count % every == 0 {
            st.identity = self.fingerprints.next();
            debug!("Fingerprint rotated after {} requests", st.request_count);
        }
        let proxy = self.proxies.as_ref().and_then(|p| p.current());
        (Arc::clone(&st.identity), proxy)
    }

    async fn pace(&self, retry: u32) {
        let delay = {
            let st = self.state.lock().await;
            let since_last = st
                .last_request_at
                .map_or(Duration::MAX, |t| Instant::now().saturating_duration_since(t));
            self.config
                .pacing
                .adaptive_delay(st.request_count, retry, since_last, &mut rand::thread_rng())
        };
        if !delay.is_zero() {
            debug!("Pacing delay {:?}", delay);
            sleep(delay).await;
        }
    }

    /// Visits the site homepage to pick up cookies. A failed warm-up leaves
    /// the session uninitialized so the next call tries again.
    /// Concurrent callers queue on the bootstrap guard and skip the visit
    /// once the first one has warmed the session.
    async fn ensure_bootstrap(&self) {
        let Some(site) = &self.config.site else { return };
        if self.state.lock().await.initialized {
            return;
        }
        let _guard = self.bootstrap.lock().await;
        let identity = {
            let st = self.state.lock().await;
            if st.initialized {
                return;
            }
            Arc::clone(&st.identity)
        };

        let proxy = self.proxies.as_ref().and_then(|p| p.current());
        let homepage = site.homepage();
        let Some(permit) = self.gate.acquire().await else {
            warn!("Rate gate closed before warm-up of {}", homepage);
            return;
        };
        let outcome = self
            .transport
            .send(TransportRequest {
                method: Method::GET,
                url: homepage.clone(),
                headers: navigation_headers(&identity),
                proxy: proxy.clone(),
                timeout: self.config.request_timeout,
            })
            .await;
        drop(permit);

        match outcome {
            Ok(resp) if (200..400).contains(&resp.status) => {
                self.state.lock().await.initialized = true;
                info!("🍪 Session warmed up via {}", homepage);
                let pause = if self.config.warmup_delay_max > self.config.warmup_delay_min {
                    rand::thread_rng().gen_range(self.config.warmup_delay_min..=self.config.warmup_delay_max)
                } else {
                    self.config.warmup_delay_min
                };
                sleep(pause).await;
            }
            Ok(resp) => warn!("Warm-up of {} returned HTTP {}", homepage, resp.status),
            Err(e) => {
                if e.is_proxy_class() {
                    self.mark_proxy_failed(proxy.as_ref(), &e.to_string());
                }
                warn!("Warm-up of {} failed: {}", homepage, e);
            }
        }
    }

    fn audit_failure(&self, err: &ClientError) {
        if let Some(audit) = &self.audit {
            let _ = audit.log(&RequestFailedEvent {
                url: err.url.clone(),
                kind: err.kind.to_string(),
                retries: err.retries,
                message: err.message.clone(),
            });
        }
    }
}
