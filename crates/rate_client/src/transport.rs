//! HTTP transport seam. The session talks to a `Transport` so tests can
//! script responses without a network.

use async_trait::async_trait;
use identity_pool::ProxyEndpoint;
use reqwest::cookie::Jar;
use reqwest::Method;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub proxy: Option<ProxyEndpoint>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("proxy error: {0}")]
    Proxy(String),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Errors that point at the proxy rather than the target site.
    pub fn is_proxy_class(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connect(_) | Self::Proxy(_))
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport. One client per proxy, all sharing a cookie jar
/// so the warm-up cookies follow proxy rotation.
pub struct ReqwestTransport {
    jar: Arc<Jar>,
    connect_timeout: Duration,
    clients: Mutex<HashMap<Option<String>, reqwest::Client>>,
}

impl ReqwestTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            jar: Arc::new(Jar::default()),
            connect_timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, proxy: Option<&ProxyEndpoint>) -> Result<reqwest::Client, TransportError> {
        let key = proxy.map(|p| p.url());
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&self.jar))
            .connect_timeout(self.connect_timeout)
            .gzip(true)
            .brotli(true);
        if let Some(url) = &key {
            let proxy = reqwest::Proxy::all(url.as_str())
                .map_err(|e| TransportError::Proxy(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(|e| TransportError::Other(e.to_string()))?;
        clients.insert(key, client.clone());
        Ok(client)
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, req: TransportRequest) -> Result<TransportResponse, TransportError> {
        let client = self.client_for(req.proxy.as_ref())?;
        let mut builder = client.request(req.method, &req.url).timeout(req.timeout);
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let resp = builder.send().await.map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(map_reqwest_error)?;
        Ok(TransportResponse { status, body })
    }
}
