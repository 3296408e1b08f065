use identity_pool::PoolStats;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    RateLimited,
    Forbidden,
    ServerError,
    Timeout,
    NetworkError,
    ParseError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::Forbidden => "forbidden",
            Self::ServerError => "server_error",
            Self::Timeout => "timeout",
            Self::NetworkError => "network_error",
            Self::ParseError => "parse_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of one logical request, after the retry loop gave up.
#[derive(Debug, Clone, Error)]
#[error("{kind} for {url} after {retries} retries: {message}")]
pub struct ClientError {
    pub kind: ErrorKind,
    pub url: String,
    pub message: String,
    pub retries: u32,
    /// Proxy pool health at the time of a fatal 403.
    pub pool: Option<PoolStats>,
}

impl ClientError {
    pub fn new(kind: ErrorKind, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind, url: url.into(), message: message.into(), retries: 0, pool: None }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Timeouts and blocks are expected noise for the notifier.
    pub fn is_session_noise(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout | ErrorKind::Forbidden)
    }
}
