//! Backoff decisions for one failed attempt. Pure so the table can be tested
//! without a clock.

use crate::error::ErrorKind;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Status(u16),
    Timeout,
    Network(String),
}

impl Failure {
    /// Kind reported if this failure ends the call.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Failure::Status(404) => ErrorKind::NotFound,
            Failure::Status(403) => ErrorKind::Forbidden,
            Failure::Status(429) => ErrorKind::RateLimited,
            Failure::Status(s) if *s >= 500 => ErrorKind::ServerError,
            Failure::Status(_) => ErrorKind::NetworkError,
            Failure::Timeout => ErrorKind::Timeout,
            Failure::Network(_) => ErrorKind::NetworkError,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Failure::Status(s) => format!("HTTP {s}"),
            Failure::Timeout => "timed out".to_string(),
            Failure::Network(msg) => msg.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Retry { wait: Duration, rotate_identity: bool },
    Fatal(ErrorKind),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Non-403 failures are fatal once this many retries were spent.
    pub max_retries: u32,
    /// The n-th cumulative 403 is fatal.
    pub max_forbidden: u32,
    /// Multiplier applied to every wait; `0.0` in tests that skip sleeping.
    pub time_scale: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, max_forbidden: 3, time_scale: 1.0 }
    }
}

impl RetryPolicy {
    /// `retry` is the number of retries already spent; `forbidden_seen`
    /// counts 403s including the current one.
    pub fn decide(&self, failure: &Failure, retry: u32, forbidden_seen: u32) -> Decision {
        let exhausted = retry >= self.max_retries;
        let secs = |s: u64| Duration::from_secs(s).mul_f64(self.time_scale);

        match failure {
            Failure::Status(404) => Decision::Fatal(ErrorKind::NotFound),
            Failure::Status(403) => {
                if forbidden_seen >= self.max_forbidden {
                    Decision::Fatal(ErrorKind::Forbidden)
                } else {
                    let wait = (15 + 10 * u64::from(retry)).min(60);
                    Decision::Retry { wait: secs(wait), rotate_identity: true }
                }
            }
            Failure::Status(429) if exhausted => Decision::Fatal(ErrorKind::RateLimited),
            Failure::Status(429) => Decision::Retry {
                wait: secs(5 * 2u64.saturating_pow(retry + 3)),
                rotate_identity: false,
            },
            _ if exhausted => Decision::Fatal(failure.kind()),
            Failure::Status(502 | 503 | 504) => Decision::Retry {
                wait: secs(8 * u64::from(retry + 1)),
                rotate_identity: false,
            },
            Failure::Timeout => Decision::Retry {
                wait: secs(10 * u64::from(retry + 1)),
                rotate_identity: false,
            },
            Failure::Status(_) | Failure::Network(_) => Decision::Retry {
                wait: secs(5 * u64::from(retry + 1)),
                rotate_identity: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retry_wait(d: Decision) -> Duration {
        match d {
            Decision::Retry { wait, .. } => wait,
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[test]
    fn not_found_is_fatal_immediately() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(&Failure::Status(404), 0, 0), Decision::Fatal(ErrorKind::NotFound));
    }

    #[test]
    fn forbidden_rotates_until_third_hit() {
        let p = RetryPolicy::default();
        assert_eq!(
            p.decide(&Failure::Status(403), 0, 1),
            Decision::Retry { wait: Duration::from_secs(15), rotate_identity: true }
        );
        assert_eq!(retry_wait(p.decide(&Failure::Status(403), 1, 2)), Duration::from_secs(25));
        assert_eq!(retry_wait(p.decide(&Failure::Status(403), 9, 2)), Duration::from_secs(60));
        assert_eq!(p.decide(&Failure::Status(403), 2, 3), Decision::Fatal(ErrorKind::Forbidden));
    }

    #[test]
    fn rate_limit_backs_off_exponentially() {
        let p = RetryPolicy::default();
        assert_eq!(retry_wait(p.decide(&Failure::Status(429), 0, 0)), Duration::from_secs(40));
        assert_eq!(retry_wait(p.decide(&Failure::Status(429), 1, 0)), Duration::from_secs(80));
        assert_eq!(p.decide(&Failure::Status(429), 2, 0), Decision::Fatal(ErrorKind::RateLimited));
    }

    #[test]
    fn gateway_errors_back_off_linearly() {
        let p = RetryPolicy::default();
        assert_eq!(retry_wait(p.decide(&Failure::Status(503), 0, 0)), Duration::from_secs(8));
        assert_eq!(retry_wait(p.decide(&Failure::Status(502), 1, 0)), Duration::from_secs(16));
        assert_eq!(p.decide(&Failure::Status(504), 2, 0), Decision::Fatal(ErrorKind::ServerError));
    }

    #[test]
    fn timeouts_and_network_errors() {
        let p = RetryPolicy::default();
        assert_eq!(retry_wait(p.decide(&Failure::Timeout, 1, 0)), Duration::from_secs(20));
        assert_eq!(p.decide(&Failure::Timeout, 2, 0), Decision::Fatal(ErrorKind::Timeout));
        let net = Failure::Network("reset".into());
        assert_eq!(retry_wait(p.decide(&net, 0, 0)), Duration::from_secs(5));
        assert_eq!(p.decide(&net, 2, 0), Decision::Fatal(ErrorKind::NetworkError));
        assert_eq!(p.decide(&Failure::Status(500), 2, 0), Decision::Fatal(ErrorKind::ServerError));
    }

    #[test]
    fn time_scale_shrinks_waits() {
        let p = RetryPolicy { time_scale: 0.0, ..RetryPolicy::default() };
        assert_eq!(retry_wait(p.decide(&Failure::Status(429), 1, 0)), Duration::ZERO);
    }
}
