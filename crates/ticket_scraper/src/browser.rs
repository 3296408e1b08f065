use async_trait::async_trait;
use identity_pool::{NetworkIdentity, ProxyEndpoint, Viewport};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("navigation ({condition}) failed: {message}")]
    Navigation { condition: LoadCondition, message: String },
    #[error("navigation ({0}) timed out")]
    Timeout(LoadCondition),
    #[error("script failed: {0}")]
    Script(String),
    #[error("page already closed")]
    Closed,
}

/// How far a navigation must get before it counts as done, strictest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadCondition {
    NetworkIdle,
    Load,
    DomContentLoaded,
    Commit,
}

impl fmt::Display for LoadCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadCondition::NetworkIdle => "networkidle",
            LoadCondition::Load => "load",
            LoadCondition::DomContentLoaded => "domcontentloaded",
            LoadCondition::Commit => "commit",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationStrategy {
    pub condition: LoadCondition,
    pub timeout: Duration,
}

const fn strategy(condition: LoadCondition, secs: u64) -> NavigationStrategy {
    NavigationStrategy { condition, timeout: Duration::from_secs(secs) }
}

/// Ladder for the event page.
pub const PAGE_LADDER: [NavigationStrategy; 4] = [
    strategy(LoadCondition::NetworkIdle, 150),
    strategy(LoadCondition::Load, 120),
    strategy(LoadCondition::DomContentLoaded, 90),
    strategy(LoadCondition::Commit, 60),
];

/// Ladder for the `view-source:` page.
pub const SOURCE_LADDER: [NavigationStrategy; 4] = [
    strategy(LoadCondition::NetworkIdle, 120),
    strategy(LoadCondition::Load, 90),
    strategy(LoadCondition::DomContentLoaded, 75),
    strategy(LoadCondition::Commit, 45),
];

/// Shorter ladder for the last-resort direct attempt.
pub const DIRECT_LADDER: [NavigationStrategy; 2] = [
    strategy(LoadCondition::Load, 60),
    strategy(LoadCondition::DomContentLoaded, 45),
];

/// Everything a launch needs; the proxy is `None` for direct attempts.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub identity: Arc<NetworkIdentity>,
    pub proxy: Option<ProxyEndpoint>,
    pub headless: bool,
    pub window: Viewport,
}

/// Starts one browser per attempt.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, config: &LaunchConfig) -> Result<Box<dyn BrowserPage>, BrowserError>;
}

/// A single tab owned by one attempt. `close` must be safe to call twice.
#[async_trait]
pub trait BrowserPage: Send {
    /// Applies the identity (user agent, headers, timezone, stealth script)
    /// before any page script runs.
    async fn prepare(&mut self, identity: &NetworkIdentity) -> Result<(), BrowserError>;

    async fn navigate(&mut self, url: &str, strategy: NavigationStrategy) -> Result<(), BrowserError>;

    async fn evaluate(&mut self, script: &str) -> Result<Value, BrowserError>;

    async fn content(&mut self) -> Result<String, BrowserError>;

    async fn close(&mut self) -> Result<(), BrowserError>;
}

/// Hides the usual automation tells. Runs before any page script.
pub fn stealth_script(identity: &NetworkIdentity) -> String {
    let languages = serde_json::to_string(&identity.languages()).unwrap_or_else(|_| "[\"en-US\"]".into());
    let platform = serde_json::to_string(&identity.platform).unwrap_or_else(|_| "\"Win32\"".into());
    format!(
        r#"(() => {{
  const define = (obj, key, value) => Object.defineProperty(obj, key, {{ get: () => value, configurable: true }});
  define(navigator, 'webdriver', undefined);
  define(navigator, 'plugins', [1, 2, 3, 4, 5]);
  define(navigator, 'languages', {languages});
  define(navigator, 'platform', {platform});
  define(navigator, 'hardwareConcurrency', {cores});
  define(navigator, 'deviceMemory', {memory});
  define(screen, 'availWidth', {width});
  define(screen, 'availHeight', {avail_height});
  window.chrome = window.chrome || {{ runtime: {{}} }};
}})();"#,
        cores = identity.hardware_concurrency,
        memory = identity.device_memory,
        width = identity.viewport.width,
        avail_height = identity.viewport.height.saturating_sub(40),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use identity_pool::FingerprintPool;

    #[test]
    fn ladders_go_from_strict_to_lenient() {
        let order: Vec<_> = PAGE_LADDER.iter().map(|s| s.condition).collect();
        assert_eq!(
            order,
            vec![LoadCondition::NetworkIdle, LoadCondition::Load, LoadCondition::DomContentLoaded, LoadCondition::Commit]
        );
        assert!(PAGE_LADDER.windows(2).all(|w| w[0].timeout > w[1].timeout));
        assert!(SOURCE_LADDER.windows(2).all(|w| w[0].timeout > w[1].timeout));
    }

    #[test]
    fn stealth_script_carries_identity() {
        let pool = FingerprintPool::generate(1);
        let id = pool.current();
        let js = stealth_script(&id);
        assert!(js.contains("'webdriver', undefined"));
        assert!(js.contains(&format!("'hardwareConcurrency', {}", id.hardware_concurrency)));
        assert!(js.contains(&serde_json::to_string(&id.languages()).unwrap()));
    }
}
