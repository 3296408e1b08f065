//! Process-level plumbing shared by the binaries.

use crate::config::{ProxySettings, TicketSettings, LOG_DIR};
use anyhow::Result;
use identity_pool::{FingerprintPool, ProxyPool};
use std::sync::Arc;
use ticket_scraper::{ScraperConfig, SelectorSet, TicketScraper};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// `None` when proxies are disabled or none are configured.
pub fn build_proxy_pool(settings: &ProxySettings) -> Option<Arc<ProxyPool>> {
    if !settings.enabled {
        info!("Proxy usage disabled, connecting directly");
        return None;
    }
    if settings.endpoints.is_empty() {
        warn!("⚠️ No proxies configured, connecting directly");
        return None;
    }
    info!("🌐 Proxy pool with {} endpoints", settings.endpoints.len());
    Some(Arc::new(ProxyPool::new(settings.endpoints.clone())))
}

/// Chrome-backed scraper from the ticket settings, proxies from the
/// environment when the settings allow them.
pub fn build_ticket_scraper(settings: &TicketSettings) -> Result<TicketScraper> {
    let proxies = if settings.use_proxy { build_proxy_pool(&ProxySettings::from_env()?) } else { None };
    let selectors = match &settings.selectors {
        Some(path) => SelectorSet::load(path)?,
        None => SelectorSet::default(),
    };
    let config = ScraperConfig {
        base_url: settings.base_url.clone(),
        max_retries: settings.max_retries,
        use_proxy: settings.use_proxy,
        headless: settings.headless,
        ..ScraperConfig::default()
    };
    let fingerprints = Arc::new(FingerprintPool::generate(FingerprintPool::DEFAULT_SIZE));
    Ok(TicketScraper::new(proxies, fingerprints, config)
        .with_selectors(selectors)
        .with_audit_log(LOG_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use identity_pool::parse_proxy_list;

    #[test]
    fn pool_only_when_enabled_and_configured() {
        let endpoints = parse_proxy_list("http://10.0.0.1:3128,http://10.0.0.2:3128");
        let on = ProxySettings { enabled: true, endpoints: endpoints.clone() };
        let off = ProxySettings { enabled: false, endpoints };
        let empty = ProxySettings { enabled: true, endpoints: Vec::new() };

        assert!(build_proxy_pool(&on).is_some());
        assert!(build_proxy_pool(&off).is_none());
        assert!(build_proxy_pool(&empty).is_none());
    }
}
