use crate::behavior::{BrowseOptions, HumanBehavior, Intensity};
use crate::browser::{
    BrowserError, BrowserLauncher, BrowserPage, LaunchConfig, LoadCondition, NavigationStrategy, DIRECT_LADDER,
    PAGE_LADDER, SOURCE_LADDER,
};
use crate::chrome::ChromeLauncher;
use crate::extract::{extract_tickets, ExtractionError, TicketRow};
use crate::filters::{apply_filters, FilterReport};
use crate::selectors::SelectorSet;
use identity_pool::{FingerprintPool, NetworkIdentity, ProxyEndpoint, ProxyPool};
use logger::{EventLogger, TicketScrapeEvent};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://www.stubhub.com";

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub base_url: String,
    pub max_retries: u32,
    pub use_proxy: bool,
    pub headless: bool,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub backoff_jitter: Duration,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: 5,
            use_proxy: true,
            headless: true,
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(10),
            backoff_jitter: Duration::from_secs(1),
        }
    }
}

impl ScraperConfig {
    pub fn event_url(&self, event_id: &str) -> String {
        format!("{}/event/{}/?quantity=0", self.base_url.trim_end_matches('/'), event_id)
    }

    /// `min(cap, base * 2^(attempt-1))`, before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor).min(self.backoff_cap)
    }
}

/// Why one attempt failed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AttemptError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error("every navigation strategy failed for {url}: {last}")]
    Navigation { url: String, last: BrowserError },
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

#[derive(Debug, Error)]
pub enum TicketScrapeError {
    #[error("ticket scrape for event {event_id} failed after {attempts} attempts: {last}")]
    Exhausted { event_id: String, attempts: u32, last: AttemptError },
}

impl TicketScrapeError {
    pub fn attempts(&self) -> u32 {
        match self {
            TicketScrapeError::Exhausted { attempts, .. } => *attempts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub event_id: String,
    pub tickets: Vec<TicketRow>,
    /// Attempts consumed, counting the direct fallback.
    pub attempts: u32,
    pub direct: bool,
    pub proxy: Option<String>,
    pub page_strategy: LoadCondition,
    pub source_strategy: LoadCondition,
    pub filters: FilterReport,
    pub elapsed: Duration,
}

struct AttemptSuccess {
    tickets: Vec<TicketRow>,
    page_strategy: LoadCondition,
    source_strategy: LoadCondition,
    filters: FilterReport,
}

/// Browser-driven ticket extraction with proxy rotation and a bounded
/// number of whole-browser attempts.
pub struct TicketScraper<L: BrowserLauncher = ChromeLauncher> {
    launcher: L,
    proxies: Option<Arc<ProxyPool>>,
    fingerprints: Arc<FingerprintPool>,
    selectors: SelectorSet,
    human: HumanBehavior,
    config: ScraperConfig,
    audit: Option<EventLogger>,
}

impl TicketScraper<ChromeLauncher> {
    pub fn new(proxies: Option<Arc<ProxyPool>>, fingerprints: Arc<FingerprintPool>, config: ScraperConfig) -> Self {
        Self::with_launcher(ChromeLauncher::default(), proxies, fingerprints, config)
    }
}

impl<L: BrowserLauncher> TicketScraper<L> {
    pub fn with_launcher(
        launcher: L,
        proxies: Option<Arc<ProxyPool>>,
        fingerprints: Arc<FingerprintPool>,
        config: ScraperConfig,
    ) -> Self {
        Self {
            launcher,
            proxies: proxies.filter(|p| !p.is_empty()),
            fingerprints,
            selectors: SelectorSet::default(),
            human: HumanBehavior::default(),
            config,
            audit: None,
        }
    }

    pub fn with_selectors(mut self, selectors: SelectorSet) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_behavior(mut self, human: HumanBehavior) -> Self {
        self.human = human;
        self
    }

    pub fn with_audit_log(mut self, log_dir: impl Into<std::path::PathBuf>) -> Self {
        self.audit = Some(EventLogger::new(log_dir));
        self
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    fn proxy_pool(&self) -> Option<&ProxyPool> {
        if self.config.use_proxy {
            self.proxies.as_deref()
        } else {
            None
        }
    }

    pub async fn scrape(&self, event_id: &str) -> Result<ScrapeOutcome, TicketScrapeError> {
        let started = Instant::now();
        let max = self.config.max_retries.max(1);
        let mut last_err = None;

        for attempt in 1..=max {
            let proxy = self.proxy_pool().and_then(|p| p.current());
            match &proxy {
                Some(p) => info!(
                    "🎫 Event {} attempt {}/{} via {} ({})",
                    event_id,
                    attempt,
                    max,
                    p,
                    p.country.as_deref().unwrap_or("??")
                ),
                None => info!("🎫 Event {} attempt {}/{} direct", event_id, attempt, max),
            }

            let result = self.run_attempt(event_id, proxy.clone(), &PAGE_LADDER, &SOURCE_LADDER).await;
            self.audit(event_id, attempt, false, proxy.as_ref(), &result);
            match result {
                Ok(ok) => return Ok(self.outcome(event_id, ok, attempt, false, proxy, started)),
                Err(e) => {
                    error!("Attempt {} for event {} failed: {}", attempt, event_id, e);
                    last_err = Some(e);
                }
            }

            if attempt < max {
                if let Some(pool) = self.proxy_pool() {
                    pool.rotate();
                    info!("🔄 Rotated to the next proxy for the retry");
                }
                let jitter = rand::thread_rng().gen_range(0.0..=self.config.backoff_jitter.as_secs_f64());
                let wait = self.config.backoff(attempt) + Duration::from_secs_f64(jitter);
                info!("⏳ Waiting {}ms before retry", wait.as_millis());
                tokio::time::sleep(wait).await;
            }
        }

        let mut attempts = max;
        if self.proxy_pool().is_some() {
            warn!("All proxy attempts failed, trying a direct connection as last resort");
            attempts += 1;
            let result = self.run_attempt(event_id, None, &DIRECT_LADDER, &DIRECT_LADDER).await;
            self.audit(event_id, attempts, true, None, &result);
            match result {
                Ok(ok) => {
                    warn!("⚠️ Scraped event {} without a proxy; rate limits may follow", event_id);
                    return Ok(self.outcome(event_id, ok, attempts, true, None, started));
                }
                Err(e) => {
                    error!("Direct fallback for event {} failed: {}", event_id, e);
                    last_err = Some(e);
                }
            }
        }

        Err(TicketScrapeError::Exhausted {
            event_id: event_id.to_string(),
            attempts,
            last: last_err.unwrap_or(AttemptError::Browser(BrowserError::Closed)),
        })
    }

    fn outcome(
        &self,
        event_id: &str,
        ok: AttemptSuccess,
        attempts: u32,
        direct: bool,
        proxy: Option<ProxyEndpoint>,
        started: Instant,
    ) -> ScrapeOutcome {
        info!("✅ Event {}: {} tickets after {} attempt(s)", event_id, ok.tickets.len(), attempts);
        ScrapeOutcome {
            event_id: event_id.to_string(),
            tickets: ok.tickets,
            attempts,
            direct,
            proxy: proxy.map(|p| p.key()),
            page_strategy: ok.page_strategy,
            source_strategy: ok.source_strategy,
            filters: ok.filters,
            elapsed: started.elapsed(),
        }
    }

    /// Chromium identities only, since the browser is Chrome.
    fn browser_identity(&self) -> Arc<NetworkIdentity> {
        let first = self.fingerprints.random();
        if first.is_chromium() {
            return first;
        }
        (0..self.fingerprints.len())
            .map(|_| self.fingerprints.next())
            .find(|id| id.is_chromium())
            .unwrap_or(first)
    }

    /// One browser, start to finish. The page is closed on every path.
    async fn run_attempt(
        &self,
        event_id: &str,
        proxy: Option<ProxyEndpoint>,
        page_ladder: &[NavigationStrategy],
        source_ladder: &[NavigationStrategy],
    ) -> Result<AttemptSuccess, AttemptError> {
        let identity = self.browser_identity();
        let config = LaunchConfig {
            identity: identity.clone(),
            proxy: proxy.clone(),
            headless: self.config.headless,
            // same size the stealth script reports as the screen
            window: identity.viewport,
        };
        let mut page = match self.launcher.launch(&config).await {
            Ok(page) => page,
            Err(e) => {
                self.observe(proxy.as_ref(), Err(&e), None);
                return Err(e.into());
            }
        };

        let result = self
            .drive(page.as_mut(), &identity, event_id, proxy.as_ref(), page_ladder, source_ladder)
            .await;
        if let Err(e) = page.close().await {
            warn!("Closing browser failed: {}", e);
        }
        result
    }

    async fn drive(
        &self,
        page: &mut dyn BrowserPage,
        identity: &NetworkIdentity,
        event_id: &str,
        proxy: Option<&ProxyEndpoint>,
        page_ladder: &[NavigationStrategy],
        source_ladder: &[NavigationStrategy],
    ) -> Result<AttemptSuccess, AttemptError> {
        page.prepare(identity).await?;

        let url = self.config.event_url(event_id);
        let nav_started = Instant::now();
        let page_strategy = match self.navigate_ladder(page, &url, page_ladder).await {
            Ok(condition) => {
                self.observe(proxy, Ok(()), Some(nav_started.elapsed()));
                condition
            }
            Err(e) => {
                self.observe(proxy, Err(&e), None);
                return Err(AttemptError::Navigation { url, last: e });
            }
        };

        self.human.pause(3000, 6000).await;
        info!("Page loaded");
        self.human.browse(page, BrowseOptions::new(Intensity::Medium, 3000, 6000)).await;
        let filters = apply_filters(page, &self.selectors, &self.human).await;
        self.human.browse(page, BrowseOptions::new(Intensity::Light, 2000, 4000)).await;

        let source_url = format!("view-source:{url}");
        info!("Fetching data from {}", source_url);
        let source_strategy = self
            .navigate_ladder(page, &source_url, source_ladder)
            .await
            .map_err(|last| AttemptError::Navigation { url: source_url.clone(), last })?;

        self.human.pause(2000, 4000).await;
        self.human
            .browse(page, BrowseOptions::new(Intensity::Light, 1000, 2000).without_cursor())
            .await;

        let html = page.content().await?;
        let tickets = extract_tickets(&html)?;
        Ok(AttemptSuccess { tickets, page_strategy, source_strategy, filters })
    }

    /// First strategy that succeeds wins; a 2-4s pause separates tries.
    async fn navigate_ladder(
        &self,
        page: &mut dyn BrowserPage,
        url: &str,
        ladder: &[NavigationStrategy],
    ) -> Result<LoadCondition, BrowserError> {
        let mut last = BrowserError::Closed;
        for (i, strategy) in ladder.iter().enumerate() {
            info!("Navigating with {}, timeout {}s", strategy.condition, strategy.timeout.as_secs());
            match page.navigate(url, *strategy).await {
                Ok(()) => {
                    info!("Navigation succeeded with {}", strategy.condition);
                    return Ok(strategy.condition);
                }
                Err(e) => {
                    warn!("Navigation with {} failed: {}", strategy.condition, e);
                    last = e;
                    if i + 1 < ladder.len() {
                        self.human.pause(2000, 4000).await;
                    }
                }
            }
        }
        Err(last)
    }

    /// Records a navigation outcome against the proxy that carried it.
    fn observe(&self, proxy: Option<&ProxyEndpoint>, outcome: Result<(), &BrowserError>, took: Option<Duration>) {
        let (Some(pool), Some(endpoint)) = (self.proxy_pool(), proxy) else {
            return;
        };
        match outcome {
            Ok(()) => pool.mark_successful(endpoint, took),
            Err(e) => pool.mark_failed(endpoint, &e.to_string()),
        }
    }

    fn audit(
        &self,
        event_id: &str,
        attempt: u32,
        direct: bool,
        proxy: Option<&ProxyEndpoint>,
        result: &Result<AttemptSuccess, AttemptError>,
    ) {
        if let Some(audit) = &self.audit {
            let _ = audit.log(&TicketScrapeEvent {
                event_id: event_id.to_string(),
                attempt,
                direct,
                proxy: proxy.map(|p| p.key()),
                ticket_count: result.as_ref().map(|ok| ok.tickets.len()).unwrap_or(0),
                error: result.as_ref().err().map(|e| e.to_string()),
            });
        }
    }
}
