use crate::browser::{
    stealth_script, BrowserError, BrowserLauncher, BrowserPage, LaunchConfig, LoadCondition, NavigationStrategy,
};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::{Emulation, Page};
use headless_chrome::{Browser, LaunchOptions, Tab};
use identity_pool::NetworkIdentity;
use serde_json::Value;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task;
use tracing::{debug, info, warn};

const CHROME_ARGS: &[&str] = &[
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--no-first-run",
    "--no-zygote",
    "--disable-gpu",
    "--disable-blink-features=AutomationControlled",
    "--disable-features=VizDisplayCompositor,TranslateUI",
    "--disable-ipc-flooding-protection",
    "--incognito",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--disable-back-forward-cache",
    "--force-color-profile=srgb",
    "--disable-background-networking",
    "--disable-default-apps",
    "--disable-extensions",
    "--disable-sync",
    "--metrics-recording-only",
    "--no-report-upload",
    "--use-mock-keychain",
];

const POLL: Duration = Duration::from_millis(250);
const IDLE_QUIET: Duration = Duration::from_millis(750);

async fn blocking<T, F>(f: F) -> Result<T, BrowserError>
where
    F: FnOnce() -> Result<T, BrowserError> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| BrowserError::Script(format!("browser task failed: {e}")))?
}

fn launch_err(e: impl std::fmt::Display) -> BrowserError {
    BrowserError::Launch(e.to_string())
}

fn script_err(e: impl std::fmt::Display) -> BrowserError {
    BrowserError::Script(e.to_string())
}

/// Local Chrome/Chromium through the DevTools protocol.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    pub idle_timeout: Duration,
}

impl Default for ChromeLauncher {
    fn default() -> Self {
        Self { idle_timeout: Duration::from_secs(300) }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, config: &LaunchConfig) -> Result<Box<dyn BrowserPage>, BrowserError> {
        let proxy_server = config.proxy.as_ref().map(|p| p.server());
        let credentials = config.proxy.as_ref().and_then(|p| p.credentials.clone());
        let window = (config.window.width, config.window.height);
        let headless = config.headless;
        let idle = self.idle_timeout;

        match &proxy_server {
            Some(server) => info!("🌐 Launching Chrome via proxy {}", server),
            None => info!("🔗 Launching Chrome with a direct connection"),
        }

        let (browser, tab) = blocking(move || {
            let args: Vec<&OsStr> = CHROME_ARGS.iter().map(OsStr::new).collect();
            let options = LaunchOptions::default_builder()
                .headless(headless)
                .sandbox(false)
                .window_size(Some(window))
                .proxy_server(proxy_server.as_deref())
                .idle_browser_timeout(idle)
                .args(args)
                .build()
                .map_err(launch_err)?;

            let browser = Browser::new(options).map_err(launch_err)?;
            let tab = browser.new_tab().map_err(launch_err)?;
            if let Some(creds) = credentials {
                tab.enable_fetch(None, Some(true)).map_err(launch_err)?;
                tab.authenticate(Some(creds.username), Some(creds.password)).map_err(launch_err)?;
            }
            Ok((browser, tab))
        })
        .await?;

        Ok(Box::new(ChromePage { browser: Some(browser), tab: Some(tab) }))
    }
}

/// Dropping the page kills the browser process.
pub struct ChromePage {
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
}

impl ChromePage {
    fn tab(&self) -> Result<Arc<Tab>, BrowserError> {
        self.tab.clone().ok_or(BrowserError::Closed)
    }
}

fn nav_err<E: std::fmt::Display>(condition: LoadCondition) -> impl Fn(E) -> BrowserError {
    move |e| BrowserError::Navigation { condition, message: e.to_string() }
}

fn ready_state(tab: &Tab) -> Option<String> {
    tab.evaluate("document.readyState", false)
        .ok()
        .and_then(|r| r.value)
        .and_then(|v| v.as_str().map(str::to_string))
}

fn resource_count(tab: &Tab) -> Option<u64> {
    tab.evaluate("performance.getEntriesByType('resource').length", false)
        .ok()
        .and_then(|r| r.value)
        .and_then(|v| v.as_u64())
}

fn wait_for(tab: &Tab, deadline: Instant, condition: LoadCondition, done: impl Fn(&Tab) -> bool) -> Result<(), BrowserError> {
    while Instant::now() < deadline {
        if done(tab) {
            return Ok(());
        }
        std::thread::sleep(POLL);
    }
    Err(BrowserError::Timeout(condition))
}

fn navigate_blocking(tab: &Tab, url: &str, strategy: NavigationStrategy) -> Result<(), BrowserError> {
    let condition = strategy.condition;
    let deadline = Instant::now() + strategy.timeout;

    tab.set_default_timeout(strategy.timeout);
    tab.navigate_to(url).map_err(nav_err(condition))?;

    match condition {
        LoadCondition::Commit => Ok(()),
        LoadCondition::DomContentLoaded => wait_for(tab, deadline, condition, |t| {
            matches!(ready_state(t).as_deref(), Some("interactive") | Some("complete"))
        }),
        LoadCondition::Load => {
            tab.wait_until_navigated().map_err(nav_err(condition))?;
            Ok(())
        }
        LoadCondition::NetworkIdle => {
            tab.wait_until_navigated().map_err(nav_err(condition))?;
            wait_for(tab, deadline, condition, |t| ready_state(t).as_deref() == Some("complete"))?;
            // Idle once the resource count stops moving for a quiet period.
            let mut last = resource_count(tab);
            while Instant::now() < deadline {
                std::thread::sleep(IDLE_QUIET);
                let now = resource_count(tab);
                if now == last {
                    return Ok(());
                }
                last = now;
            }
            Err(BrowserError::Timeout(condition))
        }
    }
}

#[async_trait]
impl BrowserPage for ChromePage {
    async fn prepare(&mut self, identity: &NetworkIdentity) -> Result<(), BrowserError> {
        let tab = self.tab()?;
        let identity = identity.clone();
        blocking(move || {
            tab.enable_stealth_mode().map_err(script_err)?;
            tab.set_user_agent(&identity.user_agent, Some(&identity.accept_language), Some(&identity.platform))
                .map_err(script_err)?;

            let mut headers: HashMap<&str, &str> = HashMap::new();
            headers.insert("Accept-Language", &identity.accept_language);
            headers.insert(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8",
            );
            headers.insert("Upgrade-Insecure-Requests", "1");
            headers.insert("Cache-Control", "max-age=0");
            tab.set_extra_http_headers(headers).map_err(script_err)?;

            if let Err(e) = tab.call_method(Emulation::SetTimezoneOverride { timezone_id: identity.timezone.clone() }) {
                warn!("Timezone override {} rejected: {}", identity.timezone, e);
            }

            tab.call_method(Page::AddScriptToEvaluateOnNewDocument {
                source: stealth_script(&identity),
                world_name: None,
                include_command_line_api: None,
                run_immediately: None,
            })
            .map_err(script_err)?;
            debug!("Identity applied: {}", identity.user_agent);
            Ok(())
        })
        .await
    }

    async fn navigate(&mut self, url: &str, strategy: NavigationStrategy) -> Result<(), BrowserError> {
        let tab = self.tab()?;
        let url = url.to_string();
        let work = blocking(move || navigate_blocking(&tab, &url, strategy));
        // The blocking call honours its own deadline; this is the backstop.
        match tokio::time::timeout(strategy.timeout + Duration::from_secs(5), work).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::Timeout(strategy.condition)),
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, BrowserError> {
        let tab = self.tab()?;
        let script = script.to_string();
        blocking(move || {
            let result = tab.evaluate(&script, true).map_err(script_err)?;
            Ok(result.value.unwrap_or(Value::Null))
        })
        .await
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        let tab = self.tab()?;
        blocking(move || tab.get_content().map_err(script_err)).await
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        let tab = self.tab.take();
        let browser = self.browser.take();
        if tab.is_none() && browser.is_none() {
            return Ok(());
        }
        blocking(move || {
            if let Some(tab) = tab {
                if let Err(e) = tab.close(true) {
                    debug!("Tab close: {}", e);
                }
            }
            drop(browser);
            Ok(())
        })
        .await
    }
}
