//! In-memory browser doubles for unit tests.

use crate::browser::{BrowserError, BrowserLauncher, BrowserPage, LaunchConfig, LoadCondition, NavigationStrategy};
use async_trait::async_trait;
use identity_pool::NetworkIdentity;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct PageLog {
    pub scripts: Vec<String>,
    pub navigations: Vec<(String, LoadCondition, bool)>,
    pub prepared: usize,
    pub closed: usize,
}

#[derive(Default)]
pub struct FakePage {
    rules: Vec<(String, Value)>,
    /// Navigations under these conditions fail.
    pub failing: Vec<LoadCondition>,
    pub html: String,
    pub log: Arc<Mutex<PageLog>>,
}

impl FakePage {
    pub fn serving(html: impl Into<String>) -> Self {
        Self { html: html.into(), ..Self::default() }
    }

    pub fn failing_on(mut self, conditions: &[LoadCondition]) -> Self {
        self.failing = conditions.to_vec();
        self
    }

    /// Scripts containing `needle` evaluate to `value`; everything else is null.
    pub fn on_script(&mut self, needle: &str, value: Value) {
        self.rules.push((needle.to_string(), value));
    }

    pub fn scripts(&self) -> Vec<String> {
        self.log.lock().unwrap().scripts.clone()
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn prepare(&mut self, _identity: &NetworkIdentity) -> Result<(), BrowserError> {
        self.log.lock().unwrap().prepared += 1;
        Ok(())
    }

    async fn navigate(&mut self, url: &str, strategy: NavigationStrategy) -> Result<(), BrowserError> {
        let ok = !self.failing.contains(&strategy.condition);
        self.log.lock().unwrap().navigations.push((url.to_string(), strategy.condition, ok));
        if ok {
            Ok(())
        } else {
            Err(BrowserError::Timeout(strategy.condition))
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, BrowserError> {
        self.log.lock().unwrap().scripts.push(script.to_string());
        Ok(self
            .rules
            .iter()
            .find(|(needle, _)| script.contains(needle.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Null))
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        Ok(self.html.clone())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.log.lock().unwrap().closed += 1;
        Ok(())
    }
}

/// Hands out queued pages, one per launch; an empty queue fails the launch.
#[derive(Default)]
pub struct FakeLauncher {
    pages: Mutex<VecDeque<FakePage>>,
    pub launches: Mutex<Vec<LaunchConfig>>,
    pub logs: Mutex<Vec<Arc<Mutex<PageLog>>>>,
}

impl FakeLauncher {
    pub fn with_pages(pages: Vec<FakePage>) -> Self {
        Self { pages: Mutex::new(pages.into()), ..Self::default() }
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    pub fn proxies_used(&self) -> Vec<Option<String>> {
        self.launches
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.proxy.as_ref().map(|p| p.key()))
            .collect()
    }

    pub fn total_closed(&self) -> usize {
        self.logs.lock().unwrap().iter().map(|l| l.lock().unwrap().closed).sum()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, config: &LaunchConfig) -> Result<Box<dyn BrowserPage>, BrowserError> {
        self.launches.lock().unwrap().push(config.clone());
        let page = self
            .pages
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| BrowserError::Launch("no browser available".into()))?;
        self.logs.lock().unwrap().push(page.log.clone());
        Ok(Box::new(page))
    }
}
