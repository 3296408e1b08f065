use crate::behavior::{HumanBehavior, SCREEN};
use crate::browser::{BrowserError, BrowserPage};
use crate::selectors::{Probe, SelectorSet};
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Located {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub checked: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    NotFound,
    AlreadyOff,
    SwitchedOff,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterReport {
    pub panel_opened: bool,
    pub toggle: ToggleOutcome,
    /// `None` means the panel was dismissed by clicking outside it.
    pub closed_with: Option<String>,
}

impl FilterReport {
    fn untouched() -> Self {
        Self { panel_opened: false, toggle: ToggleOutcome::NotFound, closed_with: None }
    }
}

/// Centre and checked state of the first visible element the probe matches.
pub async fn locate(page: &mut dyn BrowserPage, probe: &Probe) -> Result<Option<Located>, BrowserError> {
    let script = format!(
        r#"(() => {{
  const el = {};
  if (!el) return null;
  const r = el.getBoundingClientRect();
  if (r.width === 0 && r.height === 0) return null;
  return {{ x: r.x + r.width / 2, y: r.y + r.height / 2, checked: typeof el.checked === 'boolean' ? el.checked : null }};
}})()"#,
        probe.locate_js()
    );
    let value = page.evaluate(&script).await?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(serde_json::from_value(value).ok())
}

async fn first_match(page: &mut dyn BrowserPage, probes: &[Probe]) -> Option<(Probe, Located)> {
    for probe in probes {
        match locate(page, probe).await {
            Ok(Some(hit)) => return Some((probe.clone(), hit)),
            Ok(None) => debug!("No match for {}", probe),
            Err(e) => debug!("Probe {} failed: {}", probe, e),
        }
    }
    None
}

async fn click(page: &mut dyn BrowserPage, human: &HumanBehavior, hit: Located) -> bool {
    match human.click_at(page, hit.x, hit.y).await {
        Ok(clicked) => clicked,
        Err(e) => {
            warn!("Click at ({:.0}, {:.0}) failed: {}", hit.x, hit.y, e);
            false
        }
    }
}

/// Opens the filter panel, switches off "recommended tickets" and closes the
/// panel again. Best effort: nothing in here fails the scrape.
pub async fn apply_filters(page: &mut dyn BrowserPage, selectors: &SelectorSet, human: &HumanBehavior) -> FilterReport {
    info!("Looking for the filter button...");
    let _ = human.move_mouse(page, (400.0, 200.0), (600.0, 300.0)).await;
    human.pause(500, 1000).await;

    let Some((probe, hit)) = first_match(page, &selectors.filter_button).await else {
        info!("No filter button matched, continuing without filters");
        return FilterReport::untouched();
    };
    if !click(page, human, hit).await {
        info!("Filter button {} did not take the click, continuing without filters", probe);
        return FilterReport::untouched();
    }
    info!("✅ Filter panel opened via {}", probe);
    human.pause(1500, 2500).await;

    let toggle = switch_off_recommended(page, selectors, human).await;
    let closed_with = close_panel(page, selectors, human).await;
    FilterReport { panel_opened: true, toggle, closed_with }
}

async fn switch_off_recommended(page: &mut dyn BrowserPage, selectors: &SelectorSet, human: &HumanBehavior) -> ToggleOutcome {
    human.pause(800, 1500).await;
    let found = match first_match(page, &selectors.recommended_toggle).await {
        Some(found) => Some(found),
        None => {
            info!("No recommended toggle matched, trying any toggle in the panel");
            first_match(page, &selectors.fallback_toggle).await
        }
    };
    let Some((probe, hit)) = found else {
        return ToggleOutcome::NotFound;
    };

    if hit.checked != Some(true) {
        info!("Recommended tickets toggle already off ({})", probe);
        return ToggleOutcome::AlreadyOff;
    }
    if click(page, human, hit).await {
        info!("✅ Recommended tickets toggle switched off ({})", probe);
        human.pause(1000, 2000).await;
        ToggleOutcome::SwitchedOff
    } else {
        ToggleOutcome::NotFound
    }
}

async fn close_panel(page: &mut dyn BrowserPage, selectors: &SelectorSet, human: &HumanBehavior) -> Option<String> {
    human.pause(1500, 2500).await;
    if let Some((probe, hit)) = first_match(page, &selectors.close_panel).await {
        if click(page, human, hit).await {
            info!("Filter panel closed via {}", probe);
            human.pause(1500, 2500).await;
            return Some(probe.to_string());
        }
    }

    let (x, y) = selectors.outside_click;
    info!("Closing filter panel by clicking outside at ({x}, {y})");
    let _ = human.move_mouse(page, (SCREEN.0 / 4.0, SCREEN.1 / 4.0), (x, y)).await;
    let script = format!("document.elementFromPoint({x:.1}, {y:.1})?.click()");
    if let Err(e) = page.evaluate(&script).await {
        warn!("Outside click failed: {}", e);
    }
    human.pause(1500, 2500).await;
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePage;
    use serde_json::json;

    fn selectors() -> SelectorSet {
        SelectorSet {
            filter_button: vec![Probe::css("#missing"), Probe::css("#filters")],
            recommended_toggle: vec![Probe::css("#recommended")],
            fallback_toggle: vec![],
            close_panel: vec![Probe::css("#view")],
            outside_click: (100.0, 100.0),
        }
    }

    #[tokio::test]
    async fn full_filter_flow() {
        let mut page = FakePage::default();
        page.on_script("#filters", json!({"x": 10.0, "y": 20.0, "checked": null}));
        page.on_script("#recommended", json!({"x": 30.0, "y": 40.0, "checked": true}));
        page.on_script("#view", json!({"x": 50.0, "y": 60.0}));
        page.on_script("elementFromPoint", json!(true));

        let report = apply_filters(&mut page, &selectors(), &HumanBehavior::instant()).await;
        assert!(report.panel_opened);
        assert_eq!(report.toggle, ToggleOutcome::SwitchedOff);
        assert_eq!(report.closed_with.as_deref(), Some("#view"));
    }

    #[tokio::test]
    async fn missing_controls_are_not_fatal() {
        let mut page = FakePage::default();
        let report = apply_filters(&mut page, &selectors(), &HumanBehavior::instant()).await;
        assert_eq!(report, FilterReport::untouched());
    }

    #[tokio::test]
    async fn unchecked_toggle_is_left_alone_and_outside_click_closes() {
        let mut page = FakePage::default();
        page.on_script("#filters", json!({"x": 10.0, "y": 20.0}));
        page.on_script("#recommended", json!({"x": 30.0, "y": 40.0, "checked": false}));
        page.on_script("elementFromPoint", json!(true));

        let report = apply_filters(&mut page, &selectors(), &HumanBehavior::instant()).await;
        assert_eq!(report.toggle, ToggleOutcome::AlreadyOff);
        assert_eq!(report.closed_with, None);
        assert!(page.scripts().iter().any(|s| s.contains("elementFromPoint(100.0, 100.0)?.click()")));
    }
}
