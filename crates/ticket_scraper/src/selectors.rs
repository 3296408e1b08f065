use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One way of locating a control. Tried in order; the first visible hit wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Probe {
    Css(String),
    /// First `tag` element whose text contains `text`, optionally narrowed
    /// to a descendant matching `inner`.
    Text {
        tag: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        inner: Option<String>,
    },
}

impl Probe {
    pub fn css(s: &str) -> Self {
        Probe::Css(s.to_string())
    }

    pub fn text(tag: &str, text: &str) -> Self {
        Probe::Text { tag: tag.to_string(), text: text.to_string(), inner: None }
    }

    pub fn text_inner(tag: &str, text: &str, inner: &str) -> Self {
        Probe::Text { tag: tag.to_string(), text: text.to_string(), inner: Some(inner.to_string()) }
    }

    /// JS expression yielding the matched element or null.
    pub fn locate_js(&self) -> String {
        match self {
            Probe::Css(sel) => format!("document.querySelector({})", js_str(sel)),
            Probe::Text { tag, text, inner } => {
                let find = format!(
                    "Array.from(document.querySelectorAll({})).find(e => (e.textContent || '').includes({}))",
                    js_str(tag),
                    js_str(text)
                );
                match inner {
                    Some(inner) => format!("(({find}) || null)?.querySelector({}) ?? null", js_str(inner)),
                    None => format!("(({find}) || null)"),
                }
            }
        }
    }
}

impl std::fmt::Display for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Probe::Css(sel) => f.write_str(sel),
            Probe::Text { tag, text, inner: None } => write!(f, "{tag}:has-text(\"{text}\")"),
            Probe::Text { tag, text, inner: Some(i) } => write!(f, "{tag}:has-text(\"{text}\") {i}"),
        }
    }
}

fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Probe lists for the event page filter panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectorSet {
    pub filter_button: Vec<Probe>,
    pub recommended_toggle: Vec<Probe>,
    /// Any checkbox inside the open panel, used when no named toggle matched.
    pub fallback_toggle: Vec<Probe>,
    pub close_panel: Vec<Probe>,
    /// Page coordinates clicked when no close control is found.
    pub outside_click: (f64, f64),
}

impl Default for SelectorSet {
    fn default() -> Self {
        Self {
            filter_button: vec![
                Probe::css(r#"#event-detail-filter-container-mobile [role="combobox"][aria-label="Filters"]"#),
                Probe::css(r#"div[role="combobox"][aria-label="Filters"]"#),
                Probe::css(r#".sc-ad2f367c-3 [role="combobox"]"#),
                Probe::text("button", "Filters"),
                Probe::css(r#"[aria-label="Filters"]"#),
                Probe::css(r#"[data-testid="filters-button"]"#),
                Probe::css(r#"button[aria-controls*="filter"]"#),
                Probe::css(".filter-button"),
                Probe::css(r#"button[class*="filter"]"#),
                Probe::text("button", "Filter"),
                Probe::text(r#"[role="button"]"#, "Filters"),
            ],
            recommended_toggle: vec![
                Probe::css(r#"input[aria-label="Recommended passes"]"#),
                Probe::css(r#".sc-5e2ce041-0 input[type="checkbox"]"#),
                Probe::css(r#"#stubhub-event-detail-popular-filters input[type="checkbox"]"#),
                Probe::text_inner("label", "Recommended tickets", r#"input[type="checkbox"]"#),
                Probe::text_inner("label", "Recommended", r#"input[type="checkbox"]"#),
                Probe::css(r#"[data-testid*="recommended"] input[type="checkbox"]"#),
                Probe::css(r#"input[aria-label*="Recommended"]"#),
                Probe::css(r#"input[aria-label*="recommended"]"#),
                Probe::css(".recommended-toggle input"),
            ],
            fallback_toggle: vec![Probe::css(r#".sc-cc0fdab1-0 input[type="checkbox"]"#)],
            close_panel: vec![
                Probe::text("button", "View"),
                Probe::css(".sc-cc0fdab1-5"),
                Probe::css(r#"button[class*="View"]"#),
                Probe::css(r#"[aria-label="Close"]"#),
                Probe::text("button", "×"),
                Probe::css(".sc-cc0fdab1-1 button"),
                Probe::text("button", "Close"),
                Probe::css(r#"[data-testid="close-button"]"#),
                Probe::css(".close-button"),
            ],
            outside_click: (100.0, 100.0),
        }
    }
}

impl SelectorSet {
    /// Lists missing from the file keep their built-in defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading selector file {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing selector file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let set: SelectorSet = serde_json::from_str(r##"{"filterButton": [{"css": "#f"}, {"text": {"tag": "a", "text": "Go"}}]}"##).unwrap();
        assert_eq!(set.filter_button, vec![Probe::css("#f"), Probe::text("a", "Go")]);
        assert_eq!(set.close_panel, SelectorSet::default().close_panel);
        assert_eq!(set.outside_click, (100.0, 100.0));
    }

    #[test]
    fn locate_js_escapes_quotes() {
        let js = Probe::css(r#"[aria-label="Filters"]"#).locate_js();
        assert_eq!(js, r#"document.querySelector("[aria-label=\"Filters\"]")"#);
        let js = Probe::text_inner("label", "Recommended", "input").locate_js();
        assert!(js.contains(r#"querySelectorAll("label")"#));
        assert!(js.contains(r#"?.querySelector("input")"#));
    }
}
