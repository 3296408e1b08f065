/// OddsHarvest: Logger
/// JSONL audit trail, Telegram notifications, error payloads

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A record in the audit trail. `KIND` is written as the `event` field and
/// names the file the record lands in.
pub trait AuditEvent: Serialize {
    const KIND: &'static str;
}

#[derive(Serialize)]
struct Envelope<'a, E> {
    ts: String,
    event: &'static str,
    #[serde(flatten)]
    body: &'a E,
}

/// One JSONL file per event kind and UTC day: `{dir}/{kind}-{date}.jsonl`.
pub struct EventLogger {
    log_dir: PathBuf,
}

impl EventLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self { log_dir: log_dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn path_for<E: AuditEvent>(&self, day: DateTime<Utc>) -> PathBuf {
        let kind = E::KIND.to_ascii_lowercase().replace('_', "-");
        self.log_dir.join(format!("{}-{}.jsonl", kind, day.format("%Y-%m-%d")))
    }

    /// Stamps the event and appends it as one line.
    pub fn log<E: AuditEvent>(&self, event: &E) -> Result<()> {
        let now = Utc::now();
        let line = serde_json::to_string(&Envelope { ts: iso(now), event: E::KIND, body: event })
            .with_context(|| format!("encoding {} event", E::KIND))?;
        fs::create_dir_all(&self.log_dir)
            .with_context(|| format!("creating {}", self.log_dir.display()))?;
        let path = self.path_for::<E>(now);
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        writeln!(f, "{line}").with_context(|| format!("appending to {}", path.display()))
    }
}

fn iso(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// UTC, millisecond precision, `Z` suffix.
pub fn now_iso() -> String {
    iso(Utc::now())
}

// ── Event types ───────────────────────────────────────────────────────────────

/// One optional resource fetched for an event.
#[derive(Serialize, Debug)]
pub struct SubFetchEvent {
    pub event_id: u64,
    pub resource: String,         // "winning-odds" | "pregame-form" | ...
    pub outcome:  String,         // "ok" | "absent" | "error"
    pub detail:   Option<String>,
}

impl AuditEvent for SubFetchEvent {
    const KIND: &'static str = "SUB_FETCH";
}

#[derive(Serialize, Debug)]
pub struct DateScanEvent {
    pub sport:       String,
    pub date:        String,
    pub joined:      usize,          // events that produced a joined record
    pub rows:        usize,          // rows formatted (void events skipped)
    pub rows_kept:   usize,          // rows left after filtering
    pub error:       Option<String>,
}

impl AuditEvent for DateScanEvent {
    const KIND: &'static str = "DATE_SCAN";
}

#[derive(Serialize, Debug)]
pub struct TicketScrapeEvent {
    pub event_id:    String,
    pub attempt:     u32,
    pub direct:      bool,           // true for the no-proxy fallback attempt
    pub proxy:       Option<String>,
    pub ticket_count: usize,
    pub error:       Option<String>,
}

impl AuditEvent for TicketScrapeEvent {
    const KIND: &'static str = "TICKET_SCRAPE";
}

/// A request that gave up after its retries.
#[derive(Serialize, Debug)]
pub struct RequestFailedEvent {
    pub url:     String,
    pub kind:    String,
    pub retries: u32,
    pub message: String,
}

impl AuditEvent for RequestFailedEvent {
    const KIND: &'static str = "REQUEST_FAILED";
}

// ── Error payloads ────────────────────────────────────────────────────────────

/// Flattens an error and its source chain into a JSON map for notifications.
pub fn error_payload(err: &anyhow::Error) -> Value {
    let mut map = Map::new();
    map.insert("message".into(), Value::String(err.to_string()));
    let causes: Vec<Value> = err
        .chain()
        .skip(1)
        .map(|c| Value::String(c.to_string()))
        .collect();
    if !causes.is_empty() {
        map.insert("causes".into(), Value::Array(causes));
    }
    map.insert("ts".into(), Value::String(now_iso()));
    Value::Object(map)
}

// ── Telegram ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct TelegramNotifier {
    client:  reqwest::Client,
    token:   String,
    chat_id: String,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            token: token.into(),
            chat_id: chat_id.into(),
            api_base: "https://api.telegram.org".to_string(),
        }
    }

    /// `None` when TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID are not both set.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN").ok().filter(|t| !t.trim().is_empty())?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok().filter(|c| !c.trim().is_empty())?;
        Some(Self::new(token, chat_id))
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let body = json!({
            "chat_id": self.chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        let resp = self.client.post(&url).json(&body).send().await
            .context("Telegram request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram sendMessage failed: {} {}", status, body);
        }
        Ok(())
    }

    /// Delivery problems are logged and swallowed.
    pub async fn notify(&self, text: &str) {
        match self.send_message(text).await {
            Ok(())  => tracing::info!("📨 Telegram notification sent"),
            Err(e)  => tracing::warn!("Telegram notification failed: {:#}", e),
        }
    }

    pub async fn notify_error(&self, err: &anyhow::Error) {
        let payload = error_payload(err);
        let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| err.to_string());
        self.notify(&text).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_keeps_cause_chain() {
        let err = anyhow::anyhow!("socket closed").context("fetching 2024-03-01");
        let payload = error_payload(&err);
        assert_eq!(payload["message"], "fetching 2024-03-01");
        assert_eq!(payload["causes"][0], "socket closed");
        assert!(payload["ts"].is_string());
    }

    #[test]
    fn payload_without_causes_has_no_causes_key() {
        let payload = error_payload(&anyhow::anyhow!("boom"));
        assert!(payload.get("causes").is_none());
    }

    fn scan(n: usize) -> DateScanEvent {
        DateScanEvent {
            sport: "football".into(),
            date: "2024-03-01".into(),
            rows: n,
            joined: n,
            rows_kept: n,
            error: None,
        }
    }

    #[test]
    fn logger_appends_stamped_lines_per_kind() {
        let dir = std::env::temp_dir().join(format!("odds-harvest-log-{}", std::process::id()));
        let logger = EventLogger::new(&dir);
        for n in 0..2 {
            logger.log(&scan(n)).unwrap();
        }
        logger
            .log(&RequestFailedEvent { url: "https://x/y".into(), kind: "timeout".into(), retries: 3, message: "slow".into() })
            .unwrap();

        let file = logger.path_for::<DateScanEvent>(Utc::now());
        assert!(file.file_name().unwrap().to_string_lossy().starts_with("date-scan-"));
        let content = fs::read_to_string(&file).unwrap();
        let lines: Vec<Value> = content.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["event"], "DATE_SCAN");
        assert_eq!(lines[1]["rows_kept"], 1);
        assert!(lines[0]["ts"].as_str().unwrap().ends_with('Z'));

        let failed = fs::read_to_string(logger.path_for::<RequestFailedEvent>(Utc::now())).unwrap();
        assert!(failed.contains("\"event\":\"REQUEST_FAILED\""));
        assert!(!failed.contains("DATE_SCAN"));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn timestamps_carry_milliseconds() {
        let ts = now_iso();
        let parsed = DateTime::parse_from_rfc3339(&ts).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
        assert_eq!(ts.len(), "2024-03-01T12:00:00.000Z".len());
    }

    #[tokio::test]
    async fn notify_swallows_delivery_failure() {
        // nothing listens on port 9 locally; the call must return without panicking
        let notifier = TelegramNotifier::new("token", "1").with_api_base("http://127.0.0.1:9");
        notifier.notify("hello").await;
    }
}
