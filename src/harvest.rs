//! Date-range harvest: scan each day, format, filter, export.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use logger::{DateScanEvent, EventLogger, TelegramNotifier};
use rand::Rng;
use rate_client::{ClientError, ErrorKind, ReqwestTransport, Transport};
use row_formatter::{filter_rows, format_rows, sort_rows, write_csv, write_xlsx, FilterConfig, OutputRow};
use sofascore_feed::{EventAggregator, Sport};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::DATE_FORMAT;

#[derive(Debug, Clone, PartialEq)]
pub struct DateScan {
    pub joined: usize,
    pub rows: Vec<OutputRow>,
    /// Rows before filtering.
    pub formatted: usize,
}

#[derive(Debug, Default)]
pub struct HarvestReport {
    pub rows: Vec<OutputRow>,
    pub scanned: usize,
    pub failed: Vec<(NaiveDate, String)>,
}

/// Timeouts and blocks are routine and stay out of the chat.
pub fn should_notify(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ClientError>().map_or(true, |e| !e.is_session_noise())
}

pub struct Harvester<T: Transport = ReqwestTransport> {
    aggregator: EventAggregator<T>,
    sport: Sport,
    filter: FilterConfig,
    date_timeout: Duration,
    pause_min: Duration,
    pause_max: Duration,
    notifier: Option<TelegramNotifier>,
    audit: Option<EventLogger>,
}

impl<T: Transport> Harvester<T> {
    pub fn new(aggregator: EventAggregator<T>, sport: Sport, filter: FilterConfig) -> Self {
        Self {
            aggregator,
            sport,
            filter,
            date_timeout: Duration::from_secs(900),
            pause_min: Duration::from_secs(2),
            pause_max: Duration::from_secs(5),
            notifier: None,
            audit: None,
        }
    }

    pub fn with_date_timeout(mut self, timeout: Duration) -> Self {
        self.date_timeout = timeout;
        self
    }

    /// Random wait between consecutive dates.
    pub fn with_pause(mut self, min: Duration, max: Duration) -> Self {
        self.pause_min = min;
        self.pause_max = max.max(min);
        self
    }

    pub fn with_notifier(mut self, notifier: Option<TelegramNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_audit_log(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.audit = Some(EventLogger::new(log_dir));
        self
    }

    pub fn sport(&self) -> Sport {
        self.sport
    }

    /// One day under the date deadline. Dropping the aggregator future on
    /// expiry cancels its in-flight sub-fetches.
    pub async fn scan_date(&self, date: NaiveDate) -> Result<DateScan> {
        let day = date.format(DATE_FORMAT).to_string();
        let records = match tokio::time::timeout(self.date_timeout, self.aggregator.fetch_for_date(self.sport, &day)).await {
            Ok(fetched) => fetched?,
            Err(_) => {
                return Err(ClientError::new(
                    ErrorKind::Timeout,
                    format!("{} {}", self.sport, day),
                    format!("date scan exceeded {}s", self.date_timeout.as_secs()),
                )
                .into())
            }
        };

        let formatted = format_rows(self.sport, &records);
        let total = formatted.len();
        let rows = filter_rows(formatted, &self.filter);
        Ok(DateScan { joined: records.len(), rows, formatted: total })
    }

    /// Scans every date in order. A failed date is logged, audited and
    /// notified, then skipped.
    pub async fn run(&self, dates: &[NaiveDate]) -> HarvestReport {
        let mut report = HarvestReport::default();

        for (i, date) in dates.iter().enumerate() {
            info!(sport = %self.sport, "📅 Scanning {} ({}/{})", date, i + 1, dates.len());
            match self.scan_date(*date).await {
                Ok(scan) => {
                    info!("✅ {}: {} events joined, {} rows kept", date, scan.joined, scan.rows.len());
                    self.audit_scan(*date, Some(&scan), None);
                    report.scanned += 1;
                    report.rows.extend(scan.rows);
                }
                Err(e) => {
                    let reason = format!("{e:#}");
                    error!("❌ {} failed: {}", date, reason);
                    self.audit_scan(*date, None, Some(reason.clone()));
                    report.failed.push((*date, reason));
                    if should_notify(&e) {
                        if let Some(n) = &self.notifier {
                            n.notify_error(&e.context(format!("{} scan for {}", self.sport, date))).await;
                        }
                    } else {
                        warn!("Not notifying {} failure for {}", self.sport, date);
                    }
                }
            }

            if i + 1 < dates.len() {
                tokio::time::sleep(self.pause()).await;
            }
        }

        sort_rows(&mut report.rows);
        report
    }

    fn pause(&self) -> Duration {
        let (min, max) = (self.pause_min.as_millis() as u64, self.pause_max.as_millis() as u64);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    fn audit_scan(&self, date: NaiveDate, scan: Option<&DateScan>, error: Option<String>) {
        let Some(audit) = &self.audit else { return };
        let event = DateScanEvent {
            sport: self.sport.to_string(),
            date: date.format(DATE_FORMAT).to_string(),
            joined: scan.map_or(0, |s| s.joined),
            rows: scan.map_or(0, |s| s.formatted),
            rows_kept: scan.map_or(0, |s| s.rows.len()),
            error,
        };
        if let Err(e) = audit.log(&event) {
            warn!("audit log write failed: {}", e);
        }
    }
}

/// `{sport}_{from}_{to}` as workbook and CSV. Nothing is written for an
/// empty row set.
pub fn export(rows: &[OutputRow], dir: &Path, sport: Sport, from: NaiveDate, to: NaiveDate) -> Result<Vec<PathBuf>> {
    if rows.is_empty() {
        warn!("No rows to export for {} {}..{}", sport, from, to);
        return Ok(Vec::new());
    }
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let stem = format!("{}_{}_{}", sport, from.format(DATE_FORMAT), to.format(DATE_FORMAT));

    let mut written = Vec::new();
    let xlsx = dir.join(format!("{stem}.xlsx"));
    if write_xlsx(rows, &xlsx)? {
        written.push(xlsx);
    }
    let csv = dir.join(format!("{stem}.csv"));
    if write_csv(rows, &csv)? {
        written.push(csv);
    }
    for path in &written {
        info!("📦 Exported {} rows to {}", rows.len(), path.display());
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use identity_pool::FingerprintPool;
    use rate_client::{ClientSession, PacingConfig, SessionConfig, TransportError, TransportRequest, TransportResponse};
    use sofascore_feed::Endpoints;
    use std::collections::HashMap;
    use std::sync::Arc;

    // 2024-03-01 12:00 Athens
    const NOON: i64 = 1_709_287_200;
    const DAY: i64 = 86_400;

    /// Canned bodies by url; unknown urls are 404. A route body of `hang`
    /// never answers.
    struct Canned(HashMap<String, String>);

    #[async_trait]
    impl Transport for Canned {
        async fn send(&self, req: TransportRequest) -> Result<TransportResponse, TransportError> {
            match self.0.get(&req.url) {
                Some(b) if b == "hang" => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                Some(b) => Ok(TransportResponse { status: 200, body: b.clone() }),
                None => Ok(TransportResponse { status: 404, body: String::new() }),
            }
        }
    }

    fn schedule(id: u64, ts: i64) -> String {
        format!(
            r#"{{"events":[{{"id":{id},"startTimestamp":{ts},"status":{{"type":"finished"}},
            "homeTeam":{{"id":1,"name":"Lakers"}},"awayTeam":{{"id":2,"name":"Celtics"}},
            "tournament":{{"id":132,"name":"NBA"}},
            "homeScore":{{"current":101}},"awayScore":{{"current":99}}}}]}}"#
        )
    }

    fn harvester(routes: &[(&str, String)]) -> Harvester<Canned> {
        let routes = routes.iter().map(|(p, b)| (format!("http://fake{p}"), b.clone())).collect();
        let cfg = SessionConfig { pacing: PacingConfig::unpaced(), site: None, ..SessionConfig::default() };
        let session = ClientSession::with_transport(Canned(routes), None, Arc::new(FingerprintPool::generate(3)), cfg);
        let aggregator = EventAggregator::new(Arc::new(session)).with_endpoints(Endpoints::new("http://fake"));
        Harvester::new(aggregator, Sport::Basketball, FilterConfig::defaults(Sport::Basketball))
            .with_pause(Duration::ZERO, Duration::ZERO)
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn noise_is_not_notified() {
        let timeout: anyhow::Error = ClientError::new(ErrorKind::Timeout, "u", "slow").into();
        let forbidden: anyhow::Error = ClientError::new(ErrorKind::Forbidden, "u", "blocked").into();
        let server: anyhow::Error = ClientError::new(ErrorKind::ServerError, "u", "HTTP 500").into();
        assert!(!should_notify(&timeout));
        assert!(!should_notify(&forbidden));
        assert!(should_notify(&server));
        assert!(should_notify(&anyhow::anyhow!("disk full")));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_date_is_skipped() {
        let h = harvester(&[("/sport/basketball/scheduled-events/2024-03-01", schedule(7, NOON))]);
        let report = h.run(&[d("2024-03-01"), d("2024-03-02")]).await;

        assert_eq!(report.scanned, 1);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, d("2024-03-02"));
    }

    #[tokio::test(start_paused = true)]
    async fn rows_from_all_dates_are_sorted() {
        let h = harvester(&[
            ("/sport/basketball/scheduled-events/2024-03-02", schedule(8, NOON + DAY)),
            ("/sport/basketball/scheduled-events/2024-03-01", schedule(7, NOON)),
        ]);
        let report = h.run(&[d("2024-03-02"), d("2024-03-01")]).await;
        let keys: Vec<String> = report.rows.iter().map(OutputRow::sort_key).collect();
        assert_eq!(keys.len(), 2);
        assert!(keys[0] < keys[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn date_deadline_becomes_timeout() {
        let h = harvester(&[("/sport/basketball/scheduled-events/2024-03-01", "hang".to_string())])
            .with_date_timeout(Duration::from_secs(30));
        let err = h.scan_date(d("2024-03-01")).await.unwrap_err();
        let client = err.downcast_ref::<ClientError>().unwrap();
        assert_eq!(client.kind, ErrorKind::Timeout);
        assert!(!should_notify(&err));
    }

    #[test]
    fn export_names_and_empty_set() {
        let dir = std::env::temp_dir().join(format!("harvest_export_{}", std::process::id()));
        let none = export(&[], &dir, Sport::Football, d("2024-03-01"), d("2024-03-02")).unwrap();
        assert!(none.is_empty());
        assert!(!dir.join("football_2024-03-01_2024-03-02.csv").exists());
    }
}
