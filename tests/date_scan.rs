//! Aggregator to formatter, end to end over a scripted transport.

use async_trait::async_trait;
use chrono::NaiveDate;
use identity_pool::FingerprintPool;
use odds_harvest::harvest::Harvester;
use rate_client::{ClientSession, PacingConfig, SessionConfig, Transport, TransportError, TransportRequest, TransportResponse};
use row_formatter::{format_rows, FieldFilter, FilterConfig, OutputRow};
use sofascore_feed::{Endpoints, EventAggregator, Sport};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// 2024-03-01 12:00 Athens
const NOON: i64 = 1_709_287_200;
const HOUR: i64 = 3_600;

struct Scripted {
    routes: HashMap<String, String>,
    hits: Mutex<Vec<String>>,
}

impl Scripted {
    fn hit(&self, path: &str) -> bool {
        let url = format!("http://fake{path}");
        self.hits.lock().unwrap().iter().any(|h| *h == url)
    }
}

#[async_trait]
impl Transport for Scripted {
    async fn send(&self, req: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.hits.lock().unwrap().push(req.url.clone());
        Ok(match self.routes.get(&req.url) {
            Some(body) => TransportResponse { status: 200, body: body.clone() },
            None => TransportResponse { status: 404, body: String::new() },
        })
    }
}

fn event(id: u64, ts: i64, status: &str) -> String {
    format!(
        r#"{{"id":{id},"startTimestamp":{ts},"status":{{"type":"{status}"}},
        "homeTeam":{{"id":{h},"name":"Home {id}"}},"awayTeam":{{"id":{a},"name":"Away {id}"}},
        "tournament":{{"id":17,"name":"Premier League","category":{{"name":"England"}}}}}}"#,
        h = id * 10,
        a = id * 10 + 1
    )
}

fn full_time(home: &str, away: &str) -> String {
    format!(
        r#"{{"markets":[{{"marketName":"Full time","choices":[
            {{"name":"1","fractionalValue":"{home}"}},
            {{"name":"X","fractionalValue":"5/2"}},
            {{"name":"2","fractionalValue":"{away}"}}]}}]}}"#
    )
}

/// Event 1 on the date, 2 on the next Athens day, 3 postponed, 4 on the
/// date with long odds.
fn football_day() -> Arc<ClientSession<Scripted>> {
    let schedule = format!(
        r#"{{"events":[{},{},{},{}]}}"#,
        event(1, NOON, "finished"),
        event(2, NOON + 13 * HOUR, "notstarted"),
        event(3, NOON, "postponed"),
        event(4, NOON + HOUR, "notstarted"),
    );
    let routes = [
        ("/sport/football/scheduled-events/2024-03-01".to_string(), schedule),
        ("/event/1/odds/1/all".to_string(), full_time("4/5", "3/1")),
        ("/event/2/odds/1/all".to_string(), full_time("1/2", "5/1")),
        ("/event/3/odds/1/all".to_string(), full_time("1/1", "1/1")),
        ("/event/4/odds/1/all".to_string(), full_time("3/1", "4/5")),
    ]
    .into_iter()
    .map(|(p, b)| (format!("http://fake{p}"), b))
    .collect();

    let transport = Scripted { routes, hits: Mutex::new(Vec::new()) };
    let cfg = SessionConfig { pacing: PacingConfig::unpaced(), site: None, ..SessionConfig::default() };
    Arc::new(ClientSession::with_transport(transport, None, Arc::new(FingerprintPool::generate(5)), cfg))
}

fn aggregator(session: Arc<ClientSession<Scripted>>) -> EventAggregator<Scripted> {
    EventAggregator::new(session).with_endpoints(Endpoints::new("http://fake"))
}

fn homes(rows: &[OutputRow]) -> Vec<String> {
    rows.iter()
        .map(|r| match r {
            OutputRow::Football(f) => f.home.clone(),
            OutputRow::Basketball(b) => b.game.clone(),
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn events_outside_the_local_date_are_not_fetched() {
    let session = football_day();
    let records = aggregator(session.clone()).fetch_for_date(Sport::Football, "2024-03-01").await.unwrap();

    let ids: Vec<u64> = records.iter().map(|r| r.event.id).collect();
    assert!(!ids.contains(&2));
    assert!(!session.transport().hit("/event/2/odds/1/all"));
    assert!(session.transport().hit("/event/1/odds/1/all"));
}

#[tokio::test(start_paused = true)]
async fn postponed_events_never_become_rows() {
    let records = aggregator(football_day()).fetch_for_date(Sport::Football, "2024-03-01").await.unwrap();
    let rows = format_rows(Sport::Football, &records);

    assert_eq!(homes(&rows), vec!["Home 1", "Home 4"]);
    let OutputRow::Football(first) = &rows[0] else { panic!("football row expected") };
    assert_eq!(first.date, "2024-03-01");
    assert_eq!(first.time, "12:00");
    assert_eq!(first.home_full_time_odd, Some(1.8));
}

#[tokio::test(start_paused = true)]
async fn harvest_applies_the_filter() {
    let mut filter = FilterConfig::defaults(Sport::Football);
    filter.set("homeFullTimeOdd", FieldFilter::Range { from: 1.0, to: 2.0 });

    let harvester = Harvester::new(aggregator(football_day()), Sport::Football, filter)
        .with_pause(Duration::ZERO, Duration::ZERO);
    let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let report = harvester.run(&[day]).await;

    assert_eq!(report.scanned, 1);
    assert!(report.failed.is_empty());
    assert_eq!(homes(&report.rows), vec!["Home 1"]);
}
