use scraper::{Html, Selector};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

const PAYLOAD_MARKER: &str = "rawPrice";
/// The payload usually sits around this row of the source view.
const EXPECTED_ROW: usize = 225;
const WINDOW: usize = 25;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("no table body found on the page")]
    NoTable,
    #[error("table has no rows")]
    NoRows,
    #[error("ticket payload not found in {rows} rows")]
    NotFound { rows: usize },
}

/// One ticket listing. Only `rawPrice` is guaranteed; every other key the
/// site sends is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRow {
    pub raw_price: f64,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub row: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub seat: Option<String>,
    #[serde(default, deserialize_with = "lenient_count", skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[derive(Deserialize)]
struct Envelope {
    grid: Grid,
}

#[derive(Deserialize)]
struct Grid {
    items: Vec<Value>,
}

/// Text of every `tr` in the first `tbody` of a rendered page.
pub fn table_rows(html: &str) -> Result<Vec<String>, ExtractionError> {
    let doc = Html::parse_document(html);
    let tbody = Selector::parse("tbody").map_err(|_| ExtractionError::NoTable)?;
    let tr = Selector::parse("tr").map_err(|_| ExtractionError::NoTable)?;

    let first = doc.select(&tbody).next().ok_or(ExtractionError::NoTable)?;
    let rows: Vec<String> = first.select(&tr).map(|r| r.text().collect::<String>()).collect();
    if rows.is_empty() {
        return Err(ExtractionError::NoRows);
    }
    Ok(rows)
}

/// `[min(225, max(0, n-25)), min(250, n))`
pub fn fast_window(total: usize) -> std::ops::Range<usize> {
    let start = EXPECTED_ROW.min(total.saturating_sub(WINDOW));
    let end = (EXPECTED_ROW + WINDOW).min(total);
    start..end
}

fn parse_payload(index: usize, text: &str) -> Option<Vec<TicketRow>> {
    if !text.contains(PAYLOAD_MARKER) {
        return None;
    }
    debug!("Payload marker in row {}", index);
    let envelope: Envelope = match serde_json::from_str(text.trim()) {
        Ok(e) => e,
        Err(e) => {
            warn!("Row {} looked like the payload but did not parse: {}", index, e);
            return None;
        }
    };

    let total = envelope.grid.items.len();
    let tickets: Vec<TicketRow> = envelope
        .grid
        .items
        .into_iter()
        .filter(|item| item.get("rawPrice").is_some_and(|p| !p.is_null()))
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if tickets.len() < total {
        debug!("Dropped {} listings without a usable rawPrice", total - tickets.len());
    }
    if tickets.is_empty() {
        warn!("Row {} has the payload shape but no priced listings", index);
        return None;
    }
    Some(tickets)
}

/// Scans the expected window first, then every row.
pub fn find_payload(rows: &[String]) -> Result<Vec<TicketRow>, ExtractionError> {
    let window = fast_window(rows.len());
    info!("🔎 Searching rows {} to {}", window.start, window.end);
    for i in window.clone() {
        if let Some(tickets) = parse_payload(i, &rows[i]) {
            info!("🎫 Price data found in row {}", i);
            return Ok(tickets);
        }
    }

    info!("Searching all {} rows for price data...", rows.len());
    for (i, text) in rows.iter().enumerate() {
        if window.contains(&i) {
            continue;
        }
        if let Some(tickets) = parse_payload(i, text) {
            info!("🎫 Price data found in row {}", i);
            return Ok(tickets);
        }
    }
    Err(ExtractionError::NotFound { rows: rows.len() })
}

pub fn extract_tickets(html: &str) -> Result<Vec<TicketRow>, ExtractionError> {
    let rows = table_rows(html)?;
    info!("Found {} source rows", rows.len());
    find_payload(&rows)
}
