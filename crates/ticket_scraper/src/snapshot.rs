use crate::extract::TicketRow;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketSnapshot<'a> {
    pub event_id: &'a str,
    pub timestamp: String,
    pub ticket_count: usize,
    pub data: &'a [TicketRow],
}

/// `stubhub_{eventId}_{yyyy-MM-dd_HH-mm-ss}.json`, local time.
pub fn snapshot_file_name(event_id: &str, at: DateTime<Local>) -> String {
    format!("stubhub_{}_{}.json", event_id, at.format("%Y-%m-%d_%H-%M-%S"))
}

/// Writes the tickets as pretty JSON under `dir`, creating it if needed.
pub fn save_snapshot(dir: &Path, event_id: &str, tickets: &[TicketRow]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let now = Utc::now();
    let path = dir.join(snapshot_file_name(event_id, now.with_timezone(&Local)));
    let snapshot = TicketSnapshot {
        event_id,
        timestamp: now.to_rfc3339(),
        ticket_count: tickets.len(),
        data: tickets,
    };
    let body = serde_json::to_string_pretty(&snapshot)?;
    std::fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
    info!("💾 Ticket data saved to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_name_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 1, 9, 5, 7).unwrap();
        assert_eq!(snapshot_file_name("157794939", at), "stubhub_157794939_2024-03-01_09-05-07.json");
    }

    #[test]
    fn writes_envelope() {
        let dir = std::env::temp_dir().join(format!("ticket_snapshot_{}", std::process::id()));
        let tickets: Vec<TicketRow> =
            serde_json::from_str(r#"[{"rawPrice": 10.0, "section": "A"}, {"rawPrice": 12.5}]"#).unwrap();
        let path = save_snapshot(&dir, "42", &tickets).unwrap();

        let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["eventId"], "42");
        assert_eq!(saved["ticketCount"], 2);
        assert_eq!(saved["data"][0]["section"], "A");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
