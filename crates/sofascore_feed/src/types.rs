//! Response shapes of the statistics API. Every field that the site has been
//! seen to omit is optional or defaulted; partial payloads must deserialize.

use chrono::{DateTime, Utc};
use chrono_tz::Europe::Athens;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Football,
    Basketball,
}

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Football => "football",
            Self::Basketball => "basketball",
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "football" | "soccer" => Ok(Self::Football),
            "basketball" => Ok(Self::Basketball),
            other => Err(format!("sport `{other}` is not supported")),
        }
    }
}

/// `(yyyy-MM-dd, HH:mm)` of a unix timestamp in Europe/Athens.
pub fn athens_date_time(timestamp: i64) -> Option<(String, String)> {
    let utc: DateTime<Utc> = DateTime::from_timestamp(timestamp, 0)?;
    let local = utc.with_timezone(&Athens);
    Some((local.format("%Y-%m-%d").to_string(), local.format("%H:%M").to_string()))
}

// ── Scheduled events ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusType {
    NotStarted,
    InProgress,
    Finished,
    Postponed,
    Canceled,
    Abandoned,
    #[serde(other)]
    Other,
}

impl Default for StatusType {
    fn default() -> Self {
        Self::Other
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventStatus {
    #[serde(rename = "type", default)]
    pub kind: StatusType,
    #[serde(default)]
    pub description: Option<String>,
}

impl EventStatus {
    /// Postponed, canceled and abandoned events never become rows.
    pub fn is_void(&self) -> bool {
        matches!(self.kind, StatusType::Postponed | StatusType::Canceled | StatusType::Abandoned)
    }

    pub fn is_finished(&self) -> bool {
        self.kind == StatusType::Finished
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

impl Team {
    /// Short name, falling back to the full name, then the slug.
    pub fn display_name(&self) -> &str {
        [self.short_name.as_deref(), Some(self.name.as_str()), self.slug.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .unwrap_or("Unknown")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tournament {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: Option<Category>,
}

impl Tournament {
    /// "Category Tournament", or just the tournament name.
    pub fn league(&self) -> String {
        match self.category.as_ref().filter(|c| !c.name.is_empty()) {
            Some(c) if !self.name.is_empty() => format!("{} {}", c.name, self.name),
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoundInfo {
    #[serde(default)]
    pub round: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Score {
    #[serde(default)]
    pub current: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEvent {
    pub id: u64,
    pub start_timestamp: i64,
    #[serde(default)]
    pub status: EventStatus,
    pub home_team: Team,
    pub away_team: Team,
    pub tournament: Tournament,
    #[serde(default)]
    pub round_info: Option<RoundInfo>,
    #[serde(default)]
    pub home_score: Option<Score>,
    #[serde(default)]
    pub away_score: Option<Score>,
}

impl ScheduledEvent {
    pub fn athens_date_time(&self) -> Option<(String, String)> {
        athens_date_time(self.start_timestamp)
    }

    /// "H-A" once the event is finished and both scores are known.
    pub fn result(&self) -> Option<String> {
        if !self.status.is_finished() {
            return None;
        }
        let home = self.home_score.as_ref()?.current?;
        let away = self.away_score.as_ref()?.current?;
        Some(format!("{home}-{away}"))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduledEventsResponse {
    #[serde(default)]
    pub events: Vec<ScheduledEvent>,
}

// ── Per-event resources ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketChoice {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fractional_value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    #[serde(default)]
    pub market_name: String,
    #[serde(default)]
    pub choices: Vec<MarketChoice>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketsOdds {
    #[serde(default)]
    pub markets: Vec<Market>,
}

impl MarketsOdds {
    pub fn market(&self, name: &str) -> Option<&Market> {
        self.markets.iter().find(|m| m.market_name == name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinningSide {
    #[serde(default)]
    pub fractional_value: Option<String>,
    #[serde(default)]
    pub expected: Option<f64>,
    #[serde(default)]
    pub actual: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WinningOdds {
    #[serde(default)]
    pub home: Option<WinningSide>,
    #[serde(default)]
    pub away: Option<WinningSide>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamForm {
    #[serde(default)]
    pub form: Vec<String>,
    /// Points or a "W-L" record, depending on the sport.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub avg_rating: Option<serde_json::Value>,
}

impl TeamForm {
    pub fn wins(&self) -> usize {
        self.form.iter().filter(|f| f.as_str() == "W").count()
    }

    /// Wins among the most recent `n` entries (the list is oldest first).
    pub fn wins_in_last(&self, n: usize) -> usize {
        let skip = self.form.len().saturating_sub(n);
        self.form.iter().skip(skip).filter(|f| f.as_str() == "W").count()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PregameForm {
    #[serde(default)]
    pub home_team: Option<TeamForm>,
    #[serde(default)]
    pub away_team: Option<TeamForm>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoteCounts {
    #[serde(default)]
    pub vote1: u64,
    #[serde(default)]
    pub vote2: u64,
    #[serde(rename = "voteX", default)]
    pub vote_x: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Votes {
    #[serde(default)]
    pub vote: Option<VoteCounts>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandingsRow {
    pub team: TeamRef,
    #[serde(default)]
    pub matches: Option<i64>,
    #[serde(default)]
    pub points: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandingsTable {
    #[serde(default)]
    pub rows: Vec<StandingsRow>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Standings {
    #[serde(default)]
    pub standings: Vec<StandingsTable>,
}

impl Standings {
    /// Row of `team_id` in the first table.
    pub fn row_for(&self, team_id: u64) -> Option<&StandingsRow> {
        self.standings.first()?.rows.iter().find(|r| r.team.id == team_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandingsSet {
    pub total: Standings,
    pub home: Standings,
    pub away: Standings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Season {
    pub id: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpecificEventInner {
    #[serde(default)]
    pub season: Option<Season>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpecificEvent {
    #[serde(default)]
    pub event: SpecificEventInner,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    #[serde(default)]
    pub incident_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Incidents {
    #[serde(default)]
    pub incidents: Vec<Incident>,
}

impl Incidents {
    pub fn goal_count(&self) -> usize {
        self.incidents.iter().filter(|i| i.incident_type == "goal").count()
    }
}

/// Everything fetched for one event. Absent fields are normal.
#[derive(Debug, Clone)]
pub struct EventJoinedRecord {
    pub event: ScheduledEvent,
    pub markets: Option<MarketsOdds>,
    pub winning_odds: Option<WinningOdds>,
    pub pregame_form: Option<PregameForm>,
    pub votes: Option<Votes>,
    pub standings: Option<StandingsSet>,
    pub incidents: Option<Incidents>,
}

impl EventJoinedRecord {
    pub fn bare(event: ScheduledEvent) -> Self {
        Self {
            event,
            markets: None,
            winning_odds: None,
            pregame_form: None,
            votes: None,
            standings: None,
            incidents: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn athens_is_utc_plus_two_in_winter() {
        // 2024-03-01T22:30:00Z
        let (date, time) = athens_date_time(1_709_332_200).unwrap();
        assert_eq!(date, "2024-03-02");
        assert_eq!(time, "00:30");
    }

    #[test]
    fn parses_minimal_event_and_unknown_status() {
        let raw = r#"{
            "id": 1, "startTimestamp": 1709300000,
            "status": {"type": "interrupted"},
            "homeTeam": {"id": 10, "name": "Arsenal"},
            "awayTeam": {"id": 11, "name": "Chelsea", "shortName": "CHE"},
            "tournament": {"id": 17, "name": "Premier League", "category": {"name": "England"}}
        }"#;
        let ev: ScheduledEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(ev.status.kind, StatusType::Other);
        assert_eq!(ev.home_team.display_name(), "Arsenal");
        assert_eq!(ev.away_team.display_name(), "CHE");
        assert_eq!(ev.tournament.league(), "England Premier League");
        assert!(ev.result().is_none());
    }

    #[test]
    fn result_only_for_finished_events() {
        let raw = r#"{
            "id": 1, "startTimestamp": 0, "status": {"type": "finished"},
            "homeTeam": {"id": 1}, "awayTeam": {"id": 2}, "tournament": {"id": 3},
            "homeScore": {"current": 2}, "awayScore": {"current": 1}
        }"#;
        let ev: ScheduledEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(ev.result().as_deref(), Some("2-1"));
    }

    #[test]
    fn form_win_counts() {
        let f = TeamForm {
            form: ["W", "L", "W", "D", "W"].iter().map(|s| s.to_string()).collect(),
            ..TeamForm::default()
        };
        assert_eq!(f.wins(), 3);
        assert_eq!(f.wins_in_last(4), 2);
    }

    #[test]
    fn sport_parses_case_insensitively() {
        assert_eq!("Football".parse::<Sport>().unwrap(), Sport::Football);
        assert!("curling".parse::<Sport>().is_err());
    }
}
