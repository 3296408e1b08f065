use crate::odds::{fraction_to_continental, fraction_to_decimal, parse_handicap, round2};
use serde::Serialize;
use sofascore_feed::{EventJoinedRecord, MarketsOdds, ScheduledEvent, Sport, TeamForm};
use std::fmt;

/// Cell value of one output column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) if n.is_finite() => write!(f, "{n}"),
            FieldValue::Number(_) => Ok(()),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

fn num<T: Into<f64>>(v: Option<T>) -> Option<FieldValue> {
    v.map(|n| FieldValue::Number(n.into()))
}

fn int(v: Option<i64>) -> Option<FieldValue> {
    v.map(|n| FieldValue::Number(n as f64))
}

fn count(v: usize) -> Option<FieldValue> {
    Some(FieldValue::Number(v as f64))
}

fn text(v: &str) -> Option<FieldValue> {
    Some(FieldValue::Text(v.to_string()))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FootballRow {
    pub date: String,
    pub time: String,
    pub league: String,
    pub round: Option<i64>,
    pub home: String,
    pub away: String,
    pub home_full_time_odd: Option<f64>,
    pub away_full_time_odd: Option<f64>,
    pub home_expected_winning_percentage: Option<f64>,
    pub home_actual_winning_percentage: Option<f64>,
    pub away_expected_winning_percentage: Option<f64>,
    pub away_actual_winning_percentage: Option<f64>,
    pub home_vote_win_percentage: Option<f64>,
    pub home_handicap: Option<f64>,
    pub home_handicap_odd: Option<f64>,
    pub home_pregame_form_last5: usize,
    pub away_pregame_form_last5: usize,
    pub home_pregame_form_last4: usize,
    pub away_pregame_form_last4: usize,
    pub result: Option<String>,
    pub home_team_played_games: Option<i64>,
    pub home_team_points: Option<i64>,
    pub away_team_played_games: Option<i64>,
    pub away_team_points: Option<i64>,
    #[serde(rename = "HT_Played@H")]
    pub ht_played_at_home: Option<i64>,
    #[serde(rename = "HT_Points@H")]
    pub ht_points_at_home: Option<i64>,
    #[serde(rename = "AT_Played@A")]
    pub at_played_away: Option<i64>,
    #[serde(rename = "AT_Points@A")]
    pub at_points_away: Option<i64>,
    pub goal_incidents: Option<usize>,
}

impl FootballRow {
    fn fields(&self) -> Vec<(&'static str, Option<FieldValue>)> {
        vec![
            ("date", text(&self.date)),
            ("time", text(&self.time)),
            ("league", text(&self.league)),
            ("round", int(self.round)),
            ("home", text(&self.home)),
            ("away", text(&self.away)),
            ("homeFullTimeOdd", num(self.home_full_time_odd)),
            ("awayFullTimeOdd", num(self.away_full_time_odd)),
            ("homeExpectedWinningPercentage", num(self.home_expected_winning_percentage)),
            ("homeActualWinningPercentage", num(self.home_actual_winning_percentage)),
            ("awayExpectedWinningPercentage", num(self.away_expected_winning_percentage)),
            ("awayActualWinningPercentage", num(self.away_actual_winning_percentage)),
            ("homeVoteWinPercentage", num(self.home_vote_win_percentage)),
            ("homeHandicap", num(self.home_handicap)),
            ("homeHandicapOdd", num(self.home_handicap_odd)),
            ("homePregameFormLast5", count(self.home_pregame_form_last5)),
            ("awayPregameFormLast5", count(self.away_pregame_form_last5)),
            ("homePregameFormLast4", count(self.home_pregame_form_last4)),
            ("awayPregameFormLast4", count(self.away_pregame_form_last4)),
            ("result", self.result.as_deref().and_then(text)),
            ("homeTeamPlayedGames", int(self.home_team_played_games)),
            ("homeTeamPoints", int(self.home_team_points)),
            ("awayTeamPlayedGames", int(self.away_team_played_games)),
            ("awayTeamPoints", int(self.away_team_points)),
            ("HT_Played@H", int(self.ht_played_at_home)),
            ("HT_Points@H", int(self.ht_points_at_home)),
            ("AT_Played@A", int(self.at_played_away)),
            ("AT_Points@A", int(self.at_points_away)),
            ("goalIncidents", self.goal_incidents.and_then(count)),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasketballRow {
    pub date: String,
    pub time: String,
    pub league: String,
    /// "home - away"
    pub game: String,
    pub home_odd: Option<f64>,
    pub away_odd: Option<f64>,
    pub home_pregame_form_last5: usize,
    pub home_wins: u32,
    pub home_loses: u32,
    pub away_pregame_form_last5: usize,
    pub away_wins: u32,
    pub away_loses: u32,
    pub result: Option<String>,
}

impl BasketballRow {
    fn fields(&self) -> Vec<(&'static str, Option<FieldValue>)> {
        vec![
            ("date", text(&self.date)),
            ("time", text(&self.time)),
            ("league", text(&self.league)),
            ("game", text(&self.game)),
            ("homeOdd", num(self.home_odd)),
            ("awayOdd", num(self.away_odd)),
            ("homePregameFormLast5", count(self.home_pregame_form_last5)),
            ("homeWins", num(Some(self.home_wins))),
            ("homeLoses", num(Some(self.home_loses))),
            ("awayPregameFormLast5", count(self.away_pregame_form_last5)),
            ("awayWins", num(Some(self.away_wins))),
            ("awayLoses", num(Some(self.away_loses))),
            ("result", self.result.as_deref().and_then(text)),
        ]
    }

    /// Home and away halves of `game`.
    pub fn teams(&self) -> (&str, &str) {
        self.game.split_once(" - ").unwrap_or((self.game.as_str(), ""))
    }
}

/// One export row. The `sport` tag drives sort, filter and export.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "sport", rename_all = "lowercase")]
pub enum OutputRow {
    Football(FootballRow),
    Basketball(BasketballRow),
}

impl OutputRow {
    pub fn sport(&self) -> Sport {
        match self {
            OutputRow::Football(_) => Sport::Football,
            OutputRow::Basketball(_) => Sport::Basketball,
        }
    }

    /// `date:time:home:away`, compared lexicographically.
    pub fn sort_key(&self) -> String {
        match self {
            OutputRow::Football(r) => format!("{}:{}:{}:{}", r.date, r.time, r.home, r.away),
            OutputRow::Basketball(r) => {
                let (home, away) = r.teams();
                format!("{}:{}:{}:{}", r.date, r.time, home, away)
            }
        }
    }

    /// Column name and value pairs in column order.
    pub fn fields(&self) -> Vec<(&'static str, Option<FieldValue>)> {
        match self {
            OutputRow::Football(r) => r.fields(),
            OutputRow::Basketball(r) => r.fields(),
        }
    }

    pub fn field(&self, name: &str) -> Option<FieldValue> {
        self.fields().into_iter().find(|(k, _)| *k == name).and_then(|(_, v)| v)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.fields().iter().any(|(k, _)| *k == name)
    }
}

/// Column names a sport's rows carry.
pub fn columns_for(sport: Sport) -> Vec<&'static str> {
    let sample = match sport {
        Sport::Football => OutputRow::Football(FootballRow::default()),
        Sport::Basketball => OutputRow::Basketball(BasketballRow::default()),
    };
    sample.fields().into_iter().map(|(k, _)| k).collect()
}

// ── Formatting ────────────────────────────────────────────────────────────────

fn full_time_choice<'a>(markets: Option<&'a MarketsOdds>, choice: &str) -> Option<&'a str> {
    markets?
        .market("Full time")?
        .choices
        .iter()
        .find(|c| c.name == choice)?
        .fractional_value
        .as_deref()
}

fn wins(form: Option<&TeamForm>) -> usize {
    form.map_or(0, TeamForm::wins)
}

fn wins_last4(form: Option<&TeamForm>) -> usize {
    form.map_or(0, |f| f.wins_in_last(4))
}

/// "W-L" record; anything unparsable counts as zero.
fn win_loss(form: Option<&TeamForm>) -> (u32, u32) {
    let Some(value) = form.and_then(|f| f.value.as_deref()) else {
        return (0, 0);
    };
    let mut parts = value.split('-');
    match (parts.next(), parts.next()) {
        (Some(w), Some(l)) => (w.trim().parse().unwrap_or(0), l.trim().parse().unwrap_or(0)),
        _ => (0, 0),
    }
}

fn home_handicap(record: &EventJoinedRecord) -> (Option<f64>, Option<f64>) {
    let ev = &record.event;
    let Some(market) = record.markets.as_ref().and_then(|m| m.market("Asian handicap")) else {
        return (None, None);
    };
    let names: Vec<&str> = [Some(ev.home_team.name.as_str()), ev.home_team.short_name.as_deref()]
        .into_iter()
        .flatten()
        .filter(|n| !n.is_empty())
        .collect();
    let Some(choice) = market.choices.iter().find(|c| names.iter().any(|n| c.name.contains(n))) else {
        return (None, None);
    };
    (
        parse_handicap(&choice.name),
        choice.fractional_value.as_deref().and_then(fraction_to_continental),
    )
}

fn vote_win_percentage(record: &EventJoinedRecord) -> Option<f64> {
    let v = record.votes.as_ref()?.vote.as_ref()?;
    let total = v.vote1 + v.vote2 + v.vote_x.unwrap_or(0);
    if total == 0 {
        return None;
    }
    Some(round2(v.vote1 as f64 / total as f64 * 100.0))
}

fn date_time(ev: &ScheduledEvent) -> Option<(String, String)> {
    ev.athens_date_time()
}

fn football_row(record: &EventJoinedRecord) -> Option<FootballRow> {
    let ev = &record.event;
    let (date, time) = date_time(ev)?;
    let markets = record.markets.as_ref();
    let form = record.pregame_form.as_ref();
    let home_form = form.and_then(|f| f.home_team.as_ref());
    let away_form = form.and_then(|f| f.away_team.as_ref());
    let winning = record.winning_odds.as_ref();
    let home_win = winning.and_then(|w| w.home.as_ref());
    let away_win = winning.and_then(|w| w.away.as_ref());
    let (home_handicap, home_handicap_odd) = home_handicap(record);

    let standings = record.standings.as_ref();
    let overall_home = standings.and_then(|s| s.total.row_for(ev.home_team.id));
    let overall_away = standings.and_then(|s| s.total.row_for(ev.away_team.id));
    let home_at_home = standings.and_then(|s| s.home.row_for(ev.home_team.id));
    let away_away = standings.and_then(|s| s.away.row_for(ev.away_team.id));

    Some(FootballRow {
        date,
        time,
        league: ev.tournament.league(),
        round: ev.round_info.as_ref().and_then(|r| r.round),
        home: ev.home_team.display_name().to_string(),
        away: ev.away_team.display_name().to_string(),
        home_full_time_odd: full_time_choice(markets, "1").and_then(fraction_to_continental),
        away_full_time_odd: full_time_choice(markets, "2").and_then(fraction_to_continental),
        home_expected_winning_percentage: home_win.and_then(|w| w.expected),
        home_actual_winning_percentage: home_win.and_then(|w| w.actual),
        away_expected_winning_percentage: away_win.and_then(|w| w.expected),
        away_actual_winning_percentage: away_win.and_then(|w| w.actual),
        home_vote_win_percentage: vote_win_percentage(record),
        home_handicap,
        home_handicap_odd,
        home_pregame_form_last5: wins(home_form),
        away_pregame_form_last5: wins(away_form),
        home_pregame_form_last4: wins_last4(home_form),
        away_pregame_form_last4: wins_last4(away_form),
        result: ev.result(),
        home_team_played_games: overall_home.and_then(|r| r.matches),
        home_team_points: overall_home.and_then(|r| r.points),
        away_team_played_games: overall_away.and_then(|r| r.matches),
        away_team_points: overall_away.and_then(|r| r.points),
        ht_played_at_home: home_at_home.and_then(|r| r.matches),
        ht_points_at_home: home_at_home.and_then(|r| r.points),
        at_played_away: away_away.and_then(|r| r.matches),
        at_points_away: away_away.and_then(|r| r.points),
        goal_incidents: record.incidents.as_ref().map(|i| i.goal_count()),
    })
}

fn basketball_row(record: &EventJoinedRecord) -> Option<BasketballRow> {
    let ev = &record.event;
    let (date, time) = date_time(ev)?;
    let markets = record.markets.as_ref();
    let form = record.pregame_form.as_ref();
    let home_form = form.and_then(|f| f.home_team.as_ref());
    let away_form = form.and_then(|f| f.away_team.as_ref());
    let (home_wins, home_loses) = win_loss(home_form);
    let (away_wins, away_loses) = win_loss(away_form);

    Some(BasketballRow {
        date,
        time,
        league: ev.tournament.league(),
        game: format!("{} - {}", ev.home_team.display_name(), ev.away_team.display_name()),
        home_odd: full_time_choice(markets, "1").and_then(fraction_to_decimal),
        away_odd: full_time_choice(markets, "2").and_then(fraction_to_decimal),
        home_pregame_form_last5: wins(home_form),
        home_wins,
        home_loses,
        away_pregame_form_last5: wins(away_form),
        away_wins,
        away_loses,
        result: ev.result(),
    })
}

/// Maps joined records to rows, skipping void events, sorted by `sort_key`.
pub fn format_rows(sport: Sport, records: &[EventJoinedRecord]) -> Vec<OutputRow> {
    let mut rows: Vec<OutputRow> = records
        .iter()
        .filter(|r| !r.event.status.is_void())
        .filter_map(|r| match sport {
            Sport::Football => football_row(r).map(OutputRow::Football),
            Sport::Basketball => basketball_row(r).map(OutputRow::Basketball),
        })
        .collect();
    sort_rows(&mut rows);
    rows
}

pub fn sort_rows(rows: &mut [OutputRow]) {
    rows.sort_by_cached_key(OutputRow::sort_key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use sofascore_feed::{Market, MarketChoice, PregameForm, VoteCounts, Votes};

    fn event(id: u64, ts: i64, status: &str) -> ScheduledEvent {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "startTimestamp": ts,
            "status": {"type": status},
            "homeTeam": {"id": 10, "name": "Arsenal", "shortName": "ARS"},
            "awayTeam": {"id": 11, "name": "Chelsea", "shortName": "CHE"},
            "tournament": {"id": 17, "name": "Premier League", "category": {"name": "England"}},
            "roundInfo": {"round": 27},
            "homeScore": {"current": 2},
            "awayScore": {"current": 0}
        }))
        .unwrap()
    }

    fn markets() -> MarketsOdds {
        MarketsOdds {
            markets: vec![
                Market {
                    market_name: "Full time".into(),
                    choices: vec![
                        MarketChoice { name: "1".into(), fractional_value: Some("4/5".into()) },
                        MarketChoice { name: "X".into(), fractional_value: Some("11/4".into()) },
                        MarketChoice { name: "2".into(), fractional_value: Some("3/1".into()) },
                    ],
                },
                Market {
                    market_name: "Asian handicap".into(),
                    choices: vec![
                        MarketChoice { name: "(-0.75) Arsenal".into(), fractional_value: Some("9/10".into()) },
                        MarketChoice { name: "(0.75) Chelsea".into(), fractional_value: Some("19/20".into()) },
                    ],
                },
            ],
        }
    }

    // 2024-03-01 17:30 Athens
    const TS: i64 = 1_709_307_000;

    #[test]
    fn football_row_from_full_record() {
        let mut rec = EventJoinedRecord::bare(event(1, TS, "finished"));
        rec.markets = Some(markets());
        rec.pregame_form = Some(PregameForm {
            home_team: Some(TeamForm { form: vec!["W".into(), "W".into(), "D".into(), "L".into(), "W".into()], ..TeamForm::default() }),
            away_team: None,
        });
        rec.votes = Some(Votes { vote: Some(VoteCounts { vote1: 60, vote2: 20, vote_x: Some(20) }) });

        let rows = format_rows(Sport::Football, &[rec]);
        let OutputRow::Football(r) = &rows[0] else { panic!("football row expected") };
        assert_eq!(r.date, "2024-03-01");
        assert_eq!(r.time, "17:30");
        assert_eq!(r.league, "England Premier League");
        assert_eq!(r.round, Some(27));
        assert_eq!(r.home, "ARS");
        assert_eq!(r.home_full_time_odd, Some(1.8));
        assert_eq!(r.away_full_time_odd, Some(4.0));
        assert_eq!(r.home_handicap, Some(-0.75));
        assert_eq!(r.home_handicap_odd, Some(1.9));
        assert_eq!(r.home_pregame_form_last5, 3);
        assert_eq!(r.home_pregame_form_last4, 2);
        assert_eq!(r.away_pregame_form_last5, 0);
        assert_eq!(r.home_vote_win_percentage, Some(60.0));
        assert_eq!(r.result.as_deref(), Some("2-0"));
        assert_eq!(r.goal_incidents, None);
    }

    #[test]
    fn basketball_odds_do_not_add_one() {
        let mut rec = EventJoinedRecord::bare(event(2, TS, "notstarted"));
        rec.markets = Some(markets());
        rec.pregame_form = Some(PregameForm {
            home_team: Some(TeamForm { value: Some("31-12".into()), ..TeamForm::default() }),
            away_team: Some(TeamForm { value: Some("garbage".into()), ..TeamForm::default() }),
        });
        let rows = format_rows(Sport::Basketball, &[rec]);
        let OutputRow::Basketball(r) = &rows[0] else { panic!("basketball row expected") };
        assert_eq!(r.home_odd, Some(0.8));
        assert_eq!(r.away_odd, Some(3.0));
        assert_eq!((r.home_wins, r.home_loses), (31, 12));
        assert_eq!((r.away_wins, r.away_loses), (0, 0));
        assert_eq!(r.game, "ARS - CHE");
        assert!(r.result.is_none());
    }

    #[test]
    fn void_events_never_become_rows() {
        let recs: Vec<EventJoinedRecord> = ["postponed", "canceled", "abandoned", "finished"]
            .iter()
            .enumerate()
            .map(|(i, s)| EventJoinedRecord::bare(event(i as u64, TS, s)))
            .collect();
        assert_eq!(format_rows(Sport::Football, &recs).len(), 1);
        assert_eq!(format_rows(Sport::Basketball, &recs).len(), 1);
    }

    #[test]
    fn formatting_is_idempotent_and_sorted() {
        let recs: Vec<EventJoinedRecord> = [TS + 3600, TS, TS + 600]
            .iter()
            .enumerate()
            .map(|(i, ts)| EventJoinedRecord::bare(event(i as u64, *ts, "notstarted")))
            .collect();
        let a = format_rows(Sport::Football, &recs);
        let b = format_rows(Sport::Football, &recs);
        assert_eq!(a, b);
        let keys: Vec<String> = a.iter().map(OutputRow::sort_key).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(keys[0].starts_with("2024-03-01:17:30"));
    }

    #[test]
    fn serialized_rows_carry_sport_tag() {
        let rows = format_rows(Sport::Football, &[EventJoinedRecord::bare(event(1, TS, "notstarted"))]);
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["sport"], "football");
        assert!(json.get("HT_Played@H").is_some());
        assert!(json.get("homeFullTimeOdd").is_some());
    }

    #[test]
    fn column_lists_match_row_fields() {
        assert_eq!(columns_for(Sport::Basketball).len(), 13);
        assert!(columns_for(Sport::Football).contains(&"AT_Points@A"));
    }
}
