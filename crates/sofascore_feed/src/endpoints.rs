use crate::types::Sport;

pub const API_BASE: &str = "https://api.sofascore.com/api/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandingsScope {
    Total,
    Home,
    Away,
}

impl StandingsScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Total => "total",
            Self::Home => "home",
            Self::Away => "away",
        }
    }
}

/// URL builders over a configurable base (tests point it at a fake host).
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(API_BASE)
    }
}

impl Endpoints {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into().trim_end_matches('/').to_string() }
    }

    pub fn scheduled_events(&self, sport: Sport, date: &str) -> String {
        format!("{}/sport/{}/scheduled-events/{}", self.base, sport, date)
    }

    pub fn event(&self, event_id: u64) -> String {
        format!("{}/event/{}", self.base, event_id)
    }

    pub fn winning_odds(&self, event_id: u64) -> String {
        format!("{}/event/{}/provider/1/winning-odds", self.base, event_id)
    }

    pub fn markets_odds(&self, event_id: u64) -> String {
        format!("{}/event/{}/odds/1/all", self.base, event_id)
    }

    pub fn pregame_form(&self, event_id: u64) -> String {
        format!("{}/event/{}/pregame-form", self.base, event_id)
    }

    pub fn votes(&self, event_id: u64) -> String {
        format!("{}/event/{}/votes", self.base, event_id)
    }

    pub fn standings(&self, tournament_id: u64, season_id: u64, scope: StandingsScope) -> String {
        format!(
            "{}/tournament/{}/season/{}/standings/{}",
            self.base,
            tournament_id,
            season_id,
            scope.as_str()
        )
    }

    pub fn incidents(&self, event_id: u64) -> String {
        format!("{}/event/{}/incidents", self.base, event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_api_paths() {
        let e = Endpoints::default();
        assert_eq!(
            e.scheduled_events(Sport::Football, "2024-03-01"),
            "https://api.sofascore.com/api/v1/sport/football/scheduled-events/2024-03-01"
        );
        assert_eq!(e.winning_odds(7), "https://api.sofascore.com/api/v1/event/7/provider/1/winning-odds");
        assert_eq!(
            e.standings(17, 52186, StandingsScope::Home),
            "https://api.sofascore.com/api/v1/tournament/17/season/52186/standings/home"
        );
        assert_eq!(Endpoints::new("http://fake/").incidents(3), "http://fake/event/3/incidents");
    }
}
