use crate::endpoints::{Endpoints, StandingsScope};
use crate::types::*;
use futures_util::future::join_all;
use logger::{EventLogger, SubFetchEvent};
use rate_client::{ClientError, ClientSession, ErrorKind, ReqwestTransport, Transport};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Decides which resources to fetch per event and joins them into one record.
pub struct EventAggregator<T: Transport = ReqwestTransport> {
    session: Arc<ClientSession<T>>,
    endpoints: Endpoints,
    audit: Option<EventLogger>,
}

impl<T: Transport> EventAggregator<T> {
    pub fn new(session: Arc<ClientSession<T>>) -> Self {
        Self { session, endpoints: Endpoints::default(), audit: None }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_audit_log(mut self, log_dir: impl Into<std::path::PathBuf>) -> Self {
        self.audit = Some(EventLogger::new(log_dir));
        self
    }

    pub fn session(&self) -> &ClientSession<T> {
        &self.session
    }

    /// Joined records for every event of `date` (Europe/Athens local date).
    /// A failing schedule request fails the date; a failing event is skipped.
    pub async fn fetch_for_date(&self, sport: Sport, date: &str) -> Result<Vec<EventJoinedRecord>, ClientError> {
        let schedule: ScheduledEventsResponse =
            self.session.get_json(&self.endpoints.scheduled_events(sport, date)).await?;
        let scheduled = schedule.events.len();

        let on_date: Vec<ScheduledEvent> = schedule
            .events
            .into_iter()
            .filter(|ev| ev.athens_date_time().map_or(false, |(d, _)| d == date))
            .collect();
        info!("⚽ {} {}: {} scheduled, {} on date", sport, date, scheduled, on_date.len());

        let jobs = on_date.into_iter().map(|event| async move {
            let event_id = event.id;
            let joined = match sport {
                Sport::Football => self.join_football(event).await,
                Sport::Basketball => self.join_basketball(event).await,
            };
            match joined {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("💥 Event {} dropped: {}", event_id, e);
                    None
                }
            }
        });

        Ok(join_all(jobs).await.into_iter().flatten().collect())
    }

    async fn join_football(&self, event: ScheduledEvent) -> Result<EventJoinedRecord, ClientError> {
        let id = event.id;
        let tournament_id = event.tournament.id;

        let specific: Option<SpecificEvent> = self.soft(id, "specific-event", &self.endpoints.event(id)).await?;
        let season_id = specific.and_then(|s| s.event.season).map(|s| s.id);

        let winning_url = self.endpoints.winning_odds(id);
        let form_url = self.endpoints.pregame_form(id);
        let votes_url = self.endpoints.votes(id);
        let markets_url = self.endpoints.markets_odds(id);
        let incidents_url = self.endpoints.incidents(id);
        let (winning_odds, pregame_form, votes, markets, standings, incidents) = tokio::try_join!(
            self.soft::<WinningOdds>(id, "winning-odds", &winning_url),
            self.soft::<PregameForm>(id, "pregame-form", &form_url),
            self.soft::<Votes>(id, "votes", &votes_url),
            self.soft::<MarketsOdds>(id, "market-odds", &markets_url),
            self.standings(id, tournament_id, season_id),
            self.soft::<Incidents>(id, "incidents", &incidents_url),
        )?;

        Ok(EventJoinedRecord {
            event,
            markets,
            winning_odds,
            pregame_form,
            votes,
            standings,
            incidents,
        })
    }

    async fn join_basketball(&self, event: ScheduledEvent) -> Result<EventJoinedRecord, ClientError> {
        let id = event.id;
        let markets_url = self.endpoints.markets_odds(id);
        let form_url = self.endpoints.pregame_form(id);
        let (markets, pregame_form) = tokio::try_join!(
            self.soft::<MarketsOdds>(id, "market-odds", &markets_url),
            self.soft::<PregameForm>(id, "pregame-form", &form_url),
        )?;

        Ok(EventJoinedRecord { markets, pregame_form, ..EventJoinedRecord::bare(event) })
    }

    /// Total/home/away tables, fetched together. Skipped without a season.
    async fn standings(
        &self,
        event_id: u64,
        tournament_id: u64,
        season_id: Option<u64>,
    ) -> Result<Option<StandingsSet>, ClientError> {
        let Some(season_id) = season_id else {
            debug!("No season for event {}, skipping standings", event_id);
            return Ok(None);
        };
        let [total_url, home_url, away_url] = [StandingsScope::Total, StandingsScope::Home, StandingsScope::Away]
            .map(|scope| self.endpoints.standings(tournament_id, season_id, scope));
        let (total, home, away) = tokio::try_join!(
            self.soft::<Standings>(event_id, "standings-total", &total_url),
            self.soft::<Standings>(event_id, "standings-home", &home_url),
            self.soft::<Standings>(event_id, "standings-away", &away_url),
        )?;

        // the three tables are used as a unit
        Ok(match (total, home, away) {
            (Some(total), Some(home), Some(away)) => Some(StandingsSet { total, home, away }),
            _ => None,
        })
    }

    /// 404 maps to an absent field; other failures propagate.
    async fn soft<D: DeserializeOwned>(&self, event_id: u64, resource: &str, url: &str) -> Result<Option<D>, ClientError> {
        match self.session.get_json::<D>(url).await {
            Ok(data) => {
                debug!("scraped {} for {}", resource, event_id);
                self.audit(event_id, resource, "ok", None);
                Ok(Some(data))
            }
            Err(e) if e.kind == ErrorKind::NotFound => {
                warn!("not-found: {} for {}", resource, event_id);
                self.audit(event_id, resource, "absent", None);
                Ok(None)
            }
            Err(e) => {
                if e.kind == ErrorKind::Forbidden {
                    if let Some(stats) = &e.pool {
                        info!("📊 Current proxy stats: {}", stats);
                    }
                }
                self.audit(event_id, resource, "error", Some(e.to_string()));
                Err(e)
            }
        }
    }

    fn audit(&self, event_id: u64, resource: &str, outcome: &str, detail: Option<String>) {
        if let Some(audit) = &self.audit {
            let _ = audit.log(&SubFetchEvent {
                event_id,
                resource: resource.to_string(),
                outcome: outcome.to_string(),
                detail,
            });
        }
    }
}
