use crate::row::{columns_for, FieldValue, OutputRow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sofascore_feed::Sport;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

/// Sentinel bounds meaning "no restriction".
pub const UNRESTRICTED_FROM: f64 = -1.0;
pub const UNRESTRICTED_TO: f64 = 999.0;

#[derive(Debug, Error, PartialEq)]
pub enum FilterConfigError {
    #[error("`{field}` is not a {sport} output column")]
    UnknownField { field: String, sport: Sport },
    #[error("`{field}` range is inverted ({from} > {to})")]
    InvertedRange { field: String, from: f64, to: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldFilter {
    Range { from: f64, to: f64 },
    AllowList(Vec<Value>),
}

impl FieldFilter {
    pub fn unrestricted_range() -> Self {
        FieldFilter::Range { from: UNRESTRICTED_FROM, to: UNRESTRICTED_TO }
    }

    pub fn is_unrestricted(&self) -> bool {
        match self {
            FieldFilter::Range { from, to } => *from == UNRESTRICTED_FROM && *to == UNRESTRICTED_TO,
            FieldFilter::AllowList(values) => values.is_empty(),
        }
    }

    /// Ranges test numbers and let text through; a missing value fails a
    /// restricted range. Allow-lists need a present, listed value.
    pub fn admits(&self, value: Option<&FieldValue>) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        match (self, value) {
            (FieldFilter::Range { from, to }, Some(FieldValue::Number(n))) => *n >= *from && *n <= *to,
            (FieldFilter::Range { .. }, Some(FieldValue::Text(_))) => true,
            (FieldFilter::Range { .. }, None) => false,
            (FieldFilter::AllowList(values), Some(v)) => values.iter().any(|allowed| matches_json(v, allowed)),
            (FieldFilter::AllowList(_), None) => false,
        }
    }
}

fn matches_json(value: &FieldValue, allowed: &Value) -> bool {
    match (value, allowed) {
        (FieldValue::Number(n), Value::Number(a)) => a.as_f64() == Some(*n),
        (FieldValue::Text(s), Value::String(a)) => s == a,
        _ => false,
    }
}

/// Per-column inclusion rules; every rule must admit a row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterConfig {
    params: BTreeMap<String, FieldFilter>,
}

impl FilterConfig {
    /// Every column the sport's stock parameter set exposes, unrestricted.
    pub fn defaults(sport: Sport) -> Self {
        let (ranges, lists): (&[&str], &[&str]) = match sport {
            Sport::Football => (
                &[
                    "homeFullTimeOdd",
                    "awayFullTimeOdd",
                    "homeExpectedWinningPercentage",
                    "homeActualWinningPercentage",
                    "awayExpectedWinningPercentage",
                    "awayActualWinningPercentage",
                    "homeHandicap",
                    "homeHandicapOdd",
                ],
                &[
                    "homePregameFormLast5",
                    "homePregameFormLast4",
                    "awayPregameFormLast5",
                    "awayPregameFormLast4",
                ],
            ),
            Sport::Basketball => (
                &["homeOdd", "awayOdd"],
                &[
                    "homePregameFormLast5",
                    "homeWins",
                    "homeLoses",
                    "awayPregameFormLast5",
                    "awayWins",
                    "awayLoses",
                ],
            ),
        };

        let mut cfg = Self::default();
        for name in ranges {
            cfg.set(*name, FieldFilter::unrestricted_range());
        }
        for name in lists {
            cfg.set(*name, FieldFilter::AllowList(Vec::new()));
        }
        cfg
    }

    pub fn set(&mut self, field: impl Into<String>, filter: FieldFilter) {
        self.params.insert(field.into(), filter);
    }

    pub fn get(&self, field: &str) -> Option<&FieldFilter> {
        self.params.get(field)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn validate(&self, sport: Sport) -> Result<(), FilterConfigError> {
        let columns = columns_for(sport);
        for (field, filter) in &self.params {
            if !columns.contains(&field.as_str()) {
                return Err(FilterConfigError::UnknownField { field: field.clone(), sport });
            }
            if let FieldFilter::Range { from, to } = filter {
                if from > to {
                    return Err(FilterConfigError::InvertedRange { field: field.clone(), from: *from, to: *to });
                }
            }
        }
        Ok(())
    }

    pub fn admits(&self, row: &OutputRow) -> bool {
        self.params
            .iter()
            .all(|(field, filter)| filter.admits(row.field(field).as_ref()))
    }
}

/// Keeps the rows every configured rule admits, preserving order.
pub fn filter_rows(rows: Vec<OutputRow>, config: &FilterConfig) -> Vec<OutputRow> {
    let before = rows.len();
    let kept: Vec<OutputRow> = rows.into_iter().filter(|r| config.admits(r)).collect();
    info!("Filtered {}, out of {}", before - kept.len(), before);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::{BasketballRow, FootballRow};
    use serde_json::json;

    fn football(odd: Option<f64>, last5: usize) -> OutputRow {
        OutputRow::Football(FootballRow {
            date: "2024-03-01".into(),
            time: "17:30".into(),
            home: "ARS".into(),
            away: "CHE".into(),
            home_full_time_odd: odd,
            home_pregame_form_last5: last5,
            ..FootballRow::default()
        })
    }

    #[test]
    fn defaults_pass_everything_through() {
        let rows = vec![football(None, 0), football(Some(1.5), 3), football(Some(12.0), 5)];
        let cfg = FilterConfig::defaults(Sport::Football);
        assert!(cfg.validate(Sport::Football).is_ok());
        assert_eq!(filter_rows(rows.clone(), &cfg), rows);
    }

    #[test]
    fn restricted_range_excludes_missing_and_out_of_range() {
        let mut cfg = FilterConfig::default();
        cfg.set("homeFullTimeOdd", FieldFilter::Range { from: 1.5, to: 2.5 });
        let kept = filter_rows(vec![football(None, 0), football(Some(1.5), 0), football(Some(3.0), 0)], &cfg);
        assert_eq!(kept, vec![football(Some(1.5), 0)]);
    }

    #[test]
    fn ranges_let_text_values_through() {
        let mut cfg = FilterConfig::default();
        cfg.set("league", FieldFilter::Range { from: 0.0, to: 1.0 });
        assert!(cfg.admits(&football(None, 0)));
    }

    #[test]
    fn allow_list_requires_membership() {
        let mut cfg = FilterConfig::default();
        cfg.set("homePregameFormLast5", FieldFilter::AllowList(vec![json!(4), json!(5)]));
        assert!(!cfg.admits(&football(None, 3)));
        assert!(cfg.admits(&football(None, 4)));
    }

    #[test]
    fn parses_parameter_file_shape() {
        let cfg: FilterConfig = serde_json::from_value(json!({
            "homeOdd": {"from": 1.2, "to": 1.9},
            "awayOdd": {"from": -1, "to": 999},
            "homeWins": [],
            "homeLoses": [1, 2]
        }))
        .unwrap();
        assert_eq!(cfg.len(), 4);
        assert!(cfg.get("awayOdd").unwrap().is_unrestricted());
        assert!(cfg.validate(Sport::Basketball).is_ok());

        let row = OutputRow::Basketball(BasketballRow {
            home_odd: Some(1.5),
            home_loses: 2,
            ..BasketballRow::default()
        });
        assert!(cfg.admits(&row));
    }

    #[test]
    fn validation_rejects_unknown_columns_and_inverted_ranges() {
        let mut cfg = FilterConfig::default();
        cfg.set("homeOdd", FieldFilter::unrestricted_range());
        assert!(matches!(cfg.validate(Sport::Football), Err(FilterConfigError::UnknownField { .. })));

        let mut cfg = FilterConfig::default();
        cfg.set("homeFullTimeOdd", FieldFilter::Range { from: 3.0, to: 1.0 });
        assert!(matches!(cfg.validate(Sport::Football), Err(FilterConfigError::InvertedRange { .. })));
    }
}
