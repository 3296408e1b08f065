//! Environment and parameter-file configuration for the binaries.

use chrono::NaiveDate;
use identity_pool::{parse_proxy_list, ProxyEndpoint};
use row_formatter::{FilterConfig, FilterConfigError};
use serde::Deserialize;
use sofascore_feed::Sport;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const LOG_DIR: &str = "logs";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("{key} = `{value}` is invalid, expected {expected}")]
    Invalid { key: &'static str, value: String, expected: &'static str },
    #[error("from date {from} is after to date {to}")]
    InvertedRange { from: NaiveDate, to: NaiveDate },
    #[error("parameter file {path}: {reason}")]
    ParameterFile { path: PathBuf, reason: String },
    #[error("parameter file filters: {0}")]
    Filter(#[from] FilterConfigError),
}

fn flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Reads settings through `get` so tests can supply a map instead of the
/// process environment.
struct Env<F: Fn(&str) -> Option<String>>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => flag(&v).ok_or(ConfigError::Invalid { key, value: v, expected: "true or false" }),
        }
    }

    fn number<N: std::str::FromStr>(&self, key: &'static str, default: N) -> Result<N, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid { key, value: v, expected: "a number" }),
        }
    }

    fn date(&self, key: &'static str) -> Result<Option<NaiveDate>, ConfigError> {
        self.get(key).map(|v| parse_date(key, &v)).transpose()
    }
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

pub fn parse_date(key: &'static str, value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
        expected: "a yyyy-MM-dd date",
    })
}

pub fn parse_sport(key: &'static str, value: &str) -> Result<Sport, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
        expected: "football or basketball",
    })
}

// ── Date-range harvest ──

#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub sport: Sport,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub filter_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub date_timeout: Duration,
}

impl HarvestSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(get);
        let sport = match env.get("HARVEST_SPORT") {
            Some(v) => parse_sport("HARVEST_SPORT", &v)?,
            None => Sport::Football,
        };
        Ok(Self {
            sport,
            from: env.date("HARVEST_FROM")?,
            to: env.date("HARVEST_TO")?,
            filter_path: env.get("HARVEST_FILTER_CONFIG").map(PathBuf::from),
            output_dir: PathBuf::from(env.string("HARVEST_OUTPUT_DIR", ".")),
            date_timeout: Duration::from_secs(env.number("HARVEST_DATE_TIMEOUT_SECS", 900u64)?),
        })
    }

    /// Positional overrides: `[sport] <from> <to>`.
    pub fn apply_args(&mut self, args: &[String]) -> Result<(), ConfigError> {
        let dates = match args {
            [] => return Ok(()),
            [sport, rest @ ..] if sport.parse::<Sport>().is_ok() => {
                self.sport = parse_sport("sport argument", sport)?;
                rest
            }
            _ => args,
        };
        match dates {
            [] => Ok(()),
            [from, to] => {
                self.from = Some(parse_date("from argument", from)?);
                self.to = Some(parse_date("to argument", to)?);
                Ok(())
            }
            other => Err(ConfigError::Invalid {
                key: "arguments",
                value: other.join(" "),
                expected: "[sport] <from yyyy-MM-dd> <to yyyy-MM-dd>",
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigParams {
    #[serde(default)]
    pub proxy: Option<String>,
}

/// The per-sport parameter file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterFile {
    #[serde(default)]
    pub from_date: Option<String>,
    #[serde(default)]
    pub to_date: Option<String>,
    #[serde(default)]
    pub config_params: ConfigParams,
    pub output_params: FilterConfig,
}

impl ParameterFile {
    pub fn defaults(sport: Sport) -> Self {
        Self {
            from_date: None,
            to_date: None,
            config_params: ConfigParams::default(),
            output_params: FilterConfig::defaults(sport),
        }
    }

    pub fn parse(path: &Path, raw: &str, sport: Sport) -> Result<Self, ConfigError> {
        let file: ParameterFile = serde_json::from_str(raw)
            .map_err(|e| ConfigError::ParameterFile { path: path.to_path_buf(), reason: e.to_string() })?;
        file.output_params.validate(sport)?;
        Ok(file)
    }

    /// Missing path means the stock parameters for the sport.
    pub fn load(path: Option<&Path>, sport: Sport) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            warn!("No parameter file configured for {}, using the default parameters", sport);
            return Ok(Self::defaults(sport));
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ParameterFile { path: path.to_path_buf(), reason: e.to_string() })?;
        let file = Self::parse(path, &raw, sport)?;
        info!("⚙️ Parameter file {} loaded ({} filters)", path.display(), file.output_params.len());
        Ok(file)
    }

    pub fn proxy(&self) -> Option<&str> {
        self.config_params.proxy.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}

/// Settings first, then the parameter file's own dates.
pub fn resolve_range(settings: &HarvestSettings, params: &ParameterFile) -> Result<(NaiveDate, NaiveDate), ConfigError> {
    let from = match settings.from {
        Some(d) => d,
        None => params
            .from_date
            .as_deref()
            .map(|v| parse_date("fromDate", v))
            .transpose()?
            .ok_or(ConfigError::Missing("from date (HARVEST_FROM, argument or fromDate)"))?,
    };
    let to = match settings.to {
        Some(d) => d,
        None => params
            .to_date
            .as_deref()
            .map(|v| parse_date("toDate", v))
            .transpose()?
            .ok_or(ConfigError::Missing("to date (HARVEST_TO, argument or toDate)"))?,
    };
    if from > to {
        return Err(ConfigError::InvertedRange { from, to });
    }
    Ok((from, to))
}

/// Every day from `from` to `to`, inclusive.
pub fn date_range(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    from.iter_days().take_while(|d| *d <= to).collect()
}

// ── Proxies ──

#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub enabled: bool,
    pub endpoints: Vec<ProxyEndpoint>,
}

impl ProxySettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(get);
        Ok(Self {
            enabled: env.flag("PROXY_ENABLED", true)?,
            endpoints: env.get("PROXY_LIST").map(|raw| parse_proxy_list(&raw)).unwrap_or_default(),
        })
    }

    /// Used when the environment names no proxies.
    pub fn with_fallback(mut self, proxy: Option<&str>) -> Self {
        if self.endpoints.is_empty() {
            if let Some(raw) = proxy {
                self.endpoints = parse_proxy_list(raw);
            }
        }
        self
    }
}

// ── Tickets ──

#[derive(Debug, Clone)]
pub struct TicketSettings {
    pub base_url: String,
    pub max_retries: u32,
    pub use_proxy: bool,
    pub headless: bool,
    pub output_dir: PathBuf,
    pub selectors: Option<PathBuf>,
    pub api_bind: String,
}

impl TicketSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(get);
        Ok(Self {
            base_url: env.string("TICKET_BASE_URL", ticket_scraper::DEFAULT_BASE_URL),
            max_retries: env.number("TICKET_MAX_RETRIES", 5u32)?,
            use_proxy: env.flag("TICKET_USE_PROXY", true)?,
            headless: env.flag("TICKET_HEADLESS", true)?,
            output_dir: PathBuf::from(env.string("TICKET_OUTPUT_DIR", "stubhub-data")),
            selectors: env.get("TICKET_SELECTORS").map(PathBuf::from),
            api_bind: env.string("TICKET_API_BIND", "127.0.0.1:8888"),
        })
    }
}
