use crate::dataset::{DatasetQuery, DatasetSource};
use crate::poller::PollInterval;
use log::warn;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_BASE: &str = "/api";
pub const DEFAULT_BACKEND_ORIGIN: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Absolute API root, without trailing slash.
    pub api_base: String,
    pub timeout: Duration,
    pub poll: PollInterval,
    pub query: DatasetQuery,
}

impl Config {
    pub fn from_env() -> Result<Config, failure::Error> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config, failure::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_base = lookup("API_URL").or_else(|| lookup("API_BASE"));
        let origin =
            lookup("BACKEND_ORIGIN").unwrap_or_else(|| DEFAULT_BACKEND_ORIGIN.to_string());
        let api_base = resolve_api_base(raw_base.as_deref(), &origin)?;

        let timeout = match lookup("API_TIMEOUT_MS") {
            Some(ms) => clamp_timeout(Duration::from_millis(parse_number("API_TIMEOUT_MS", &ms)?)),
            None => DEFAULT_TIMEOUT,
        };
        let poll = match lookup("POLL_INTERVAL_MS") {
            Some(s) => PollInterval::parse(&s)
                .ok_or_else(|| format_err!("POLL_INTERVAL_MS must be a number or 'off', got {:?}", s))?,
            None => PollInterval::Every(DEFAULT_POLL_INTERVAL),
        };

        let mut query = DatasetQuery::default();
        if let Some(s) = lookup("MINUTES_SIGHTINGS") {
            query.minutes_sightings = parse_number("MINUTES_SIGHTINGS", &s)?;
        }
        if let Some(s) = lookup("MINUTES_ALERTS") {
            query.minutes_alerts = parse_number("MINUTES_ALERTS", &s)?;
        }
        if let Some(s) = lookup("DATASET_SOURCE") {
            query.source = DatasetSource::parse(&s)
                .ok_or_else(|| format_err!("DATASET_SOURCE must be 'api' or 'apiLegacy', got {:?}", s))?;
        }

        Ok(Config {
            api_base,
            timeout,
            poll,
            query,
        })
    }
}

pub fn clamp_timeout(timeout: Duration) -> Duration {
    timeout.max(MIN_TIMEOUT)
}

/// Resolves the configured API root to an absolute URL.
///
/// A relative root (the default `/api`) is joined onto the backend origin, the
/// same rewrite the web tier applies to `/api/*`.
pub fn resolve_api_base(raw: Option<&str>, origin: &str) -> Result<String, failure::Error> {
    let raw = raw.map(str::trim).unwrap_or("");
    let raw = if raw.is_empty() {
        warn!(
            "API_URL not defined; falling back to {:?} on {}",
            DEFAULT_API_BASE, origin
        );
        DEFAULT_API_BASE
    } else {
        raw
    };

    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let origin = Url::parse(origin)
                .map_err(|e| format_err!("Invalid BACKEND_ORIGIN {:?}: {}", origin, e))?;
            origin
                .join(raw)
                .map_err(|e| format_err!("Invalid API_URL {:?}: {}", raw, e))?
        }
        Err(e) => return Err(format_err!("Invalid API_URL {:?}: {}", raw, e)),
    };
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, failure::Error> {
    value
        .trim()
        .parse()
        .map_err(|_| format_err!("{} must be a non-negative integer in range, got {:?}", key, value))
}
