use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::PipelineError;

pub const DEFAULT_DB_PATH: &str = "hhData/vacancies.db";
pub const DEFAULT_API_URL: &str = "https://api.hh.ru/vacancies";
pub const DEFAULT_USER_AGENT: &str = "hh-vacancies/0.1 (student job digest)";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Upstream hard limit on `per_page`.
pub const MAX_PAGE_SIZE: u32 = 100;
pub const MIN_PAGE_DELAY: Duration = Duration::from_millis(50);

/// Upstream area ids, keyed by the identifiers accepted on the command line.
pub const COUNTRY_CODES: &[(&str, u32)] = &[
    ("UA", 5),
    ("AZ", 9),
    ("BY", 16),
    ("GE", 28),
    ("KZ", 40),
    ("KG", 48),
    ("UZ", 97),
    ("RU", 113),
    ("Other", 1001),
];

/// Resolve a country identifier to its upstream area id. Exact match only.
pub fn area_code(country: &str) -> Result<u32, PipelineError> {
    COUNTRY_CODES
        .iter()
        .find(|(id, _)| *id == country)
        .map(|(_, code)| *code)
        .ok_or_else(|| PipelineError::UnknownCountry(country.to_string()))
}

pub fn check_page_size(per_page: u32) -> Result<u32, PipelineError> {
    if per_page == 0 || per_page > MAX_PAGE_SIZE {
        return Err(PipelineError::InvalidPageSize(per_page));
    }
    Ok(per_page)
}

/// Raise a per-page delay to the floor. Returns the effective delay and
/// whether it had to be raised.
pub fn clamp_delay(delay: Duration) -> (Duration, bool) {
    if delay < MIN_PAGE_DELAY {
        (MIN_PAGE_DELAY, true)
    } else {
        (delay, false)
    }
}

/// Environment-level settings (`HH_*`). CLI flags override these.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub api_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            api_url: DEFAULT_API_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let d = Self::default();
        ::config::Config::builder()
            .set_default("db_path", d.db_path.to_string_lossy().into_owned())?
            .set_default("api_url", d.api_url)?
            .set_default("user_agent", d.user_agent)?
            .set_default("timeout_secs", d.timeout_secs)?
            .add_source(::config::Environment::with_prefix("HH"))
            .build()
            .and_then(|c| c.try_deserialize())
            .context("Failed to load HH_* settings")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Everything one ingestion run needs besides the store and the fetcher.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub data_dir: PathBuf,
    pub country: String,
    pub per_page: u32,
    pub delay: Duration,
    pub student_only: bool,
}
