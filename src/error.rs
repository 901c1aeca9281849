use thiserror::Error;

/// Input problems that stop a run before any network or storage work.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown country code '{0}' (expected one of UA, AZ, BY, GE, KZ, KG, UZ, RU, Other)")]
    UnknownCountry(String),
    #[error("page size {0} out of range (1..=100)")]
    InvalidPageSize(u32),
}

/// Why a single page request produced no page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed page body: {0}")]
    Decode(#[from] serde_json::Error),
}
