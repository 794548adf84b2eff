use thiserror::Error;

/// Failure to load a results page. Always treated as transient.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NavigationError {
    #[error("navigation to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    #[error("navigation to {url} failed: {reason}")]
    Failed { url: String, reason: String },
}

/// Adapter-level failures. These abort one adapter, never the whole run.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{site} is misconfigured: {reason}")]
    Misconfigured { site: String, reason: String },

    #[error("unknown site '{site}' (expected one of: {known})")]
    UnknownSite { site: String, known: String },

    #[error("failed to read {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Oracle client errors. Callers downgrade all of these to "no suggestion".
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum CriteriaError {
    #[error("minimum price ({min}) cannot be greater than maximum price ({max})")]
    PriceRange { min: u32, max: u32 },

    #[error("location must not be empty")]
    EmptyLocation,
}
