use super::QueryParams;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Verdict on one navigated results page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    ListingsFound { count: usize },
    ZeroResults { details: String },
    Blocked { details: String },
    Error { details: String },
    Unknown { details: String },
}

impl SearchOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            Self::ListingsFound { .. } => "listings_found",
            Self::ZeroResults { .. } => "zero_results",
            Self::Blocked { .. } => "blocked",
            Self::Error { .. } => "error",
            Self::Unknown { .. } => "unknown",
        }
    }
}

impl fmt::Display for SearchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ListingsFound { count } => write!(f, "listings_found ({})", count),
            Self::ZeroResults { details }
            | Self::Blocked { details }
            | Self::Error { details }
            | Self::Unknown { details } => write!(f, "{}: {}", self.status(), details),
        }
    }
}

/// One search attempt as shown to the oracle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttemptRecord {
    pub attempt: usize,
    pub params: QueryParams,
    pub url: String,
    pub outcome: SearchOutcome,
}

/// Append-only log of the attempts of one refinement loop
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct AttemptHistory(Vec<AttemptRecord>);

impl AttemptHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, params: &QueryParams, url: &str, outcome: &SearchOutcome) {
        let attempt = self.0.len() + 1;
        self.0.push(AttemptRecord {
            attempt,
            params: params.clone(),
            url: url.to_string(),
            outcome: outcome.clone(),
        });
    }

    pub fn last(&self) -> Option<&AttemptRecord> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
