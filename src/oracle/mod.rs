//! Advisory oracle: turns raw criteria into site parameters and suggests
//! one edit when a search comes back unsatisfactory.
//!
//! Every oracle call degrades instead of failing. A missing, malformed or
//! unparsable answer means "no suggestion" and the caller carries on.

mod openai;

pub use openai::OpenAiOracle;

use crate::models::{AttemptHistory, QueryParams, SearchOutcome, UserCriteria};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Whether calls reach a real service. Callers skip optional work
    /// (semantic keyword checks) when this is false.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Initial site parameters for `criteria`. `None` or an empty set ends
    /// the search for this site and location.
    async fn transform(&self, criteria: &UserCriteria, site: &str) -> Option<QueryParams>;

    /// One refinement for a search that produced `outcome`
    async fn refine(
        &self,
        site: &str,
        params: &QueryParams,
        outcome: &SearchOutcome,
        history: &AttemptHistory,
    ) -> Option<RefinementAction>;

    /// Concrete search locations for a broad area
    async fn expand_location(&self, _location: &str) -> Option<Vec<String>> {
        None
    }

    /// Whether `text` means the same thing as any of `keywords`
    async fn matches_keywords(&self, _text: &str, _keywords: &[String]) -> bool {
        false
    }
}

/// The fixed set of edits an oracle may suggest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RefinementAction {
    ModifyParameter {
        #[serde(default)]
        parameter: Option<String>,
        #[serde(default)]
        new_value: Option<Value>,
    },
    RemoveFilter {
        #[serde(default)]
        filter_name: Option<String>,
    },
    AddKeyword {
        #[serde(default)]
        keyword: Option<String>,
    },
    ChangeSearchStrategy {
        #[serde(default)]
        strategy: Option<String>,
        #[serde(default)]
        parameters: Map<String, Value>,
    },
    StopAttempts {
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(other)]
    Unrecognized,
}

impl RefinementAction {
    /// Parse an oracle reply. `None` unless it is a JSON object with an
    /// `action` field; unknown actions parse as `Unrecognized`.
    pub fn parse(reply: &str) -> Option<Self> {
        let value: Value = match serde_json::from_str(strip_code_fence(reply)) {
            Ok(value) => value,
            Err(e) => {
                debug!("Refinement reply is not JSON: {}", e);
                return None;
            }
        };
        if !value.get("action").is_some_and(Value::is_string) {
            debug!("Refinement reply has no action field: {}", value);
            return None;
        }
        match serde_json::from_value(value) {
            Ok(action) => Some(action),
            Err(e) => {
                debug!("Refinement reply has malformed fields: {}", e);
                None
            }
        }
    }
}

/// Drop a surrounding ```json ... ``` fence, if any
pub fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Oracle used when none is configured: criteria pass through unchanged
/// and no refinement is ever suggested.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOracle;

#[async_trait]
impl Oracle for NoOracle {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn transform(&self, criteria: &UserCriteria, _site: &str) -> Option<QueryParams> {
        Some(criteria.to_query_params())
    }

    async fn refine(
        &self,
        _site: &str,
        _params: &QueryParams,
        _outcome: &SearchOutcome,
        _history: &AttemptHistory,
    ) -> Option<RefinementAction> {
        None
    }
}

#[cfg(test)]
pub mod scripted {
    //! Oracles with canned answers for loop tests

    use super::*;
    use std::sync::Mutex;

    /// Replays `actions` in order, then keeps returning the last one
    pub struct ScriptedOracle {
        actions: Vec<Option<RefinementAction>>,
        transform: Option<QueryParams>,
        calls: Mutex<Vec<usize>>,
    }

    impl ScriptedOracle {
        pub fn new(actions: Vec<Option<RefinementAction>>) -> Self {
            Self {
                actions,
                transform: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn with_transform(mut self, params: QueryParams) -> Self {
            self.transform = Some(params);
            self
        }

        /// History length seen by each refine call
        pub fn refine_calls(&self) -> Vec<usize> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        async fn transform(&self, criteria: &UserCriteria, _site: &str) -> Option<QueryParams> {
            Some(
                self.transform
                    .clone()
                    .unwrap_or_else(|| criteria.to_query_params()),
            )
        }

        async fn refine(
            &self,
            _site: &str,
            _params: &QueryParams,
            _outcome: &SearchOutcome,
            history: &AttemptHistory,
        ) -> Option<RefinementAction> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(history.len());
            let idx = (calls.len() - 1).min(self.actions.len().saturating_sub(1));
            self.actions.get(idx).cloned().flatten()
        }
    }
}
