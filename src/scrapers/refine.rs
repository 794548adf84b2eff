use super::browser::{BrowserDriver, Page};
use super::pagination::{navigate, PageRun, PaginationStop, Paginator};
use super::traits::SiteAdapter;
use crate::config::SearchSettings;
use crate::models::{AttemptHistory, Listing, QueryParams, SearchOutcome, UserCriteria};
use crate::oracle::{Oracle, RefinementAction};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a search ended without success
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// No usable initial parameters
    TransformFailed,
    /// Anti-bot block on the first page
    Blocked(String),
    /// Attempt budget used up
    MaxAttempts,
    /// Oracle returned nothing
    NoSuggestion,
    /// Oracle asked to stop
    OracleStopped(String),
    /// Oracle suggested an edit that can't be applied
    InvalidSuggestion(String),
    UnrecognizedAction,
    /// No browser page could be opened
    PageUnavailable(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransformFailed => write!(f, "no initial query parameters"),
            Self::Blocked(details) => write!(f, "blocked: {}", details),
            Self::MaxAttempts => write!(f, "max retries reached"),
            Self::NoSuggestion => write!(f, "no refinement suggested"),
            Self::OracleStopped(reason) => write!(f, "oracle stopped: {}", reason),
            Self::InvalidSuggestion(reason) => write!(f, "invalid suggestion: {}", reason),
            Self::UnrecognizedAction => write!(f, "unrecognized refinement action"),
            Self::PageUnavailable(reason) => write!(f, "could not open page: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    Success {
        pages_visited: u32,
        pagination: PaginationStop,
    },
    Stopped(StopReason),
}

impl Termination {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { pages_visited, .. } => write!(f, "success ({} pages)", pages_visited),
            Self::Stopped(reason) => write!(f, "stopped, {}", reason),
        }
    }
}

/// Result of one (site, location) search
#[derive(Debug)]
pub struct SearchReport {
    pub site: String,
    pub location: String,
    pub listings: Vec<Listing>,
    pub attempts: usize,
    pub last_outcome: Option<SearchOutcome>,
    pub termination: Termination,
}

enum LoopState {
    InitialTransform,
    Searching,
    Refining(SearchOutcome),
    Success(PageRun),
    Stopped(StopReason),
}

/// Owns a search's tab. Dropped before `released` is set (the search
/// future was cancelled), it closes the tab on a background task.
struct PageGuard {
    page: Arc<dyn Page>,
    released: bool,
}

impl PageGuard {
    fn new(page: Box<dyn Page>) -> Self {
        Self {
            page: Arc::from(page),
            released: false,
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("Search dropped outside a runtime, its browser page stays open");
            return;
        };
        let page = self.page.clone();
        handle.spawn(async move {
            match page.close().await {
                Ok(()) => debug!("Closed browser page of a cancelled search"),
                Err(e) => warn!("Error closing browser page of a cancelled search: {:#}", e),
            }
        });
    }
}

/// Search, classify and refine until listings are found or the attempt
/// budget runs out
pub struct RefinementLoop<'a> {
    adapter: &'a dyn SiteAdapter,
    oracle: &'a dyn Oracle,
    settings: &'a SearchSettings,
}

impl<'a> RefinementLoop<'a> {
    pub fn new(adapter: &'a dyn SiteAdapter, oracle: &'a dyn Oracle, settings: &'a SearchSettings) -> Self {
        Self {
            adapter,
            oracle,
            settings,
        }
    }

    /// Open a page, run the loop on it and close it again whatever happens
    pub async fn run(&self, browser: &dyn BrowserDriver, criteria: &UserCriteria) -> SearchReport {
        let page = match self.adapter.open(browser).await {
            Ok(page) => page,
            Err(e) => {
                warn!("[{}] Could not open browser page: {:#}", self.adapter.source_name(), e);
                return SearchReport {
                    site: self.adapter.source_name().to_string(),
                    location: criteria.location.clone(),
                    listings: Vec::new(),
                    attempts: 0,
                    last_outcome: None,
                    termination: Termination::Stopped(StopReason::PageUnavailable(format!("{:#}", e))),
                };
            }
        };

        let mut guard = PageGuard::new(page);
        let report = self.run_on_page(guard.page.as_ref(), criteria).await;
        self.adapter.close(guard.page.as_ref()).await;
        guard.released = true;
        report
    }

    pub async fn run_on_page(&self, page: &dyn Page, criteria: &UserCriteria) -> SearchReport {
        let site = self.adapter.source_name();
        let max_attempts = self.settings.max_attempts.max(1);
        let mut params = QueryParams::new();
        let mut history = AttemptHistory::new();
        let mut state = LoopState::InitialTransform;

        let (termination, listings) = loop {
            state = match state {
                LoopState::InitialTransform => match self.oracle.transform(criteria, site).await {
                    Some(initial) if !initial.is_empty() => {
                        debug!("[{}] Initial parameters: {:?}", site, initial);
                        params = initial;
                        LoopState::Searching
                    }
                    _ => LoopState::Stopped(StopReason::TransformFailed),
                },

                LoopState::Searching => {
                    let url = self.adapter.construct_search_url(&params, 1);
                    info!(
                        "[{}] Attempt {}/{}: {}",
                        site,
                        history.len() + 1,
                        max_attempts,
                        url
                    );
                    let outcome = self.attempt(page, &url).await;
                    history.record(&params, &url, &outcome);
                    info!("[{}] Outcome: {}", site, outcome);

                    match outcome {
                        SearchOutcome::ListingsFound { .. } => {
                            let run = Paginator::new(self.adapter, self.settings)
                                .paginate(page, &params)
                                .await;
                            LoopState::Success(run)
                        }
                        SearchOutcome::Blocked { details } => LoopState::Stopped(StopReason::Blocked(details)),
                        _ if history.len() >= max_attempts => LoopState::Stopped(StopReason::MaxAttempts),
                        other => LoopState::Refining(other),
                    }
                }

                LoopState::Refining(outcome) => {
                    match self.oracle.refine(site, &params, &outcome, &history).await {
                        None => LoopState::Stopped(StopReason::NoSuggestion),
                        Some(action) => {
                            info!("[{}] Applying refinement: {:?}", site, action);
                            match apply_action(&mut params, action) {
                                Ok(()) => LoopState::Searching,
                                Err(reason) => LoopState::Stopped(reason),
                            }
                        }
                    }
                }

                LoopState::Success(run) => {
                    let termination = Termination::Success {
                        pages_visited: run.pages_visited,
                        pagination: run.stop,
                    };
                    info!(
                        "[{}] Search finished after {} attempts: {} listings",
                        site,
                        history.len(),
                        run.listings.len()
                    );
                    break (termination, run.listings);
                }

                LoopState::Stopped(reason) => {
                    info!("[{}] Search stopped after {} attempts: {}", site, history.len(), reason);
                    break (Termination::Stopped(reason), Vec::new());
                }
            };
        };

        SearchReport {
            site: site.to_string(),
            location: criteria.location.clone(),
            listings,
            attempts: history.len(),
            last_outcome: history.last().map(|record| record.outcome.clone()),
            termination,
        }
    }

    /// Navigate to the first results page and classify it. Navigation that
    /// fails on every retry counts as an `Error` outcome.
    async fn attempt(&self, page: &dyn Page, url: &str) -> SearchOutcome {
        let site = self.adapter.source_name();
        if let Err(e) = navigate(page, url, self.settings, self.adapter.pacing(), site).await {
            return SearchOutcome::Error {
                details: e.to_string(),
            };
        }
        self.adapter.dismiss_obstacles(page).await;
        self.adapter.classify(page).await
    }
}

/// Apply one refinement to `params`. Edits that can't be applied end the
/// loop rather than being guessed at.
fn apply_action(params: &mut QueryParams, action: RefinementAction) -> Result<(), StopReason> {
    match action {
        RefinementAction::ModifyParameter {
            parameter: Some(parameter),
            new_value: Some(value),
        } if !parameter.trim().is_empty() && !value.is_null() => {
            params.set(parameter.trim(), value);
            Ok(())
        }
        RefinementAction::ModifyParameter { .. } => Err(StopReason::InvalidSuggestion(
            "modify_parameter without parameter or new_value".to_string(),
        )),
        RefinementAction::RemoveFilter { filter_name } => {
            match filter_name.as_deref().map(str::trim) {
                Some(name) if params.remove(name).is_some() => debug!("Removed filter {}", name),
                Some(name) => debug!("Filter {} was not set", name),
                None => warn!("remove_filter without filter_name, parameters unchanged"),
            }
            Ok(())
        }
        RefinementAction::AddKeyword { keyword } => {
            match keyword {
                Some(keyword) if params.add_keyword(&keyword) => debug!("Added keyword {}", keyword),
                Some(keyword) => debug!("Keyword {} already present", keyword),
                None => warn!("add_keyword without keyword, parameters unchanged"),
            }
            Ok(())
        }
        RefinementAction::ChangeSearchStrategy { strategy, parameters } => {
            if let Some(strategy) = strategy {
                params.set("search_strategy", Value::String(strategy));
            }
            params.merge(parameters);
            Ok(())
        }
        RefinementAction::StopAttempts { reason } => Err(StopReason::OracleStopped(
            reason.unwrap_or_else(|| "no reason given".to_string()),
        )),
        RefinementAction::Unrecognized => Err(StopReason::UnrecognizedAction),
    }
}
