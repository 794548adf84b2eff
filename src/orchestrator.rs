use crate::config::SearchSettings;
use crate::filter::{FlaggedListing, ListingFilter};
use crate::models::{merge_by_url, SearchOutcome, UserCriteria};
use crate::oracle::Oracle;
use crate::scrapers::{BrowserDriver, RefinementLoop, SearchReport, SiteAdapter, StopReason, Termination};
use futures::stream::{self, StreamExt};
use tracing::{info, info_span, warn, Instrument};

/// Named London areas and the postcode districts they cover. Order
/// matters: the first matching entry wins.
const AREAS: &[(&str, &[&str])] = &[
    ("north west london", &["NW1", "NW2", "NW3", "NW4", "NW5", "NW6", "NW7", "NW8", "NW9", "NW10", "NW11"]),
    (
        "north london",
        &[
            "N1", "N2", "N3", "N4", "N5", "N6", "N7", "N8", "N9", "N10", "N11", "N12", "N13", "N14", "N15",
            "N16", "N17", "N18", "N19", "N20", "N21", "N22",
        ],
    ),
    (
        "west london",
        &["W1", "W2", "W3", "W4", "W5", "W6", "W7", "W8", "W9", "W10", "W11", "W12", "W13", "W14"],
    ),
    (
        "south west london",
        &[
            "SW1", "SW2", "SW3", "SW4", "SW5", "SW6", "SW7", "SW8", "SW9", "SW10", "SW11", "SW12", "SW13",
            "SW14", "SW15", "SW16", "SW17", "SW18", "SW19", "SW20",
        ],
    ),
    (
        "south east london",
        &[
            "SE1", "SE2", "SE3", "SE4", "SE5", "SE6", "SE7", "SE8", "SE9", "SE10", "SE11", "SE12", "SE13",
            "SE14", "SE15", "SE16", "SE17", "SE18", "SE19", "SE20", "SE21", "SE22", "SE23", "SE24", "SE25",
            "SE26", "SE27", "SE28",
        ],
    ),
    (
        "east london",
        &[
            "E1", "E2", "E3", "E4", "E5", "E6", "E7", "E8", "E9", "E10", "E11", "E12", "E13", "E14", "E15",
            "E16", "E17", "E18", "E20",
        ],
    ),
    ("central london", &["W1", "WC1", "WC2", "EC1", "EC2", "EC3", "EC4", "SW1"]),
    ("camden", &["NW1", "NW3", "NW5"]),
    ("islington", &["N1", "N5", "N7"]),
    ("hackney", &["E2", "E5", "E8", "E9"]),
    ("tower hamlets", &["E1", "E3", "E14"]),
    ("southwark", &["SE1", "SE15", "SE16", "SE17"]),
    ("lambeth", &["SE11", "SE24", "SW2", "SW4", "SW8", "SW9"]),
    ("wandsworth", &["SW11", "SW12", "SW15", "SW17", "SW18", "SW19"]),
    ("hammersmith", &["W6", "W12", "W14"]),
    ("kensington", &["W8", "W10", "W11", "SW3", "SW5", "SW7"]),
    ("westminster", &["W1", "SW1", "WC1", "WC2"]),
];

/// Postcode districts for a named area: exact name first, then
/// containment either way
pub fn lookup_area(location: &str) -> Option<&'static [&'static str]> {
    let needle = location.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    AREAS
        .iter()
        .find(|(area, _)| *area == needle)
        .or_else(|| {
            AREAS
                .iter()
                .find(|(area, _)| area.contains(needle.as_str()) || needle.contains(area))
        })
        .map(|(_, districts)| *districts)
}

/// Whether `location` already starts with a known postcode district
fn is_postcode_like(location: &str) -> bool {
    let lower = location.trim().to_lowercase();
    AREAS
        .iter()
        .flat_map(|(_, districts)| districts.iter())
        .any(|district| lower.starts_with(&district.to_lowercase()))
}

/// Concrete search locations for `location`. Falls back to the input
/// unchanged when neither the table nor the oracle can expand it.
pub async fn expand_location(location: &str, oracle: &dyn Oracle) -> Vec<String> {
    if is_postcode_like(location) {
        info!("Location '{}' is already a postcode district, using as is", location);
        return vec![location.trim().to_string()];
    }

    if let Some(districts) = lookup_area(location) {
        info!("Expanded '{}' to {} districts: {:?}", location, districts.len(), districts);
        return districts.iter().map(|d| d.to_string()).collect();
    }

    if oracle.is_enabled() {
        if let Some(expanded) = oracle.expand_location(location).await {
            if expanded.len() > 1 {
                info!("Oracle expanded '{}' to {:?}", location, expanded);
                return expanded;
            }
        }
    }

    info!("Could not expand '{}', using as is", location);
    vec![location.trim().to_string()]
}

/// What one (site, location) search produced, without its records
#[derive(Debug, Clone)]
pub struct SearchSummary {
    pub site: String,
    pub location: String,
    pub found: usize,
    pub attempts: usize,
    pub last_outcome: Option<SearchOutcome>,
    pub termination: Termination,
}

impl From<&SearchReport> for SearchSummary {
    fn from(report: &SearchReport) -> Self {
        Self {
            site: report.site.clone(),
            location: report.location.clone(),
            found: report.listings.len(),
            attempts: report.attempts,
            last_outcome: report.last_outcome.clone(),
            termination: report.termination.clone(),
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub searches: Vec<SearchSummary>,
    /// Records across all searches before dedup
    pub total_found: usize,
    /// Records after dedup, before filtering
    pub unique: usize,
    pub listings: Vec<FlaggedListing>,
}

impl RunSummary {
    pub fn private_count(&self) -> usize {
        self.listings
            .iter()
            .filter(|l| l.is_private_landlord_guess)
            .count()
    }

    /// Plausible causes for an empty result
    pub fn diagnostics(&self) -> Vec<String> {
        let mut causes = Vec::new();
        if self.searches.is_empty() {
            causes.push("No searches ran; check the configured sites".to_string());
            return causes;
        }

        if self
            .searches
            .iter()
            .any(|s| matches!(s.termination, Termination::Stopped(StopReason::Blocked(_))))
        {
            causes.push("Anti-bot protection blocked at least one search".to_string());
        }
        if self
            .searches
            .iter()
            .any(|s| matches!(s.last_outcome, Some(SearchOutcome::Error { .. })))
        {
            causes.push("Pages failed to load; check network connectivity".to_string());
        }
        if self
            .searches
            .iter()
            .any(|s| matches!(s.last_outcome, Some(SearchOutcome::ZeroResults { .. })))
        {
            causes.push("Search criteria may be too restrictive".to_string());
        }
        if self.unique > 0 {
            causes.push(format!(
                "{} listings were found but none passed the filters",
                self.unique
            ));
        } else {
            causes.push("Site markup may have changed; check the selector configuration".to_string());
        }
        causes
    }

    pub fn log(&self) {
        for search in &self.searches {
            info!(
                "{} / {}: {} listings in {} attempts, {}",
                search.site, search.location, search.found, search.attempts, search.termination
            );
        }
        let succeeded = self.searches.iter().filter(|s| s.termination.is_success()).count();
        info!(
            "Summary: {}/{} searches succeeded, {} found, {} unique, {} kept, {} private",
            succeeded,
            self.searches.len(),
            self.total_found,
            self.unique,
            self.listings.len(),
            self.private_count()
        );
        if self.listings.is_empty() {
            warn!("No listings found. This may indicate:");
            for cause in self.diagnostics() {
                warn!("- {}", cause);
            }
        }
    }
}

/// Runs every adapter against every expanded location
pub struct Orchestrator {
    adapters: Vec<Box<dyn SiteAdapter>>,
    oracle: Box<dyn Oracle>,
    settings: SearchSettings,
}

impl Orchestrator {
    pub fn new(adapters: Vec<Box<dyn SiteAdapter>>, oracle: Box<dyn Oracle>, settings: SearchSettings) -> Self {
        Self {
            adapters,
            oracle,
            settings,
        }
    }

    pub async fn run(&self, browser: &dyn BrowserDriver, criteria: &UserCriteria) -> RunSummary {
        let oracle = self.oracle.as_ref();
        let locations = expand_location(&criteria.location, oracle).await;
        info!(
            "Searching {} sites across {} locations",
            self.adapters.len(),
            locations.len()
        );

        let jobs: Vec<(&dyn SiteAdapter, String)> = self
            .adapters
            .iter()
            .flat_map(|adapter| {
                locations
                    .iter()
                    .map(move |location| (adapter.as_ref(), location.clone()))
            })
            .collect();

        let reports: Vec<SearchReport> = stream::iter(jobs)
            .map(|(adapter, location)| {
                let span = info_span!("search", site = adapter.source_name(), location = %location);
                let criteria = criteria.for_location(&location);
                async move {
                    RefinementLoop::new(adapter, oracle, &self.settings)
                        .run(browser, &criteria)
                        .await
                }
                .instrument(span)
            })
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let searches: Vec<SearchSummary> = reports.iter().map(SearchSummary::from).collect();
        let total_found = searches.iter().map(|s| s.found).sum();
        let merged = merge_by_url(reports.into_iter().flat_map(|r| r.listings));
        let unique = merged.len();
        info!("{} listings found, {} unique after dedup", total_found, unique);

        let listings = ListingFilter::new(criteria, oracle).apply(merged).await;
        RunSummary {
            searches,
            total_found,
            unique,
            listings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Pacing;
    use crate::models::{AttemptHistory, QueryParams};
    use crate::oracle::{NoOracle, RefinementAction};
    use crate::scrapers::fixture::{gumtree_card, results_page, FixtureBrowser};
    use crate::scrapers::gumtree::{self, GumtreeAdapter};
    use async_trait::async_trait;

    struct ExpandingOracle(Vec<String>);

    #[async_trait]
    impl Oracle for ExpandingOracle {
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

        async fn expand_location(&self, _location: &str) -> Option<Vec<String>> {
            Some(self.0.clone())
        }
    }

    #[test]
    fn test_lookup_area_prefers_exact_match() {
        assert_eq!(lookup_area("West London").map(|d| d.len()), Some(14));
        assert_eq!(lookup_area("north west london").map(|d| d[0]), Some("NW1"));
        assert_eq!(lookup_area("Camden Town"), Some(&["NW1", "NW3", "NW5"][..]));
        assert_eq!(lookup_area("Reading"), None);
    }

    #[tokio::test]
    async fn test_expand_location() {
        assert_eq!(expand_location("NW1", &NoOracle).await, vec!["NW1"]);
        assert_eq!(expand_location("hackney", &NoOracle).await, vec!["E2", "E5", "E8", "E9"]);
        assert_eq!(expand_location("Reading", &NoOracle).await, vec!["Reading"]);

        let oracle = ExpandingOracle(vec!["RG1".to_string(), "RG2".to_string()]);
        assert_eq!(expand_location("Reading", &oracle).await, vec!["RG1", "RG2"]);

        let oracle = ExpandingOracle(vec!["RG1".to_string()]);
        assert_eq!(expand_location("Reading", &oracle).await, vec!["Reading"]);
    }

    #[tokio::test]
    async fn test_private_only_run_end_to_end() {
        let criteria = UserCriteria {
            location: "NW1".to_string(),
            price_max: Some(2500),
            bedrooms_min: Some(1),
            private_only: true,
            ..Default::default()
        };

        let adapter = GumtreeAdapter::new(gumtree::default_config(), Pacing::none());
        let params = criteria.to_query_params();
        let first_url = adapter.construct_search_url(&params, 1);
        let second_url = adapter.construct_search_url(&params, 2);

        let mut cards: Vec<String> = (1..=12)
            .map(|id| gumtree_card(id, "Private", "£1,800 pcm", "2 beds"))
            .collect();
        cards.extend((13..=20).map(|id| gumtree_card(id, "Agency", "£1,900 pcm", "2 beds")));

        let browser = FixtureBrowser::new();
        browser.route(&first_url, results_page(&cards, Some(2)));
        browser.route(&second_url, results_page(&[], Some(2)));

        let orchestrator = Orchestrator::new(vec![Box::new(adapter)], Box::new(NoOracle), SearchSettings::default());
        let summary = orchestrator.run(&browser, &criteria).await;

        assert_eq!(summary.total_found, 20);
        assert_eq!(summary.unique, 20);
        assert_eq!(summary.listings.len(), 12);
        assert!(summary.listings.iter().all(|l| l.is_private_landlord_guess));
        assert_eq!(summary.private_count(), 12);
        assert_eq!(browser.visits(), vec![first_url, second_url]);
        assert_eq!(browser.opened(), browser.closed());
        assert!(summary.searches[0].termination.is_success());
    }

    #[tokio::test]
    async fn test_duplicates_across_locations_are_merged() {
        let criteria = UserCriteria {
            location: "camden".to_string(),
            exclude_agents: false,
            ..Default::default()
        };
        let adapter = GumtreeAdapter::new(gumtree::default_config(), Pacing::none());
        let browser = FixtureBrowser::new();
        for district in ["NW1", "NW3", "NW5"] {
            let params = criteria.for_location(district).to_query_params();
            let cards = vec![
                gumtree_card(1, "Private", "£1,500 pcm", "1 bed"),
                gumtree_card(2, "Private", "£1,600 pcm", "1 bed"),
            ];
            browser.route(&adapter.construct_search_url(&params, 1), results_page(&cards, None));
        }

        let orchestrator = Orchestrator::new(vec![Box::new(adapter)], Box::new(NoOracle), SearchSettings::default());
        let summary = orchestrator.run(&browser, &criteria).await;

        assert_eq!(summary.searches.len(), 3);
        assert_eq!(summary.total_found, 6);
        assert_eq!(summary.unique, 2);
        assert_eq!(browser.opened(), 3);
        assert_eq!(browser.closed(), 3);
    }

    #[tokio::test]
    async fn test_failing_search_does_not_abort_siblings() {
        let criteria = UserCriteria {
            location: "camden".to_string(),
            ..Default::default()
        };
        let adapter = GumtreeAdapter::new(gumtree::default_config(), Pacing::none());
        let browser = FixtureBrowser::new();
        let params = criteria.for_location("NW3").to_query_params();
        browser.route(
            &adapter.construct_search_url(&params, 1),
            results_page(&[gumtree_card(7, "Private", "£1,500 pcm", "1 bed")], None),
        );

        let settings = SearchSettings {
            concurrency: 3,
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(vec![Box::new(adapter)], Box::new(NoOracle), settings);
        let summary = orchestrator.run(&browser, &criteria).await;

        assert_eq!(summary.listings.len(), 1);
        let locations: Vec<&str> = summary.searches.iter().map(|s| s.location.as_str()).collect();
        assert_eq!(locations, vec!["NW1", "NW3", "NW5"]);
        assert!(!summary.searches[0].termination.is_success());
        assert!(summary.searches[1].termination.is_success());
    }

    #[test]
    fn test_diagnostics_for_blocked_run() {
        let summary = RunSummary {
            searches: vec![SearchSummary {
                site: "Gumtree".to_string(),
                location: "NW1".to_string(),
                found: 0,
                attempts: 1,
                last_outcome: Some(SearchOutcome::Blocked {
                    details: "captcha".to_string(),
                }),
                termination: Termination::Stopped(StopReason::Blocked("captcha".to_string())),
            }],
            total_found: 0,
            unique: 0,
            listings: Vec::new(),
        };
        let causes = summary.diagnostics();
        assert!(causes[0].contains("Anti-bot"));
        assert!(causes.last().unwrap().contains("selector"));
    }
}
