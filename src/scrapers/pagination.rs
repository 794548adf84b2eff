use super::browser::Page;
use super::traits::SiteAdapter;
use crate::config::{Pacing, SearchSettings};
use crate::error::NavigationError;
use crate::models::{Listing, ListingSet, QueryParams, SearchOutcome};
use regex::Regex;
use tracing::{debug, info, warn};

const DEFAULT_PAGINATION_LINK: &str = r#"a[href*="page="]"#;
/// Numeric anchor text above this is not a page number
const MAX_LINK_PAGE: u32 = 50;

/// Why a pagination run ended
#[derive(Debug, Clone, PartialEq)]
pub enum PaginationStop {
    /// Every page up to the bound was visited
    Exhausted,
    /// This page produced no records
    EmptyPage(u32),
    /// This page was blocked
    Blocked(u32),
}

#[derive(Debug)]
pub struct PageRun {
    pub listings: Vec<Listing>,
    pub pages_visited: u32,
    pub stop: PaginationStop,
}

/// Navigate with retries. Each failed try waits the adapter's retry
/// backoff before the next one.
pub async fn navigate(
    page: &dyn Page,
    url: &str,
    settings: &SearchSettings,
    pacing: &Pacing,
    site: &str,
) -> Result<(), NavigationError> {
    let attempts = settings.nav_attempts.max(1);
    let mut attempt = 1;
    loop {
        match page.goto(url, settings.nav_timeout).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= attempts => {
                warn!("[{}] Giving up on {} after {} attempts: {}", site, url, attempt, e);
                return Err(e);
            }
            Err(e) => {
                warn!("[{}] Navigation attempt {}/{} failed: {}", site, attempt, attempts, e);
                Pacing::pause(pacing.retry_backoff).await;
                attempt += 1;
            }
        }
    }
}

/// Walks result pages for one set of parameters
pub struct Paginator<'a> {
    adapter: &'a dyn SiteAdapter,
    settings: &'a SearchSettings,
}

impl<'a> Paginator<'a> {
    pub fn new(adapter: &'a dyn SiteAdapter, settings: &'a SearchSettings) -> Self {
        Self { adapter, settings }
    }

    /// Collect records from page 1 onwards. Page 1 must already be loaded,
    /// its obstacles dismissed and the page known not to be blocked.
    pub async fn paginate(&self, page: &dyn Page, params: &QueryParams) -> PageRun {
        let site = self.adapter.source_name();
        let bound = self.discover_page_bound(page, params).await;

        let mut collected = ListingSet::new();
        let mut pages_visited = 0;
        let mut stop = PaginationStop::Exhausted;

        for page_num in 1..=bound {
            if page_num > 1 {
                Pacing::pause(self.adapter.pacing().inter_page).await;

                let url = self.adapter.construct_search_url(params, page_num);
                info!("[{}] Navigating to page {}/{}: {}", site, page_num, bound, url);
                if let Err(e) = navigate(page, &url, self.settings, self.adapter.pacing(), site).await {
                    warn!("[{}] Skipping page {}: {}", site, page_num, e);
                    continue;
                }
                self.adapter.dismiss_obstacles(page).await;
                if let SearchOutcome::Blocked { details } = self.adapter.classify(page).await {
                    warn!("[{}] Blocked on page {}: {}", site, page_num, details);
                    pages_visited += 1;
                    stop = PaginationStop::Blocked(page_num);
                    break;
                }
            }
            pages_visited += 1;

            let records = self.adapter.extract(page).await;
            let found = records.len();
            let mut new = 0;
            for listing in records {
                if collected.insert(listing) {
                    new += 1;
                }
            }
            info!(
                "[{}] Page {}: {} records ({} new, {} total)",
                site,
                page_num,
                found,
                new,
                collected.len()
            );

            if found == 0 {
                info!("[{}] No records on page {}, stopping", site, page_num);
                stop = PaginationStop::EmptyPage(page_num);
                break;
            }
        }

        PageRun {
            listings: collected.into_vec(),
            pages_visited,
            stop,
        }
    }

    /// Highest page to visit: the largest page number linked from the
    /// current page, capped. 1 when the site has no page parameter or no
    /// links were found.
    async fn discover_page_bound(&self, page: &dyn Page, params: &QueryParams) -> u32 {
        let site = self.adapter.source_name();
        let cap = self.settings.page_cap.max(1);

        if self.adapter.construct_search_url(params, 2) == self.adapter.construct_search_url(params, 1) {
            debug!("[{}] Site has no page parameter, single page only", site);
            return 1;
        }

        let config = self.adapter.config();
        let page_param = config.profile.parameter_name("page").unwrap_or("page");
        let href_re = Regex::new(&format!(r"[?&]{}=(\d+)", regex::escape(page_param))).ok();
        let link_selector = config
            .selectors
            .pagination_link
            .as_deref()
            .unwrap_or(DEFAULT_PAGINATION_LINK);

        let mut highest = 1;
        if let (Some(re), Ok(links)) = (href_re.as_ref(), page.query(link_selector).await) {
            for link in links {
                let number = link
                    .attribute("href")
                    .and_then(|href| re.captures(&href).and_then(|c| c[1].parse::<u32>().ok()));
                if let Some(n) = number {
                    highest = highest.max(n);
                }
            }
        }
        if let Ok(anchors) = page.query("a").await {
            for anchor in anchors {
                if let Some(n) = anchor.text().and_then(|t| t.parse::<u32>().ok()) {
                    if (1..=MAX_LINK_PAGE).contains(&n) {
                        highest = highest.max(n);
                    }
                }
            }
        }

        let bound = highest.min(cap);
        info!("[{}] Detected {} pages, will visit {}", site, highest, bound);
        bound
    }
}
