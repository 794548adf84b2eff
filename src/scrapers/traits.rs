use super::browser::{BrowserDriver, Page};
use super::{classify, extract, obstacles};
use crate::config::{Pacing, SiteConfig};
use crate::models::{Listing, QueryParams, SearchOutcome};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Common trait for all listing sites.
///
/// Sites differ in URL construction and configuration; extraction,
/// classification and obstacle handling are shared and driven by the
/// site's selector set.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    /// Name of the site, also stored as `source_site` on every listing
    fn source_name(&self) -> &'static str;

    fn config(&self) -> &SiteConfig;

    fn pacing(&self) -> &Pacing;

    /// Search url for `params`. The page parameter is only added for
    /// `page_number > 1`.
    fn construct_search_url(&self, params: &QueryParams, page_number: u32) -> String;

    async fn extract(&self, page: &dyn Page) -> Vec<Listing> {
        extract::extract_listings(page, self.config(), self.source_name()).await
    }

    async fn classify(&self, page: &dyn Page) -> SearchOutcome {
        classify::classify(page, self.config(), self.source_name()).await
    }

    async fn dismiss_obstacles(&self, page: &dyn Page) {
        obstacles::dismiss_obstacles(page, &self.config().selectors, self.pacing(), self.source_name())
            .await
    }

    async fn open(&self, browser: &dyn BrowserDriver) -> Result<Box<dyn Page>> {
        let page = browser.new_page().await?;
        debug!("[{}] Browser page opened", self.source_name());
        Ok(page)
    }

    async fn close(&self, page: &dyn Page) {
        match page.close().await {
            Ok(()) => debug!("[{}] Browser page closed", self.source_name()),
            Err(e) => warn!("[{}] Error closing browser page: {:#}", self.source_name(), e),
        }
    }
}
