use super::browser::{Element, Page};
use crate::config::SiteConfig;
use crate::models::SearchOutcome;
use tracing::{debug, info, warn};

const DEFAULT_ERROR_PHRASES: &[&str] = &["error", "not found", "problem loading page", "problem finding"];

/// Classify the page currently loaded in `page`.
///
/// Checks run in a fixed order and the first hit wins: visible blocking
/// indicator, visible zero-results indicator, listing containers, page
/// title. Indicators only count when visible; sites keep hidden copies of
/// their captcha and "no results" banners in the DOM.
pub async fn classify(page: &dyn Page, config: &SiteConfig, site: &str) -> SearchOutcome {
    let selectors = &config.selectors;

    if let Some(captcha) = selectors.captcha_indicator.as_deref() {
        if visible_match(page, captcha, site).await {
            info!("[{}] Blocking indicator visible: {}", site, captcha);
            return SearchOutcome::Blocked {
                details: format!("blocking indicator '{}' is visible", captcha),
            };
        }
    }

    if let Some(zero) = selectors.zero_results_indicator.as_deref() {
        if visible_match(page, zero, site).await {
            info!("[{}] Zero results indicator visible: {}", site, zero);
            return SearchOutcome::ZeroResults {
                details: format!("zero results indicator '{}' is visible", zero),
            };
        }
    }

    let Some(container) = selectors.listing_item_container.as_deref() else {
        warn!("[{}] listing_item_container selector is not configured", site);
        return SearchOutcome::Error {
            details: "listing_item_container selector is not configured".to_string(),
        };
    };

    match page.query(container).await {
        Ok(items) if !items.is_empty() => {
            debug!("[{}] Found {} listing items with {}", site, items.len(), container);
            return SearchOutcome::ListingsFound { count: items.len() };
        }
        Ok(_) => {
            return SearchOutcome::ZeroResults {
                details: "no listing items found and no explicit zero results indicator"
                    .to_string(),
            };
        }
        Err(e) => warn!("[{}] Listing container query failed: {:#}", site, e),
    }

    let title = match page.title().await {
        Ok(title) => title,
        Err(e) => {
            return SearchOutcome::Unknown {
                details: format!("could not read page title: {:#}", e),
            }
        }
    };

    if title_signals_error(&title, &config.profile.error_title_phrases) {
        warn!("[{}] Page title indicates error: {}", site, title);
        return SearchOutcome::Error {
            details: format!("page title indicates error: {}", title),
        };
    }

    SearchOutcome::Unknown {
        details: format!("could not determine search outcome (title: {})", title),
    }
}

async fn visible_match(page: &dyn Page, selector: &str, site: &str) -> bool {
    match page.query(selector).await {
        Ok(elements) => {
            let visible = elements.iter().any(Element::is_visible);
            if !visible && !elements.is_empty() {
                debug!("[{}] {} present in DOM but hidden", site, selector);
            }
            visible
        }
        Err(e) => {
            debug!("[{}] Indicator query '{}' failed: {:#}", site, selector, e);
            false
        }
    }
}

fn title_signals_error(title: &str, phrases: &[String]) -> bool {
    let title = title.to_lowercase();
    if phrases.is_empty() {
        DEFAULT_ERROR_PHRASES.iter().any(|p| title.contains(p))
    } else {
        phrases.iter().any(|p| title.contains(&p.to_lowercase()))
    }
}
