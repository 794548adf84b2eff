use super::browser::{Element, Page};
use crate::config::{SiteConfig, SiteProfile};
use crate::models::{parse_bedrooms, Listing};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};
use url::Url;

fn inline_price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)£\s*[\d,]+(?:\.\d{2})?\s*(?:pcm|per month|pw|per week)")
            .expect("valid inline price regex")
    })
}

/// Extract every listing card on the current page.
///
/// Field extraction is best effort: a card only needs a link to produce a
/// record, anything else that is missing or unparsable is left empty.
pub async fn extract_listings(page: &dyn Page, config: &SiteConfig, site: &str) -> Vec<Listing> {
    let Some(container) = config.selectors.listing_item_container.as_deref() else {
        warn!("[{}] No listing container selector, nothing to extract", site);
        return Vec::new();
    };

    let cards = match page.query(container).await {
        Ok(cards) => cards,
        Err(e) => {
            warn!("[{}] Listing container query failed: {:#}", site, e);
            return Vec::new();
        }
    };
    debug!("[{}] Found {} potential listing elements", site, cards.len());

    let mut listings = Vec::with_capacity(cards.len());
    for (idx, card) in cards.iter().enumerate() {
        match extract_card(card, config, site) {
            Some(listing) => listings.push(listing),
            None => debug!("[{}] Skipped card {}: no usable link", site, idx + 1),
        }
    }
    listings
}

/// Build one record from a listing card. `None` when the card has no link.
pub fn extract_card(card: &Element, config: &SiteConfig, site: &str) -> Option<Listing> {
    let selectors = &config.selectors;

    let href = match selectors.listing_details_link.as_deref() {
        Some(sel) => card.query_first(sel).and_then(|a| a.attribute("href")),
        None => card
            .attribute("href")
            .or_else(|| card.query_first("a[href]").and_then(|a| a.attribute("href"))),
    }?;
    let url = resolve_url(&config.profile, &href)?;
    let mut listing = Listing::new(url, site)?;

    listing.title = field_text(card, selectors.listing_title.as_deref());
    listing.location_text = field_text(card, selectors.listing_location.as_deref());
    listing.date_posted = field_text(card, selectors.listing_posted_date.as_deref());
    listing.poster_type_text = field_text(card, selectors.listing_poster_type.as_deref());
    let mut beds_text = field_text(card, selectors.listing_bedrooms.as_deref());

    if let Some(spans) = selectors.listing_description_spans.as_deref() {
        for (i, span) in card.query(spans).iter().enumerate() {
            let Some(text) = span.text() else { continue };
            let name = selectors
                .description_span_fields
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("description_{}", i + 1));
            apply_span(&mut listing, &mut beds_text, &name, text);
        }
    }

    let price = field_text(card, selectors.listing_price.as_deref()).or_else(|| {
        card.text()
            .and_then(|text| inline_price_re().find(&text).map(|m| m.as_str().to_string()))
    });
    listing.set_price_raw(price);

    listing.bedrooms = beds_text
        .as_deref()
        .and_then(parse_bedrooms)
        .or_else(|| listing.title.as_deref().and_then(parse_bedrooms));

    if listing.poster_type_text.is_none() {
        listing.poster_type_text = config.profile.default_poster_type.clone();
    }

    Some(listing)
}

fn field_text(card: &Element, selector: Option<&str>) -> Option<String> {
    card.query_first(selector?)?.text()
}

fn apply_span(listing: &mut Listing, beds_text: &mut Option<String>, name: &str, text: String) {
    match name {
        "poster_type" => {
            listing.poster_type_text.get_or_insert(text);
        }
        "bedrooms" | "beds" => {
            beds_text.get_or_insert(text);
        }
        "date_posted" => {
            listing.date_posted.get_or_insert(text);
        }
        "location" => {
            listing.location_text.get_or_insert(text);
        }
        "title" => {
            listing.title.get_or_insert(text);
        }
        other => {
            listing
                .extra_fields
                .insert(other.to_string(), strip_label(&text).to_string());
        }
    }
}

/// "Date available: 01/11" -> "01/11"
fn strip_label(text: &str) -> &str {
    match text.split_once(':') {
        Some((label, value))
            if label.len() <= 30 && !label.chars().any(|c| c.is_ascii_digit()) =>
        {
            value.trim()
        }
        _ => text,
    }
}

/// Absolute listing url for `href`, relative paths resolved against the profile
pub fn resolve_url(profile: &SiteProfile, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }

    let base = profile
        .base_url_for_relative_paths
        .as_deref()
        .unwrap_or(&profile.base_search_url);
    Url::parse(base)
        .and_then(|base| base.join(href))
        .map(String::from)
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PricePeriod;
    use crate::scrapers::fixture::{gumtree_card, results_page, FixtureBrowser};
    use crate::scrapers::gumtree;
    use std::time::Duration;

    #[tokio::test]
    async fn test_extracts_gumtree_cards() {
        let browser = FixtureBrowser::new();
        let cards = vec![
            gumtree_card(1, "Private", "£1,400 pw", "2 beds"),
            gumtree_card(2, "Agency", "£1200 pcm", "Studio"),
        ];
        browser.route("https://fixture/1", results_page(&cards, None));
        let page = browser.page();
        page.goto("https://fixture/1", Duration::from_secs(1)).await.unwrap();

        let listings = extract_listings(&page, &gumtree::default_config(), "Gumtree").await;
        assert_eq!(listings.len(), 2);

        let first = &listings[0];
        assert_eq!(first.url, "https://www.gumtree.com/p/property-to-rent/flat-1/1");
        assert_eq!(first.title.as_deref(), Some("Flat number 1"));
        assert_eq!(first.poster_type_text.as_deref(), Some("Private"));
        assert_eq!(first.price_normalized_monthly, Some(6067));
        assert_eq!(first.price_period, PricePeriod::Weekly);
        assert_eq!(first.bedrooms, Some(2));
        assert_eq!(first.location_text.as_deref(), Some("Camden, London"));
        assert_eq!(first.date_posted.as_deref(), Some("2 days ago"));
        assert_eq!(first.extra_fields.get("date_available").map(String::as_str), Some("01/11/2026"));
        assert_eq!(first.extra_fields.get("property_type").map(String::as_str), Some("Flat"));

        assert_eq!(listings[1].bedrooms, Some(0));
        assert_eq!(listings[1].price_normalized_monthly, Some(1200));
    }

    #[tokio::test]
    async fn test_card_without_link_is_skipped_and_bad_fields_degrade() {
        let browser = FixtureBrowser::new();
        let html = results_page(
            &[
                r#"<article data-q="search-result"><div data-q="tile-title">No link</div></article>"#
                    .to_string(),
                r#"<article data-q="search-result">
                     <a data-q="search-result-anchor" href="https://www.gumtree.com/p/9">x</a>
                     <div data-testid="price">Ask for price</div>
                     <div data-q="tile-title">Lovely home</div>
                   </article>"#
                    .to_string(),
            ],
            None,
        );
        browser.route("https://fixture/1", html);
        let page = browser.page();
        page.goto("https://fixture/1", Duration::from_secs(1)).await.unwrap();

        let listings = extract_listings(&page, &gumtree::default_config(), "Gumtree").await;
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].price_raw.as_deref(), Some("Ask for price"));
        assert_eq!(listings[0].price_normalized_monthly, None);
        assert_eq!(listings[0].bedrooms, None);
        assert!(listings[0].poster_type_text.is_none());
    }

    #[test]
    fn test_resolve_url() {
        let profile = SiteProfile {
            base_search_url: "https://www.openrent.co.uk/properties-to-rent/".to_string(),
            base_url_for_relative_paths: Some("https://www.openrent.co.uk".to_string()),
            ..Default::default()
        };
        assert_eq!(
            resolve_url(&profile, "/property-to-rent/london/123").as_deref(),
            Some("https://www.openrent.co.uk/property-to-rent/london/123")
        );
        assert_eq!(
            resolve_url(&profile, "https://other.example/x").as_deref(),
            Some("https://other.example/x")
        );
        assert_eq!(resolve_url(&profile, "#"), None);
    }

    #[test]
    fn test_strip_label() {
        assert_eq!(strip_label("Date available: 01/11/2026"), "01/11/2026");
        assert_eq!(strip_label("12:30 today"), "12:30 today");
    }
}
