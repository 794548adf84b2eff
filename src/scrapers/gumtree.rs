use super::search_url::SearchUrlBuilder;
use super::traits::SiteAdapter;
use crate::config::{Pacing, SelectorSet, SiteConfig, SiteProfile};
use crate::error::AdapterError;
use crate::models::QueryParams;
use std::collections::BTreeMap;
use std::path::Path;

pub const NAME: &str = "Gumtree";

/// Gumtree property-to-rent search
pub struct GumtreeAdapter {
    config: SiteConfig,
    pacing: Pacing,
}

impl GumtreeAdapter {
    pub fn new(config: SiteConfig, pacing: Pacing) -> Self {
        Self { config, pacing }
    }

    /// Load configuration from `configs_dir`, falling back to the built-in
    /// defaults for files that don't exist
    pub fn from_configs_dir(configs_dir: &Path, pacing: Pacing) -> Result<Self, AdapterError> {
        let config = SiteConfig::load(configs_dir, NAME, default_config())?;
        Ok(Self::new(config, pacing))
    }
}

impl SiteAdapter for GumtreeAdapter {
    fn source_name(&self) -> &'static str {
        NAME
    }

    fn config(&self) -> &SiteConfig {
        &self.config
    }

    fn pacing(&self) -> &Pacing {
        &self.pacing
    }

    fn construct_search_url(&self, params: &QueryParams, page_number: u32) -> String {
        let profile = &self.config.profile;
        let keywords = params.keywords();

        SearchUrlBuilder::new(profile)
            .copy(params, "location")
            .param("keywords", (!keywords.is_empty()).then(|| keywords.join(" ")))
            .copy(params, "price_min")
            .copy(params, "price_max")
            .copy(params, "bedrooms_min")
            .property_type(params)
            .seller_type(params, "private")
            .page(page_number)
            .build(&profile.base_search_url)
    }
}

pub fn default_config() -> SiteConfig {
    let names = [
        ("location", "search_location"),
        ("keywords", "q"),
        ("price_min", "min_price"),
        ("price_max", "max_price"),
        ("bedrooms_min", "min_property_number_beds"),
        ("property_type", "property_type"),
        ("seller_type", "seller_type"),
        ("page", "page"),
    ];

    SiteConfig {
        profile: SiteProfile {
            base_search_url: "https://www.gumtree.com/search".to_string(),
            base_url_for_relative_paths: Some("https://www.gumtree.com".to_string()),
            parameter_names: to_map(&names),
            fixed_parameters: to_map(&[("search_category", "property-to-rent"), ("distance", "3")]),
            seller_type_options: BTreeMap::from([
                ("private_only".to_string(), vec!["private".to_string()]),
                ("agency".to_string(), vec!["trade".to_string()]),
            ]),
            property_type_mapping: to_map(&[("flat", "flat"), ("house", "house"), ("studio", "studio")]),
            default_poster_type: None,
            error_title_phrases: Vec::new(),
        },
        selectors: SelectorSet {
            listing_item_container: Some(r#"article[data-q="search-result"]"#.to_string()),
            listing_details_link: Some(r#"a[data-q="search-result-anchor"]"#.to_string()),
            listing_title: Some(r#"div[data-q="tile-title"]"#.to_string()),
            listing_price: Some(r#"div[data-testid="price"]"#.to_string()),
            listing_location: Some(r#"div[data-q="tile-location"]"#.to_string()),
            listing_posted_date: Some(r#"div[data-q="tile-datePosted"]"#.to_string()),
            listing_bedrooms: None,
            listing_poster_type: None,
            listing_description_spans: Some(r#"div[data-q="tile-description"] span"#.to_string()),
            description_span_fields: ["poster_type", "date_available", "property_type", "bedrooms"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            captcha_indicator: Some(r#"iframe[src*="captcha"], div.g-recaptcha, #px-captcha"#.to_string()),
            zero_results_indicator: Some(r#"[data-q="zero-results"]"#.to_string()),
            cookie_banner_accept_button: Some("#onetrust-accept-btn-handler".to_string()),
            escape_fallback: true,
            pagination_link: Some(r#"a[href*="page="]"#.to_string()),
        },
    }
}

pub(crate) fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> GumtreeAdapter {
        GumtreeAdapter::new(default_config(), Pacing::none())
    }

    #[test]
    fn test_search_url_first_page_has_no_page_parameter() {
        let mut params = QueryParams::new();
        params.set("location", "NW1");
        params.set("price_max", 2500);
        params.set("private_only", true);

        let url = adapter().construct_search_url(&params, 1);
        assert_eq!(
            url,
            "https://www.gumtree.com/search?distance=3&search_category=property-to-rent\
             &search_location=NW1&max_price=2500&seller_type=private"
        );
    }

    #[test]
    fn test_search_url_later_pages() {
        let mut params = QueryParams::new();
        params.set("location", "Camden");
        params.add_keyword("garden");
        params.add_keyword("balcony");

        let url = adapter().construct_search_url(&params, 4);
        assert!(url.contains("search_location=Camden"));
        assert!(url.contains("q=garden+balcony"));
        assert!(url.ends_with("&page=4"));
        assert!(!url.contains("seller_type"));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(default_config().validate(NAME).is_ok());
    }
}
