use super::gumtree::to_map;
use super::search_url::{location_slug, SearchUrlBuilder};
use super::traits::SiteAdapter;
use crate::config::{Pacing, SelectorSet, SiteConfig, SiteProfile};
use crate::error::AdapterError;
use crate::models::QueryParams;
use std::path::Path;

pub const NAME: &str = "OpenRent";

/// OpenRent search. The location goes in the path as a slug and also as
/// the `term` parameter; every listing is from a private landlord.
pub struct OpenRentAdapter {
    config: SiteConfig,
    pacing: Pacing,
}

impl OpenRentAdapter {
    pub fn new(config: SiteConfig, pacing: Pacing) -> Self {
        Self { config, pacing }
    }

    pub fn from_configs_dir(configs_dir: &Path, pacing: Pacing) -> Result<Self, AdapterError> {
        let config = SiteConfig::load(configs_dir, NAME, default_config())?;
        Ok(Self::new(config, pacing))
    }
}

impl SiteAdapter for OpenRentAdapter {
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
        let location = params.text("location").unwrap_or_default();

        let mut base = profile.base_search_url.clone();
        if !location.is_empty() {
            if !base.ends_with('/') {
                base.push('/');
            }
            base.push_str(&location_slug(&location));
        }

        let keywords = params.keywords();
        let term = if keywords.is_empty() {
            location
        } else {
            format!("{} {}", location, keywords.join(" ")).trim().to_string()
        };

        SearchUrlBuilder::new(profile)
            .param("location", Some(term))
            .copy(params, "price_min")
            .copy(params, "price_max")
            .copy(params, "bedrooms_min")
            .page(page_number)
            .build(&base)
    }
}

pub fn default_config() -> SiteConfig {
    SiteConfig {
        profile: SiteProfile {
            base_search_url: "https://www.openrent.co.uk/properties-to-rent/".to_string(),
            base_url_for_relative_paths: Some("https://www.openrent.co.uk".to_string()),
            parameter_names: to_map(&[
                ("location", "term"),
                ("price_min", "minPrice"),
                ("price_max", "maxPrice"),
                ("bedrooms_min", "minBedrooms"),
            ]),
            default_poster_type: Some("Private landlord".to_string()),
            ..Default::default()
        },
        selectors: SelectorSet {
            listing_item_container: Some("a.pli".to_string()),
            listing_title: Some(".banda.pt.listing-title, .listing-title".to_string()),
            listing_price: Some(".pim .price-title, .price-title".to_string()),
            listing_location: Some(".listing-desc .location, .location".to_string()),
            listing_bedrooms: Some("ul.lpc li:first-child".to_string()),
            listing_description_spans: Some("ul.lpc li".to_string()),
            description_span_fields: vec![
                "bedrooms".to_string(),
                "bathrooms".to_string(),
                "max_tenants".to_string(),
            ],
            captcha_indicator: Some(r#"iframe[src*="captcha"], #challenge-form"#.to_string()),
            zero_results_indicator: Some("#noPropertiesMessage, .no-results".to_string()),
            cookie_banner_accept_button: Some(
                r#"#CybotCookiebotDialogBodyLevelButtonLevelOptinAllowAll, button[data-cookie-accept]"#
                    .to_string(),
            ),
            ..Default::default()
        },
    }
}
