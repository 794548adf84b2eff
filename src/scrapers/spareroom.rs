use super::gumtree::to_map;
use super::search_url::SearchUrlBuilder;
use super::traits::SiteAdapter;
use crate::config::{Pacing, SelectorSet, SiteConfig, SiteProfile};
use crate::error::AdapterError;
use crate::models::QueryParams;
use std::collections::BTreeMap;
use std::path::Path;

pub const NAME: &str = "SpareRoom";

/// SpareRoom whole-property search. Location and keywords share a single
/// free-text parameter.
pub struct SpareRoomAdapter {
    config: SiteConfig,
    pacing: Pacing,
}

impl SpareRoomAdapter {
    pub fn new(config: SiteConfig, pacing: Pacing) -> Self {
        Self { config, pacing }
    }

    pub fn from_configs_dir(configs_dir: &Path, pacing: Pacing) -> Result<Self, AdapterError> {
        let config = SiteConfig::load(configs_dir, NAME, default_config())?;
        Ok(Self::new(config, pacing))
    }
}

impl SiteAdapter for SpareRoomAdapter {
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

        let mut terms: Vec<String> = params.text("location").into_iter().collect();
        terms.extend(params.keywords());
        let search = terms.join(" ");

        SearchUrlBuilder::new(profile)
            .param("location", Some(search))
            .copy(params, "price_min")
            .copy(params, "price_max")
            .copy(params, "bedrooms_min")
            .property_type(params)
            .seller_type(params, "private_landlords")
            .page(page_number)
            .build(&profile.base_search_url)
    }
}

pub fn default_config() -> SiteConfig {
    SiteConfig {
        profile: SiteProfile {
            base_search_url: "https://www.spareroom.co.uk/flatshare/search.pl".to_string(),
            base_url_for_relative_paths: Some("https://www.spareroom.co.uk".to_string()),
            parameter_names: to_map(&[
                ("location", "search"),
                ("price_min", "min_rent"),
                ("price_max", "max_rent"),
                ("bedrooms_min", "min_beds"),
                ("property_type", "showme_buildingtype"),
                ("seller_type", "showme_advertiser"),
            ]),
            fixed_parameters: to_map(&[
                ("flatshare_type", "offered"),
                ("per", "pcm"),
                ("search_by", "whole_property"),
            ]),
            seller_type_options: BTreeMap::from([(
                "private_only".to_string(),
                vec!["private_landlords".to_string(), "live_in_landlords".to_string()],
            )]),
            property_type_mapping: to_map(&[("flat", "flat"), ("house", "house")]),
            error_title_phrases: vec!["error".to_string(), "page not found".to_string()],
            ..Default::default()
        },
        selectors: SelectorSet {
            listing_item_container: Some("li.listing-result".to_string()),
            listing_details_link: Some("a[data-detail-url], article a[href]".to_string()),
            listing_title: Some("h2".to_string()),
            listing_price: Some("strong.listingPrice".to_string()),
            listing_location: Some("span.listingLocation".to_string()),
            listing_posted_date: Some(".listing-result__dates".to_string()),
            listing_poster_type: Some(".listingAdvertiser, .advertiser".to_string()),
            captcha_indicator: Some(r#"iframe[src*="captcha"], .g-recaptcha"#.to_string()),
            zero_results_indicator: Some(".noResults, #no-results".to_string()),
            cookie_banner_accept_button: Some("#onetrust-accept-btn-handler".to_string()),
            escape_fallback: true,
            ..Default::default()
        },
    }
}
