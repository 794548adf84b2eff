use crate::config::SiteProfile;
use crate::models::QueryParams;
use url::form_urlencoded;

/// Collects query pairs for a search url using the profile's parameter
/// names. Canonical parameters the profile doesn't name are dropped.
pub struct SearchUrlBuilder<'a> {
    profile: &'a SiteProfile,
    pairs: Vec<(String, String)>,
}

impl<'a> SearchUrlBuilder<'a> {
    /// Starts with the profile's fixed parameters
    pub fn new(profile: &'a SiteProfile) -> Self {
        let pairs = profile
            .fixed_parameters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self { profile, pairs }
    }

    /// Add `value` under the site's name for `canonical`
    pub fn param(&mut self, canonical: &str, value: Option<String>) -> &mut Self {
        if let (Some(name), Some(value)) = (self.profile.parameter_name(canonical), value) {
            if !value.is_empty() {
                self.set(name, value);
            }
        }
        self
    }

    /// Copy a numeric or text parameter straight from `params`
    pub fn copy(&mut self, params: &QueryParams, canonical: &str) -> &mut Self {
        self.param(canonical, params.text(canonical))
    }

    /// Seller/advertiser filter: private-only maps through the profile's
    /// options, otherwise an explicit `seller_type` is passed through.
    pub fn seller_type(&mut self, params: &QueryParams, default_private: &str) -> &mut Self {
        let value = if params.flag("private_only") {
            let options = self
                .profile
                .seller_type_options
                .get("private_only")
                .filter(|values| !values.is_empty())
                .map(|values| values.join(","));
            Some(options.unwrap_or_else(|| default_private.to_string()))
        } else {
            params.text("seller_type")
        };
        self.param("seller_type", value)
    }

    pub fn property_type(&mut self, params: &QueryParams) -> &mut Self {
        let value = params.text("property_type").map(|raw| {
            self.profile
                .property_type_mapping
                .get(&raw.to_lowercase())
                .cloned()
                .unwrap_or(raw)
        });
        self.param("property_type", value)
    }

    pub fn page(&mut self, page_number: u32) -> &mut Self {
        if page_number > 1 {
            self.param("page", Some(page_number.to_string()));
        }
        self
    }

    /// Insert or replace a raw pair
    pub fn set(&mut self, name: &str, value: String) -> &mut Self {
        match self.pairs.iter_mut().find(|(k, _)| k == name) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((name.to_string(), value)),
        }
        self
    }

    pub fn build(&self, base: &str) -> String {
        if self.pairs.is_empty() {
            return base.to_string();
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish();
        let separator = if base.contains('?') { '&' } else { '?' };
        format!("{}{}{}", base, separator, query)
    }
}

/// Lowercase, dash-separated, percent-encoded path segment
pub fn location_slug(location: &str) -> String {
    let slug = location
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    form_urlencoded::byte_serialize(slug.as_bytes()).collect()
}
