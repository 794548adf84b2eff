use crate::error::AdapterError;
use anyhow::Context;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-site URL and parameter knowledge
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SiteProfile {
    pub base_search_url: String,
    /// Prefix for relative listing hrefs
    pub base_url_for_relative_paths: Option<String>,
    /// Canonical parameter name -> the name this site uses in its URLs
    pub parameter_names: BTreeMap<String, String>,
    /// Parameters sent with every search
    pub fixed_parameters: BTreeMap<String, String>,
    /// Seller/advertiser filter values, e.g. "private_only" -> ["private"]
    pub seller_type_options: BTreeMap<String, Vec<String>>,
    pub property_type_mapping: BTreeMap<String, String>,
    /// Poster type assumed when a listing doesn't show one
    pub default_poster_type: Option<String>,
    /// Lowercase phrases in the page title that mean the site errored
    pub error_title_phrases: Vec<String>,
}

impl SiteProfile {
    pub fn parameter_name(&self, canonical: &str) -> Option<&str> {
        self.parameter_names.get(canonical).map(String::as_str)
    }
}

/// Named CSS selectors for every extraction and classification point
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectorSet {
    pub listing_item_container: Option<String>,
    pub listing_details_link: Option<String>,
    pub listing_title: Option<String>,
    pub listing_price: Option<String>,
    pub listing_location: Option<String>,
    pub listing_posted_date: Option<String>,
    pub listing_bedrooms: Option<String>,
    pub listing_poster_type: Option<String>,
    pub listing_description_spans: Option<String>,
    /// Field name for each description span, in order
    pub description_span_fields: Vec<String>,
    pub captcha_indicator: Option<String>,
    pub zero_results_indicator: Option<String>,
    pub cookie_banner_accept_button: Option<String>,
    /// Press Escape when no consent button could be clicked
    pub escape_fallback: bool,
    pub pagination_link: Option<String>,
}

/// Profile and selectors for one adapter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteConfig {
    pub profile: SiteProfile,
    pub selectors: SelectorSet,
}

impl SiteConfig {
    /// Load `<dir>/site_profiles/<site>_profile.json` and
    /// `<dir>/selectors/<site>_selectors.json`.
    ///
    /// A missing file falls back to the built-in default for that half. A
    /// file that exists but can't be read or parsed is an error, as is a
    /// result without a base search url or listing container selector.
    pub fn load(configs_dir: &Path, site: &str, defaults: SiteConfig) -> Result<Self, AdapterError> {
        let key = site.to_lowercase();
        let profile_path = configs_dir
            .join("site_profiles")
            .join(format!("{}_profile.json", key));
        let selectors_path = configs_dir
            .join("selectors")
            .join(format!("{}_selectors.json", key));

        let config = Self {
            profile: load_json_or(&profile_path, defaults.profile)?,
            selectors: load_json_or(&selectors_path, defaults.selectors)?,
        };
        config.validate(site)?;
        Ok(config)
    }

    pub fn validate(&self, site: &str) -> Result<(), AdapterError> {
        if self.profile.base_search_url.trim().is_empty() {
            return Err(AdapterError::Misconfigured {
                site: site.to_string(),
                reason: "site profile has no base_search_url".to_string(),
            });
        }
        let has_container = self
            .selectors
            .listing_item_container
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        if !has_container {
            return Err(AdapterError::Misconfigured {
                site: site.to_string(),
                reason: "no listing_item_container selector configured".to_string(),
            });
        }
        Ok(())
    }
}

fn load_json_or<T: DeserializeOwned>(path: &Path, default: T) -> Result<T, AdapterError> {
    if !path.exists() {
        debug!("{} not found, using built-in defaults", path.display());
        return Ok(default);
    }

    let wrap = |source: anyhow::Error| AdapterError::Config {
        path: path.display().to_string(),
        source,
    };
    let raw = std::fs::read_to_string(path)
        .context("read failed")
        .map_err(wrap)?;
    let value = serde_json::from_str(&raw)
        .context("invalid JSON")
        .map_err(wrap)?;
    info!("Loaded {}", path.display());
    Ok(value)
}

/// Randomised waits between browser actions
#[derive(Debug, Clone, PartialEq)]
pub struct Pacing {
    /// Settle time before looking for obstacles
    pub stabilize: (Duration, Duration),
    /// Delay between result pages
    pub inter_page: (Duration, Duration),
    /// Backoff between navigation retries
    pub retry_backoff: (Duration, Duration),
    /// Wait after clicking a consent button
    pub click_settle: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            stabilize: (Duration::from_secs(2), Duration::from_secs(4)),
            inter_page: (Duration::from_secs(2), Duration::from_secs(5)),
            retry_backoff: (Duration::from_secs(3), Duration::from_secs(6)),
            click_settle: Duration::from_secs(1),
        }
    }
}

impl Pacing {
    /// No waiting at all
    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            stabilize: (Duration::ZERO, Duration::ZERO),
            inter_page: (Duration::ZERO, Duration::ZERO),
            retry_backoff: (Duration::ZERO, Duration::ZERO),
            click_settle: Duration::ZERO,
        }
    }

    /// Sleep for a random duration within `range`
    pub async fn pause(range: (Duration, Duration)) {
        let (min, max) = range;
        let min_ms = min.as_millis() as u64;
        let max_ms = (max.as_millis() as u64).max(min_ms);
        if max_ms == 0 {
            return;
        }
        let ms = rand::thread_rng().gen_range(min_ms..=max_ms);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Bounds for one (site, location) search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSettings {
    /// Full refinement iterations before giving up
    pub max_attempts: usize,
    /// Upper bound on result pages per search
    pub page_cap: u32,
    pub nav_timeout: Duration,
    /// Tries per navigation, including the first
    pub nav_attempts: usize,
    /// (site, location) searches run at the same time
    pub concurrency: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            page_cap: 15,
            nav_timeout: Duration::from_secs(30),
            nav_attempts: 3,
            concurrency: 1,
        }
    }
}

/// Oracle connection settings from the environment
#[derive(Debug, Clone)]
pub struct OracleSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl OracleSettings {
    /// `None` when `OPENAI_API_KEY` is unset or blank
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok()?;
        if api_key.trim().is_empty() {
            warn!("OPENAI_API_KEY is empty, running without oracle");
            return None;
        }
        Some(Self {
            api_key,
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "rental-scout-config-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("site_profiles")).unwrap();
        std::fs::create_dir_all(dir.join("selectors")).unwrap();
        dir
    }

    fn defaults() -> SiteConfig {
        SiteConfig {
            profile: SiteProfile {
                base_search_url: "https://example.test/search".to_string(),
                ..Default::default()
            },
            selectors: SelectorSet {
                listing_item_container: Some("article".to_string()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = scratch_dir("missing");
        let config = SiteConfig::load(&dir, "Example", defaults()).unwrap();
        assert_eq!(config, defaults());
    }

    #[test]
    fn test_selector_file_overrides_defaults() {
        let dir = scratch_dir("override");
        std::fs::write(
            dir.join("selectors/example_selectors.json"),
            r#"{"listing_item_container": "li.result", "escape_fallback": true}"#,
        )
        .unwrap();

        let config = SiteConfig::load(&dir, "Example", defaults()).unwrap();
        assert_eq!(config.selectors.listing_item_container.as_deref(), Some("li.result"));
        assert!(config.selectors.escape_fallback);
        assert_eq!(config.profile, defaults().profile);
    }

    #[test]
    fn test_file_without_container_is_fatal() {
        let dir = scratch_dir("nocontainer");
        std::fs::write(
            dir.join("selectors/example_selectors.json"),
            r#"{"listing_price": ".price"}"#,
        )
        .unwrap();

        let err = SiteConfig::load(&dir, "Example", defaults()).unwrap_err();
        assert!(matches!(err, AdapterError::Misconfigured { .. }));
    }

    #[test]
    fn test_malformed_file_is_fatal() {
        let dir = scratch_dir("malformed");
        std::fs::write(dir.join("site_profiles/example_profile.json"), "{ nope").unwrap();

        let err = SiteConfig::load(&dir, "Example", defaults()).unwrap_err();
        assert!(matches!(err, AdapterError::Config { .. }));
    }
}
