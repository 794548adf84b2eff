mod criteria;
mod outcome;

pub use criteria::{QueryParams, UserCriteria};
pub use outcome::{AttemptHistory, SearchOutcome};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// Billing period a listing price was quoted in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PricePeriod {
    Weekly,
    Monthly,
    #[default]
    Unknown,
}

/// One rental listing as observed on a results page.
///
/// `url` is the identity key: two records with the same url are the same
/// listing regardless of any other field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub url: String,
    pub title: Option<String>,
    pub price_raw: Option<String>,
    pub price_normalized_monthly: Option<i64>,
    pub price_period: PricePeriod,
    pub location_text: Option<String>,
    /// 0 means studio
    pub bedrooms: Option<u32>,
    pub poster_type_text: Option<String>,
    pub source_site: String,
    pub date_posted: Option<String>,
    pub extra_fields: BTreeMap<String, String>,
    pub scraped_at: DateTime<Utc>,
}

impl Listing {
    /// Start a record for `url`. Returns `None` when the url is blank.
    pub fn new(url: impl Into<String>, source_site: impl Into<String>) -> Option<Self> {
        let url = url.into().trim().to_string();
        if url.is_empty() {
            return None;
        }

        Some(Self {
            url,
            title: None,
            price_raw: None,
            price_normalized_monthly: None,
            price_period: PricePeriod::Unknown,
            location_text: None,
            bedrooms: None,
            poster_type_text: None,
            source_site: source_site.into(),
            date_posted: None,
            extra_fields: BTreeMap::new(),
            scraped_at: Utc::now(),
        })
    }

    /// Set the raw price text. The normalized monthly price and the period
    /// are always recomputed from it.
    pub fn set_price_raw(&mut self, raw: Option<String>) {
        let parsed = raw.as_deref().and_then(NormalizedPrice::parse);
        self.price_normalized_monthly = parsed.map(|p| p.monthly);
        self.price_period = parsed.map(|p| p.period).unwrap_or_default();
        self.price_raw = raw;
    }
}

/// A price amount with its period and monthly equivalent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedPrice {
    pub value: f64,
    pub period: PricePeriod,
    pub monthly: i64,
}

fn currency_amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[£$€]\s*(\d[\d,]*(?:\.\d+)?)").expect("valid price regex"))
}

fn bare_amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d[\d,]*(?:\.\d+)?)").expect("valid amount regex"))
}

fn weekly_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:pw|p/w|per\s+week|week|weekly|wk)\b").expect("valid period regex")
    })
}

impl NormalizedPrice {
    /// Parse text such as "£1,400 pw" or "£1200 pcm".
    ///
    /// Weekly prices are converted with `value * 52 / 12`; anything without a
    /// weekly token is taken as monthly.
    pub fn parse(text: &str) -> Option<Self> {
        let caps = currency_amount_re()
            .captures(text)
            .or_else(|| bare_amount_re().captures(text))?;
        let value: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;

        let period = if weekly_re().is_match(text) {
            PricePeriod::Weekly
        } else {
            PricePeriod::Monthly
        };

        let monthly = match period {
            PricePeriod::Weekly => (value * 52.0 / 12.0).round() as i64,
            _ => value.round() as i64,
        };

        Some(Self {
            value,
            period,
            monthly,
        })
    }
}

fn studio_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bstudio\b").expect("valid studio regex"))
}

fn bedrooms_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d{1,2})\s*-?\s*(?:bed(?:room)?s?|br)\b").expect("valid bedrooms regex")
    })
}

/// Bedroom count from free text: "Studio flat" -> 0, "3 bed house" -> 3.
pub fn parse_bedrooms(text: &str) -> Option<u32> {
    if studio_re().is_match(text) {
        return Some(0);
    }
    bedrooms_re()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Url-keyed accumulator. Re-inserting a url replaces the stored record in
/// place, so the result order is the order urls were first seen.
#[derive(Debug, Default)]
pub struct ListingSet {
    listings: Vec<Listing>,
    positions: HashMap<String, usize>,
}

impl ListingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the url had not been seen before.
    pub fn insert(&mut self, listing: Listing) -> bool {
        match self.positions.get(&listing.url) {
            Some(&pos) => {
                self.listings[pos] = listing;
                false
            }
            None => {
                self.positions.insert(listing.url.clone(), self.listings.len());
                self.listings.push(listing);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn into_vec(self) -> Vec<Listing> {
        self.listings
    }
}

/// Deduplicate by url, last-seen wins.
pub fn merge_by_url<I>(listings: I) -> Vec<Listing>
where
    I: IntoIterator<Item = Listing>,
{
    let mut set = ListingSet::new();
    for listing in listings {
        set.insert(listing);
    }
    set.into_vec()
}
