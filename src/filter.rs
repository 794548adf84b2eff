use crate::models::{Listing, UserCriteria};
use crate::oracle::Oracle;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, info};

/// Poster names containing any of these are most likely companies
const AGENT_KEYWORDS: &[&str] = &[
    "lettings",
    "estate agent",
    "estates",
    "property management",
    "properties",
    "management services",
    "lettings negotiator",
    "lettings manager",
    "real estate",
    "realty",
    "associates",
    "partners",
    "group",
    "limited",
    "ltd",
    "plc",
    "developments",
    "investments",
    "lettings co",
    "property co",
    "housing association",
];

fn agent_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:agent|agents|agency|agencies)\b").expect("valid agent regex"))
}

fn company_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:lettings|estates|properties|management)\b").expect("valid company regex")
    })
}

fn private_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:private|landlord|landlords)\b").expect("valid private regex"))
}

/// A listing with the poster flags used by the filters and the output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlaggedListing {
    #[serde(flatten)]
    pub listing: Listing,
    pub is_agent_flagged: bool,
    pub is_private_landlord_guess: bool,
}

impl FlaggedListing {
    pub fn new(listing: Listing) -> Self {
        let (is_agent_flagged, is_private_landlord_guess) =
            classify_poster(listing.poster_type_text.as_deref());
        Self {
            listing,
            is_agent_flagged,
            is_private_landlord_guess,
        }
    }
}

/// `(agent, private)` guess from the poster text. Agent signals win, so
/// both are never true.
pub fn classify_poster(poster: Option<&str>) -> (bool, bool) {
    let Some(poster) = poster else {
        return (false, false);
    };
    let text = poster.to_lowercase();
    if agent_word_re().is_match(&text)
        || company_word_re().is_match(&text)
        || AGENT_KEYWORDS.iter().any(|k| text.contains(k))
    {
        return (true, false);
    }
    (false, private_word_re().is_match(&text))
}

/// Applies the user's criteria to extracted listings
pub struct ListingFilter<'a> {
    criteria: &'a UserCriteria,
    oracle: &'a dyn Oracle,
}

impl<'a> ListingFilter<'a> {
    pub fn new(criteria: &'a UserCriteria, oracle: &'a dyn Oracle) -> Self {
        Self { criteria, oracle }
    }

    pub async fn apply(&self, listings: Vec<Listing>) -> Vec<FlaggedListing> {
        let total = listings.len();
        let mut kept = Vec::with_capacity(total);

        for listing in listings {
            let flagged = FlaggedListing::new(listing);
            if let Some(reason) = self.rejection(&flagged).await {
                debug!("Dropping {}: {}", flagged.listing.url, reason);
                continue;
            }
            kept.push(flagged);
        }

        info!("Filtering kept {} of {} listings", kept.len(), total);
        kept
    }

    /// Why `flagged` doesn't meet the criteria, if it doesn't
    async fn rejection(&self, flagged: &FlaggedListing) -> Option<&'static str> {
        let criteria = self.criteria;
        let listing = &flagged.listing;

        if criteria.private_only && !flagged.is_private_landlord_guess {
            return Some("not a private landlord");
        }
        if !criteria.private_only
            && criteria.exclude_agents
            && flagged.is_agent_flagged
            && !flagged.is_private_landlord_guess
        {
            return Some("posted by an agent");
        }

        if let (Some(max), Some(price)) = (criteria.price_max, listing.price_normalized_monthly) {
            if price > i64::from(max) {
                return Some("above maximum price");
            }
        }
        if let (Some(min), Some(beds)) = (criteria.bedrooms_min, listing.bedrooms) {
            if beds < min {
                return Some("too few bedrooms");
            }
        }

        if !criteria.keywords.is_empty() && !self.matches_keywords(listing).await {
            return Some("no keyword match");
        }
        None
    }

    async fn matches_keywords(&self, listing: &Listing) -> bool {
        let text = [listing.title.as_deref(), listing.location_text.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        let haystack = text.to_lowercase();
        if self
            .criteria
            .keywords
            .iter()
            .any(|k| haystack.contains(&k.to_lowercase()))
        {
            return true;
        }
        self.oracle.is_enabled() && self.oracle.matches_keywords(&text, &self.criteria.keywords).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::NoOracle;

    fn listing(id: u32, poster: Option<&str>) -> Listing {
        let mut listing = Listing::new(format!("https://example.test/{}", id), "Gumtree").unwrap();
        listing.title = Some(format!("Flat {}", id));
        listing.poster_type_text = poster.map(str::to_string);
        listing
    }

    fn urls(flagged: &[FlaggedListing]) -> Vec<String> {
        flagged.iter().map(|f| f.listing.url.clone()).collect()
    }

    #[test]
    fn test_classify_poster() {
        assert_eq!(classify_poster(Some("Private")), (false, true));
        assert_eq!(classify_poster(Some("Private landlord")), (false, true));
        assert_eq!(classify_poster(Some("Agency")), (true, false));
        assert_eq!(classify_poster(Some("XYZ Lettings Ltd")), (true, false));
        assert_eq!(classify_poster(Some("Camden Management")), (true, false));
        assert_eq!(classify_poster(Some("Smith Property Co")), (true, false));
        assert_eq!(classify_poster(Some("Lettings Negotiator")), (true, false));
        assert_eq!(classify_poster(Some("John")), (false, false));
        assert_eq!(classify_poster(None), (false, false));
    }

    fn sample() -> Vec<Listing> {
        vec![
            listing(1, Some("Private")),
            listing(2, Some("Agency")),
            listing(3, None),
        ]
    }

    #[tokio::test]
    async fn test_exclude_agents_keeps_unknown_posters() {
        let criteria = UserCriteria {
            exclude_agents: true,
            ..Default::default()
        };
        let kept = ListingFilter::new(&criteria, &NoOracle).apply(sample()).await;
        assert_eq!(urls(&kept), vec!["https://example.test/1", "https://example.test/3"]);
    }

    #[tokio::test]
    async fn test_private_only_keeps_only_private_guesses() {
        let criteria = UserCriteria {
            private_only: true,
            exclude_agents: false,
            ..Default::default()
        };
        let kept = ListingFilter::new(&criteria, &NoOracle).apply(sample()).await;
        assert_eq!(urls(&kept), vec!["https://example.test/1"]);
        assert!(kept[0].is_private_landlord_guess);
    }

    #[tokio::test]
    async fn test_no_poster_filters_keep_everything_flagged() {
        let criteria = UserCriteria {
            exclude_agents: false,
            ..Default::default()
        };
        let kept = ListingFilter::new(&criteria, &NoOracle).apply(sample()).await;
        assert_eq!(kept.len(), 3);
        assert!(kept[1].is_agent_flagged);
    }

    #[tokio::test]
    async fn test_price_bedroom_and_keyword_filters() {
        let mut cheap = listing(1, Some("Private"));
        cheap.set_price_raw(Some("£1,500 pcm".to_string()));
        cheap.bedrooms = Some(2);
        cheap.title = Some("Garden flat".to_string());

        let mut pricey = listing(2, Some("Private"));
        pricey.set_price_raw(Some("£900 pw".to_string()));
        pricey.title = Some("Garden penthouse".to_string());

        let mut small = listing(3, Some("Private"));
        small.bedrooms = Some(0);
        small.title = Some("Garden studio".to_string());

        let mut plain = listing(4, Some("Private"));
        plain.title = Some("Top floor flat".to_string());

        let criteria = UserCriteria {
            price_max: Some(2500),
            bedrooms_min: Some(1),
            keywords: vec!["GARDEN".to_string()],
            ..Default::default()
        };
        let kept = ListingFilter::new(&criteria, &NoOracle)
            .apply(vec![cheap, pricey, small, plain])
            .await;
        assert_eq!(urls(&kept), vec!["https://example.test/1"]);
    }

    #[test]
    fn test_flags_flatten_into_record_json() {
        let flagged = FlaggedListing::new(listing(1, Some("Private")));
        let value = serde_json::to_value(&flagged).unwrap();
        assert_eq!(value["url"], "https://example.test/1");
        assert_eq!(value["is_private_landlord_guess"], true);
        assert_eq!(value["is_agent_flagged"], false);
    }
}
