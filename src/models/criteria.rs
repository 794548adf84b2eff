use crate::error::CriteriaError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

fn default_true() -> bool {
    true
}

/// Search criteria as entered by the user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserCriteria {
    /// Area, borough or postcode prefix to search in
    pub location: String,
    /// Flat, house, studio...
    pub property_type: Option<String>,
    /// Minimum monthly rent
    pub price_min: Option<u32>,
    /// Maximum monthly rent
    pub price_max: Option<u32>,
    /// Minimum number of bedrooms
    pub bedrooms_min: Option<u32>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub private_only: bool,
    #[serde(default = "default_true")]
    pub exclude_agents: bool,
}

impl Default for UserCriteria {
    fn default() -> Self {
        Self {
            location: "London".to_string(),
            property_type: None,
            price_min: None,
            price_max: None,
            bedrooms_min: None,
            keywords: Vec::new(),
            private_only: false,
            exclude_agents: true,
        }
    }
}

impl UserCriteria {
    pub fn validate(&self) -> Result<(), CriteriaError> {
        if self.location.trim().is_empty() {
            return Err(CriteriaError::EmptyLocation);
        }
        if let (Some(min), Some(max)) = (self.price_min, self.price_max) {
            if min > max {
                return Err(CriteriaError::PriceRange { min, max });
            }
        }
        Ok(())
    }

    /// Same criteria, different location
    pub fn for_location(&self, location: &str) -> Self {
        Self {
            location: location.to_string(),
            ..self.clone()
        }
    }

    /// Canonical query parameters, used as-is when no oracle is configured.
    pub fn to_query_params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        params.set("location", self.location.clone());
        if let Some(property_type) = &self.property_type {
            params.set("property_type", property_type.clone());
        }
        if let Some(min) = self.price_min {
            params.set("price_min", min);
        }
        if let Some(max) = self.price_max {
            params.set("price_max", max);
        }
        if let Some(beds) = self.bedrooms_min {
            params.set("bedrooms_min", beds);
        }
        if !self.keywords.is_empty() {
            params.set("keywords", self.keywords.clone());
        }
        params.set("private_only", self.private_only);
        params.set("exclude_agents", self.exclude_agents);
        params
    }
}

/// Site query parameters, keyed by canonical name.
///
/// Values stay as JSON because the oracle may hand back strings where
/// numbers were sent and vice versa; the typed getters accept both.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct QueryParams(BTreeMap<String, Value>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Non-empty text value. Numbers are rendered, null and "" are absent.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.to_lowercase().as_str(), "true" | "yes" | "1"),
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            _ => false,
        }
    }

    /// Keywords as a list whether they were stored as an array or a string
    pub fn keywords(&self) -> Vec<String> {
        match self.0.get("keywords") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        }
    }

    /// Append a keyword unless it is already present (case-insensitive)
    pub fn add_keyword(&mut self, keyword: &str) -> bool {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return false;
        }
        let mut keywords = self.keywords();
        if keywords.iter().any(|k| k.eq_ignore_ascii_case(keyword)) {
            return false;
        }
        keywords.push(keyword.to_string());
        self.set("keywords", keywords);
        true
    }

    /// Overlay `other` on top of these parameters. Null values remove keys.
    pub fn merge(&mut self, other: Map<String, Value>) {
        for (key, value) in other {
            if value.is_null() {
                self.0.remove(&key);
            } else {
                self.0.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
impl QueryParams {
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn number(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}
