use super::{strip_code_fence, Oracle, RefinementAction};
use crate::config::{OracleSettings, SiteProfile};
use crate::error::OracleError;
use crate::models::{AttemptHistory, QueryParams, SearchOutcome, UserCriteria};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

impl Message {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Oracle backed by an OpenAI-compatible chat completions endpoint
pub struct OpenAiOracle {
    http: Client,
    settings: OracleSettings,
    profiles: HashMap<String, SiteProfile>,
}

impl OpenAiOracle {
    pub fn new(settings: OracleSettings) -> Result<Self, OracleError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| OracleError::Config(e.to_string()))?;
        Ok(Self {
            http,
            settings,
            profiles: HashMap::new(),
        })
    }

    /// Site knowledge included in prompts for `site`
    pub fn with_site_profile(mut self, site: &str, profile: SiteProfile) -> Self {
        self.profiles.insert(site.to_lowercase(), profile);
        self
    }

    fn profile(&self, site: &str) -> Option<&SiteProfile> {
        self.profiles.get(&site.to_lowercase())
    }

    async fn chat(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, OracleError> {
        let start = std::time::Instant::now();
        let request = ChatRequest {
            model: &self.settings.model,
            messages,
            temperature,
            max_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/')))
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Api(format!("{}: {}", status, body)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| OracleError::Api("empty completion".to_string()))?;

        debug!(
            model = %self.settings.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "Oracle chat completion"
        );
        Ok(content)
    }

    fn to_pretty_json<T: Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_default()
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn transform(&self, criteria: &UserCriteria, site: &str) -> Option<QueryParams> {
        let raw = criteria.to_query_params();
        let Some(profile) = self.profile(site) else {
            warn!("[{}] No site profile for the oracle, using raw criteria", site);
            return Some(raw);
        };

        let system = format!(
            "You are an assistant optimizing property search criteria for the website '{}'. \
             Use the site profile and the user criteria to produce query parameters. \
             Respond with a single JSON object of parameters and nothing else.",
            site
        );
        let user = format!(
            "User criteria:\n{}\n\nSite profile for {}:\n{}\n\n\
             Return the optimized parameters as a JSON object, keyed by the canonical \
             names used in the user criteria (location, property_type, price_min, price_max, \
             bedrooms_min, keywords, private_only).",
            Self::to_pretty_json(&raw),
            site,
            Self::to_pretty_json(profile)
        );

        let reply = match self
            .chat(vec![Message::system(system), Message::user(user)], 0.1, 1000)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!("[{}] Oracle transform failed, using raw criteria: {}", site, e);
                return Some(raw);
            }
        };

        match serde_json::from_str::<Map<String, Value>>(strip_code_fence(&reply)) {
            Ok(optimized) => {
                let shown = Value::Object(optimized.clone());
                info!("[{}] Oracle suggested parameters: {}", site, shown);
                let mut params = raw;
                params.merge(optimized);
                Some(params)
            }
            Err(e) => {
                warn!("[{}] Oracle transform reply is not a JSON object ({}), using raw criteria", site, e);
                Some(raw)
            }
        }
    }

    async fn refine(
        &self,
        site: &str,
        params: &QueryParams,
        outcome: &SearchOutcome,
        history: &AttemptHistory,
    ) -> Option<RefinementAction> {
        let system = format!(
            "You are an assistant refining a property search on '{}' that did not return \
             listings. Suggest one specific change to the query parameters. Respond with a \
             single JSON object and nothing else.",
            site
        );
        let profile = self
            .profile(site)
            .map(Self::to_pretty_json)
            .unwrap_or_else(|| "{}".to_string());
        let user = format!(
            "Site profile:\n{}\n\nCurrent parameters:\n{}\n\nOutcome:\n{}\n\nAttempt history:\n{}\n\n\
             Valid actions: modify_parameter (parameter, new_value), remove_filter (filter_name), \
             add_keyword (keyword), change_search_strategy (strategy, parameters), \
             stop_attempts (reason).\n\
             Example: {{\"action\": \"remove_filter\", \"filter_name\": \"bedrooms_min\"}}",
            profile,
            Self::to_pretty_json(params),
            Self::to_pretty_json(outcome),
            Self::to_pretty_json(history)
        );

        match self
            .chat(vec![Message::system(system), Message::user(user)], 0.2, 300)
            .await
        {
            Ok(reply) => {
                let action = RefinementAction::parse(&reply);
                if action.is_none() {
                    warn!("[{}] Unusable refinement reply: {}", site, reply);
                }
                action
            }
            Err(e) => {
                warn!("[{}] Oracle refinement failed: {}", site, e);
                None
            }
        }
    }

    async fn expand_location(&self, location: &str) -> Option<Vec<String>> {
        let system = "You map London areas to postcode districts. Respond with a JSON array of \
                      strings and nothing else.";
        let user = format!(
            "List the London postcode districts (like \"NW1\", \"E8\") covering \"{}\".",
            location
        );

        let reply = match self
            .chat(vec![Message::system(system), Message::user(user)], 0.0, 200)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Oracle location expansion failed for {}: {}", location, e);
                return None;
            }
        };
        let districts: Vec<String> = serde_json::from_str::<Vec<String>>(strip_code_fence(&reply))
            .ok()?
            .into_iter()
            .map(|d| d.trim().to_uppercase())
            .filter(|d| !d.is_empty())
            .collect();
        (!districts.is_empty()).then_some(districts)
    }

    async fn matches_keywords(&self, text: &str, keywords: &[String]) -> bool {
        if keywords.is_empty() || text.trim().is_empty() {
            return false;
        }
        let keyword_list = keywords
            .iter()
            .map(|k| format!("'{}'", k))
            .collect::<Vec<_>>()
            .join(", ");
        let user = format!(
            "Does this property listing text match or strongly imply any of: {}? \
             Consider synonyms. Answer YES or NO.\n\n---\n{}\n---",
            keyword_list, text
        );

        match self
            .chat(
                vec![
                    Message::system("You decide semantic matches. Respond with only YES or NO."),
                    Message::user(user),
                ],
                0.0,
                10,
            )
            .await
        {
            Ok(reply) => strip_code_fence(&reply).eq_ignore_ascii_case("yes"),
            Err(e) => {
                debug!("Semantic keyword check failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_oracle() -> OpenAiOracle {
        OpenAiOracle::new(OracleSettings {
            api_key: "test-key".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
        })
        .unwrap()
        .with_site_profile("Gumtree", crate::scrapers::gumtree::default_config().profile)
    }

    #[tokio::test]
    async fn test_unreachable_service_degrades() {
        let oracle = unreachable_oracle();
        let criteria = UserCriteria {
            location: "NW1".to_string(),
            ..Default::default()
        };

        let params = oracle.transform(&criteria, "Gumtree").await;
        assert_eq!(params, Some(criteria.to_query_params()));

        let outcome = SearchOutcome::ZeroResults {
            details: "none".to_string(),
        };
        let action = oracle
            .refine("Gumtree", &criteria.to_query_params(), &outcome, &AttemptHistory::new())
            .await;
        assert_eq!(action, None);

        assert_eq!(oracle.expand_location("north london").await, None);
        assert!(!oracle.matches_keywords("garden flat", &["garden".to_string()]).await);
    }

    /// Answers one chat completion with `content` and returns the base url
    async fn serve_completion(content: &str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
        .to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_transform_merges_suggested_parameters() {
        let base_url = serve_completion(
            "```json\n{\"keywords\": [\"garden\"], \"price_min\": null, \"distance\": 5}\n```",
        )
        .await;
        let oracle = OpenAiOracle::new(OracleSettings {
            api_key: "test-key".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url,
        })
        .unwrap()
        .with_site_profile("Gumtree", crate::scrapers::gumtree::default_config().profile);
        let criteria = UserCriteria {
            location: "NW1".to_string(),
            price_min: Some(1000),
            price_max: Some(2500),
            ..Default::default()
        };

        let params = oracle.transform(&criteria, "Gumtree").await.unwrap();

        assert_ne!(params, criteria.to_query_params());
        assert_eq!(params.keywords(), vec!["garden".to_string()]);
        assert_eq!(params.number("distance"), Some(5));
        assert_eq!(params.number("price_max"), Some(2500));
        assert!(!params.contains("price_min"));
        assert_eq!(params.text("location").as_deref(), Some("NW1"));
    }

    #[test]
    fn test_request_body_shape() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![Message::system("s"), Message::user("u")],
            temperature: 0.2,
            max_tokens: 300,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "u");
        assert_eq!(body["max_tokens"], 300);
    }
}
