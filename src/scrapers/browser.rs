use crate::error::NavigationError;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Opens pages on a shared browser context
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn Page>>;
}

/// One browser tab
#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), NavigationError>;

    /// All elements currently matching `selector`
    async fn query(&self, selector: &str) -> Result<Vec<Element>>;

    async fn title(&self) -> Result<String>;

    /// Click the first visible match. `Ok(false)` when nothing matched.
    async fn click(&self, selector: &str) -> Result<bool>;

    async fn press_key(&self, key: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

fn default_visible() -> bool {
    true
}

/// Snapshot of a DOM element taken at query time
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Element {
    html: String,
    text: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
    #[serde(default = "default_visible")]
    visible: bool,
}

impl Element {
    pub fn from_ref(element: ElementRef<'_>, visible: bool) -> Self {
        Self {
            html: element.html(),
            text: element.text().collect::<Vec<_>>().join(" "),
            attributes: element
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            visible,
        }
    }

    /// Whitespace-collapsed text, `None` when empty
    pub fn text(&self) -> Option<String> {
        let text = self.text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Descendants matching `selector`. An invalid selector matches nothing.
    pub fn query(&self, selector: &str) -> Vec<Element> {
        let selector = match Selector::parse(selector) {
            Ok(selector) => selector,
            Err(e) => {
                debug!("Invalid selector '{}': {:?}", selector, e);
                return Vec::new();
            }
        };
        let fragment = Html::parse_fragment(&self.html);
        fragment
            .select(&selector)
            .map(|el| Element::from_ref(el, self.visible && is_rendered(el)))
            .collect()
    }

    pub fn query_first(&self, selector: &str) -> Option<Element> {
        self.query(selector).into_iter().next()
    }
}

/// Static visibility check for parsed markup: the element and its ancestors
/// must not be `hidden` or styled `display:none` / `visibility:hidden`.
pub fn is_rendered(element: ElementRef<'_>) -> bool {
    let chain = std::iter::once(element).chain(element.ancestors().filter_map(ElementRef::wrap));
    for el in chain {
        let value = el.value();
        if value.attr("hidden").is_some() {
            return false;
        }
        if let Some(style) = value.attr("style") {
            let style: String = style
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_lowercase();
            if style.contains("display:none") || style.contains("visibility:hidden") {
                return false;
            }
        }
    }
    true
}

/// Headless Chrome shared by every search of a run
pub struct ChromeBrowser {
    browser: Browser,
}

impl ChromeBrowser {
    pub fn launch(headless: bool) -> Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(headless)
            .window_size(Some((1920, 1080)))
            .idle_browser_timeout(Duration::from_secs(600))
            .args(vec![
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-dev-shm-usage"),
            ])
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        Ok(Self { browser })
    }
}

#[async_trait]
impl BrowserDriver for ChromeBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>> {
        let browser = self.browser.clone();
        let tab = tokio::task::spawn_blocking(move || -> Result<Arc<Tab>> {
            let tab = browser.new_tab()?;
            tab.set_user_agent(USER_AGENT, Some(ACCEPT_LANGUAGE), None)?;
            Ok(tab)
        })
        .await
        .context("browser task panicked")?
        .context("Failed to open tab")?;

        debug!("Opened new tab");
        Ok(Box::new(ChromePage { tab }))
    }
}

const QUERY_SCRIPT: &str = r#"
(() => {
    const nodes = Array.from(document.querySelectorAll(__SELECTOR__));
    return JSON.stringify(nodes.map((el) => {
        const rect = el.getBoundingClientRect();
        const style = window.getComputedStyle(el);
        const attributes = {};
        for (const attr of el.attributes) { attributes[attr.name] = attr.value; }
        return {
            html: el.outerHTML,
            text: el.innerText || el.textContent || "",
            attributes,
            visible: rect.width > 0 && rect.height > 0
                && style.visibility !== "hidden" && style.display !== "none",
        };
    }));
})()
"#;

const CLICK_SCRIPT: &str = r#"
(() => {
    const el = Array.from(document.querySelectorAll(__SELECTOR__)).find((e) => {
        const rect = e.getBoundingClientRect();
        return rect.width > 0 && rect.height > 0;
    });
    if (!el) return false;
    el.click();
    return true;
})()
"#;

fn with_selector(script: &str, selector: &str) -> Result<String> {
    let literal = serde_json::to_string(selector)?;
    Ok(script.replace("__SELECTOR__", &literal))
}

/// A Chrome tab. headless_chrome blocks, so every call runs on the blocking pool.
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
    {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .context("browser task panicked")?
    }
}

#[async_trait]
impl Page for ChromePage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), NavigationError> {
        let target = url.to_string();
        self.blocking(move |tab| {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&target)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
        .map_err(|e| {
            let reason = format!("{:#}", e);
            if reason.to_lowercase().contains("time") {
                NavigationError::Timeout {
                    url: url.to_string(),
                    seconds: timeout.as_secs(),
                }
            } else {
                NavigationError::Failed {
                    url: url.to_string(),
                    reason,
                }
            }
        })
    }

    async fn query(&self, selector: &str) -> Result<Vec<Element>> {
        let script = with_selector(QUERY_SCRIPT, selector)?;
        let raw = self
            .blocking(move |tab| {
                let result = tab.evaluate(&script, false)?;
                Ok(result.value)
            })
            .await?;

        let json = raw
            .as_ref()
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("query '{}' returned no value", selector))?;
        serde_json::from_str(json).with_context(|| format!("bad query result for '{}'", selector))
    }

    async fn title(&self) -> Result<String> {
        self.blocking(|tab| tab.get_title()).await
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        let script = with_selector(CLICK_SCRIPT, selector)?;
        let raw = self
            .blocking(move |tab| {
                let result = tab.evaluate(&script, false)?;
                Ok(result.value)
            })
            .await?;
        Ok(raw.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.blocking(move |tab| {
            tab.press_key(&key)?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        self.blocking(|tab| {
            tab.close(true)?;
            Ok(())
        })
        .await
    }
}
