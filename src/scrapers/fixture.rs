//! In-memory browser for tests: serves canned HTML per url and records
//! every navigation, click and key press.

use super::browser::{is_rendered, BrowserDriver, Element, Page};
use crate::error::NavigationError;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Route {
    html: String,
    failures_left: AtomicUsize,
    stalls: bool,
}

#[derive(Default)]
pub struct FixtureState {
    routes: Mutex<HashMap<String, Arc<Route>>>,
    visits: Mutex<Vec<String>>,
    clicks: Mutex<Vec<String>>,
    keys: Mutex<Vec<String>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct FixtureBrowser {
    state: Arc<FixtureState>,
}

impl FixtureBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &str, html: impl Into<String>) {
        self.flaky_route(url, html, 0);
    }

    /// Fails the first `failures` navigations to `url`
    pub fn flaky_route(&self, url: &str, html: impl Into<String>, failures: usize) {
        self.insert(url, html.into(), failures, false);
    }

    /// Navigation to `url` never completes
    pub fn stalled_route(&self, url: &str) {
        self.insert(url, String::new(), 0, true);
    }

    fn insert(&self, url: &str, html: String, failures: usize, stalls: bool) {
        self.state.routes.lock().unwrap().insert(
            url.to_string(),
            Arc::new(Route {
                html,
                failures_left: AtomicUsize::new(failures),
                stalls,
            }),
        );
    }

    pub fn visits(&self) -> Vec<String> {
        self.state.visits.lock().unwrap().clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.clicks.lock().unwrap().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.keys.lock().unwrap().clone()
    }

    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn page(&self) -> FixturePage {
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        FixturePage {
            state: self.state.clone(),
            current: Mutex::new(String::new()),
        }
    }
}

#[async_trait]
impl BrowserDriver for FixtureBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>> {
        Ok(Box::new(self.page()))
    }
}

pub struct FixturePage {
    state: Arc<FixtureState>,
    current: Mutex<String>,
}

impl FixturePage {
    fn select(&self, selector: &str) -> Result<Vec<Element>> {
        let selector =
            Selector::parse(selector).map_err(|e| anyhow!("bad selector {}: {:?}", selector, e))?;
        let html = self.current.lock().unwrap().clone();
        let document = Html::parse_document(&html);
        let elements = document
            .select(&selector)
            .map(|el| Element::from_ref(el, is_rendered(el)))
            .collect();
        Ok(elements)
    }
}

#[async_trait]
impl Page for FixturePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), NavigationError> {
        self.state.visits.lock().unwrap().push(url.to_string());

        let route = self.state.routes.lock().unwrap().get(url).cloned();
        let Some(route) = route else {
            return Err(NavigationError::Failed {
                url: url.to_string(),
                reason: "404".to_string(),
            });
        };

        if route.stalls {
            std::future::pending::<()>().await;
        }

        let remaining = route.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            route.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(NavigationError::Timeout {
                url: url.to_string(),
                seconds: 0,
            });
        }

        *self.current.lock().unwrap() = route.html.clone();
        Ok(())
    }

    async fn query(&self, selector: &str) -> Result<Vec<Element>> {
        self.select(selector)
    }

    async fn title(&self) -> Result<String> {
        Ok(self
            .select("title")?
            .first()
            .and_then(Element::text)
            .unwrap_or_default())
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        let found = self.select(selector)?.iter().any(Element::is_visible);
        if found {
            self.state.clicks.lock().unwrap().push(selector.to_string());
        }
        Ok(found)
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.state.keys.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Gumtree-shaped result card
pub fn gumtree_card(id: usize, poster: &str, price: &str, beds: &str) -> String {
    format!(
        r#"<article data-q="search-result">
             <a data-q="search-result-anchor" href="/p/property-to-rent/flat-{id}/{id}">
               <div data-q="tile-title">Flat number {id}</div>
               <div data-q="tile-location">Camden, London</div>
               <div data-q="tile-description">
                 <span>{poster}</span>
                 <span>Date available: 01/11/2026</span>
                 <span>Flat</span>
                 <span>{beds}</span>
               </div>
               <div data-testid="price">{price}</div>
               <div data-q="tile-datePosted">2 days ago</div>
             </a>
           </article>"#
    )
}

/// Results page wrapping `cards`, with optional pagination links up to `last_page`
pub fn results_page(cards: &[String], last_page: Option<u32>) -> String {
    let pagination = last_page
        .map(|last| {
            (2..=last)
                .map(|p| format!(r#"<a href="/search?page={p}">{p}</a>"#))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    format!(
        "<html><head><title>Property to rent</title></head><body><main>{}</main><nav>{}</nav></body></html>",
        cards.join("\n"),
        pagination
    )
}
