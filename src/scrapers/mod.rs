pub mod browser;
pub mod classify;
pub mod extract;
#[cfg(test)]
pub mod fixture;
pub mod gumtree;
pub mod obstacles;
pub mod openrent;
pub mod pagination;
pub mod refine;
pub mod search_url;
pub mod spareroom;
pub mod traits;

pub use browser::{BrowserDriver, ChromeBrowser};
pub use gumtree::GumtreeAdapter;
pub use openrent::OpenRentAdapter;
pub use refine::{RefinementLoop, SearchReport, StopReason, Termination};
pub use spareroom::SpareRoomAdapter;
pub use traits::SiteAdapter;

use crate::config::Pacing;
use crate::error::AdapterError;
use std::path::Path;

/// Sites with a built-in adapter
pub const KNOWN_SITES: &[&str] = &[gumtree::NAME, openrent::NAME, spareroom::NAME];

/// Build the adapter for `site` (case-insensitive)
pub fn adapter_for(site: &str, configs_dir: &Path, pacing: Pacing) -> Result<Box<dyn SiteAdapter>, AdapterError> {
    match site.trim().to_lowercase().as_str() {
        "gumtree" => Ok(Box::new(GumtreeAdapter::from_configs_dir(configs_dir, pacing)?)),
        "openrent" => Ok(Box::new(OpenRentAdapter::from_configs_dir(configs_dir, pacing)?)),
        "spareroom" => Ok(Box::new(SpareRoomAdapter::from_configs_dir(configs_dir, pacing)?)),
        _ => Err(AdapterError::UnknownSite {
            site: site.to_string(),
            known: KNOWN_SITES.join(", "),
        }),
    }
}
