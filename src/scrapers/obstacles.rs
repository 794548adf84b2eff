use super::browser::Page;
use crate::config::{Pacing, SelectorSet};
use tracing::debug;

/// Best-effort removal of a consent banner or overlay. Never fails; at most
/// one obstacle is handled per call.
pub async fn dismiss_obstacles(page: &dyn Page, selectors: &SelectorSet, pacing: &Pacing, site: &str) {
    Pacing::pause(pacing.stabilize).await;

    if let Some(accept) = selectors.cookie_banner_accept_button.as_deref() {
        match page.click(accept).await {
            Ok(true) => {
                debug!("[{}] Clicked cookie accept button {}", site, accept);
                tokio::time::sleep(pacing.click_settle).await;
                return;
            }
            Ok(false) => debug!("[{}] No visible cookie button for {}", site, accept),
            Err(e) => debug!("[{}] Cookie button click failed: {:#}", site, e),
        }
    }

    if selectors.escape_fallback {
        match page.press_key("Escape").await {
            Ok(()) => debug!("[{}] Pressed Escape to dismiss potential overlay", site),
            Err(e) => debug!("[{}] Failed to press Escape: {:#}", site, e),
        }
    }
}
