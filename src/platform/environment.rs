//! Host environment abstraction and runtime detection.
//!
//! The tracker never touches browser globals directly; everything it needs from the page goes
//! through [`Environment`]. [`crate::platform::web::WebEnvironment`] backs it with `web-sys` on
//! `wasm32`, [`crate::platform::headless::HeadlessEnvironment`] models a page in memory.

use std::env;
use std::sync::Arc;

use crate::tracker::error::TrackerResult;

/// Invoked once per virtual navigation.
pub type NavigationCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Invoked once when the document finishes parsing.
pub type ReadyCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisibilityState {
    Visible,
    Hidden,
    Prerender,
    Unknown,
}

impl VisibilityState {
    pub fn parse(value: &str) -> Self {
        match value {
            "visible" => VisibilityState::Visible,
            "hidden" => VisibilityState::Hidden,
            "prerender" => VisibilityState::Prerender,
            _ => VisibilityState::Unknown,
        }
    }
}

/// Capabilities of the page hosting the tracker.
pub trait Environment: Send + Sync {
    /// `false` when there is no window/document (server rendering, native processes).
    fn is_browsing(&self) -> bool;

    fn user_agent(&self) -> String;

    fn visibility_state(&self) -> VisibilityState;

    fn has_body(&self) -> bool;

    /// Registers a one-shot listener for `DOMContentLoaded`.
    fn on_dom_ready(&self, callback: ReadyCallback) -> TrackerResult<()>;

    /// Absolute URL of the current browsing location.
    fn location_href(&self) -> TrackerResult<String>;

    /// `href` of `<link rel="canonical">`, when the page declares one.
    fn canonical_href(&self) -> Option<String>;

    fn referrer(&self) -> String;

    /// IANA timezone name, e.g. `Europe/Berlin`.
    fn timezone(&self) -> String;

    fn send_beacon(&self, url: &str) -> TrackerResult<()>;

    /// Appends an invisible, self-removing tracking image pointed at `url`.
    fn insert_pixel(&self, url: &str) -> TrackerResult<()>;

    /// Identity of the session history this environment drives. Environments reporting the same
    /// id share one history, so it only needs to be intercepted once.
    fn history_id(&self) -> u64;

    /// Wraps the history push/replace/pop entry points so each one calls `on_navigate` after its
    /// original effect. Returns `Ok(false)` when the host has no history to patch.
    fn intercept_history(&self, on_navigate: NavigationCallback) -> TrackerResult<bool>;
}

fn forced_environment() -> Option<String> {
    env::var("FATHOM_FORCE_ENVIRONMENT")
        .ok()
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
}

/// Returns `true` if the runtime has a browser window.
///
/// `FATHOM_FORCE_ENVIRONMENT=browser|node` overrides detection.
pub fn is_browser() -> bool {
    detect_browser(forced_environment().as_deref())
}

fn detect_browser(forced: Option<&str>) -> bool {
    if let Some(forced) = forced {
        return forced == "browser";
    }

    #[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
    {
        web_sys::window().is_some()
    }

    #[cfg(not(all(target_arch = "wasm32", feature = "wasm-web")))]
    {
        false
    }
}

/// Environment used when the caller does not inject one.
///
/// Follows [`is_browser`]. In a browser this is the live page. A native process forced to
/// `browser` gets a browsing headless page. Everything else gets a detached headless page, so
/// every send is silently skipped as in server-side rendering.
pub fn default_environment() -> Arc<dyn Environment> {
    environment_for(is_browser())
}

fn environment_for(browser: bool) -> Arc<dyn Environment> {
    use crate::platform::headless::HeadlessEnvironment;

    if !browser {
        return Arc::new(HeadlessEnvironment::detached());
    }

    #[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
    {
        if web_sys::window().is_some() {
            return Arc::new(crate::platform::web::WebEnvironment::new());
        }
    }

    Arc::new(HeadlessEnvironment::new())
}
