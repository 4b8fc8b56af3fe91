//! In-memory browsing environment.
//!
//! `HeadlessEnvironment` models the parts of a page the tracker reads (location, canonical link,
//! referrer, user agent, visibility, body readiness) and records every beacon and pixel request
//! it is asked to make. Requests are forwarded to a [`CollectorTransport`] when one is attached,
//! which lets native processes report to a real collector.

use std::collections::BTreeMap;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use url::Url;

use crate::logger::Logger;
use crate::platform::environment::{
    Environment, NavigationCallback, ReadyCallback, VisibilityState,
};
use crate::platform::runtime;
use crate::tracker::error::{environment_error, invalid_argument, TrackerResult};
use crate::tracker::event::DeliveryChannel;
use crate::tracker::payload::decode_query;
use crate::tracker::transport::CollectorTransport;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@fathom/headless"));

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) fathom-rs-sdk";
const DEFAULT_LOCATION: &str = "http://localhost/";

static NEXT_HISTORY_ID: AtomicU64 = AtomicU64::new(1);

/// One request issued through a delivery channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transmission {
    pub channel: DeliveryChannel,
    pub url: String,
}

impl Transmission {
    /// Decoded query parameters of the request URL.
    pub fn query(&self) -> BTreeMap<String, String> {
        let query = self.url.split_once('?').map(|(_, q)| q).unwrap_or("");
        decode_query(query)
            .unwrap_or_default()
            .into_iter()
            .collect()
    }

    pub fn param(&self, key: &str) -> Option<String> {
        self.query().remove(key)
    }
}

/// Tracking image currently attached to the headless body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelElement {
    pub id: u64,
    pub src: String,
    pub attributes: BTreeMap<String, String>,
    pub style: BTreeMap<String, String>,
}

struct PageState {
    browsing: bool,
    user_agent: String,
    visibility: VisibilityState,
    body_ready: bool,
    history: Vec<Url>,
    history_index: usize,
    canonical: Option<String>,
    referrer: String,
    timezone: String,
    ready_listeners: Vec<ReadyCallback>,
    history_hooks: Vec<NavigationCallback>,
    transmissions: Vec<Transmission>,
    body: Vec<PixelElement>,
    next_element_id: u64,
    hold_pixel_loads: bool,
}

impl PageState {
    fn location(&self) -> &Url {
        &self.history[self.history_index]
    }

    fn resolve(&self, href: &str) -> TrackerResult<Url> {
        self.location()
            .join(href)
            .map_err(|err| invalid_argument(format!("invalid URL '{href}': {err}")))
    }
}

pub struct HeadlessEnvironment {
    history_id: u64,
    state: Arc<Mutex<PageState>>,
    transport: Option<Arc<dyn CollectorTransport>>,
}

impl Default for HeadlessEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessEnvironment {
    /// A loaded, visible page at `http://localhost/`.
    pub fn new() -> Self {
        let location = Url::parse(DEFAULT_LOCATION).expect("default location is a valid URL");
        let timezone = env::var("TZ")
            .ok()
            .filter(|tz| !tz.trim().is_empty())
            .unwrap_or_else(|| "UTC".to_string());
        Self {
            history_id: NEXT_HISTORY_ID.fetch_add(1, Ordering::SeqCst),
            state: Arc::new(Mutex::new(PageState {
                browsing: true,
                user_agent: DEFAULT_USER_AGENT.to_string(),
                visibility: VisibilityState::Visible,
                body_ready: true,
                history: vec![location],
                history_index: 0,
                canonical: None,
                referrer: String::new(),
                timezone,
                ready_listeners: Vec::new(),
                history_hooks: Vec::new(),
                transmissions: Vec::new(),
                body: Vec::new(),
                next_element_id: 1,
                hold_pixel_loads: false,
            })),
            transport: None,
        }
    }

    /// A host without window or document, the equivalent of server-side rendering.
    pub fn detached() -> Self {
        let environment = Self::new();
        environment.state.lock().unwrap().browsing = false;
        environment
    }

    /// Forwards every beacon and pixel request to `transport`.
    pub fn with_transport(mut self, transport: Arc<dyn CollectorTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Keeps pixels attached until [`Self::finish_pixel_loads`] is called. Only applies when no
    /// transport is attached; with a transport the pixel settles when its request does.
    pub fn with_held_pixel_loads(self) -> Self {
        self.state.lock().unwrap().hold_pixel_loads = true;
        self
    }

    pub fn set_user_agent(&self, user_agent: impl Into<String>) {
        self.state.lock().unwrap().user_agent = user_agent.into();
    }

    pub fn set_visibility(&self, visibility: VisibilityState) {
        self.state.lock().unwrap().visibility = visibility;
    }

    pub fn set_referrer(&self, referrer: impl Into<String>) {
        self.state.lock().unwrap().referrer = referrer.into();
    }

    pub fn set_timezone(&self, timezone: impl Into<String>) {
        self.state.lock().unwrap().timezone = timezone.into();
    }

    /// Declares (or with `None`, removes) `<link rel="canonical" href>`.
    pub fn set_canonical(&self, href: Option<&str>) {
        self.state.lock().unwrap().canonical = href.map(str::to_string);
    }

    /// Replaces the current location without touching history hooks, like a full page load.
    pub fn set_location(&self, href: &str) -> TrackerResult<()> {
        let mut state = self.state.lock().unwrap();
        let url = state.resolve(href)?;
        state.history = vec![url];
        state.history_index = 0;
        Ok(())
    }

    pub fn location(&self) -> String {
        self.state.lock().unwrap().location().to_string()
    }

    /// Simulates a document whose `<body>` has not been parsed yet.
    pub fn set_loading(&self) {
        self.state.lock().unwrap().body_ready = false;
    }

    /// Marks the body as available and fires pending `DOMContentLoaded` listeners once.
    pub fn fire_dom_content_loaded(&self) {
        let listeners = {
            let mut state = self.state.lock().unwrap();
            state.body_ready = true;
            std::mem::take(&mut state.ready_listeners)
        };
        for listener in listeners {
            listener();
        }
    }

    pub fn pending_ready_listeners(&self) -> usize {
        self.state.lock().unwrap().ready_listeners.len()
    }

    /// `history.pushState(null, "", href)`.
    pub fn push_state(&self, href: &str) -> TrackerResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            let url = state.resolve(href)?;
            let keep = state.history_index + 1;
            state.history.truncate(keep);
            state.history.push(url);
            state.history_index += 1;
        }
        self.notify_history_hooks();
        Ok(())
    }

    /// `history.replaceState(null, "", href)`.
    pub fn replace_state(&self, href: &str) -> TrackerResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            let url = state.resolve(href)?;
            let index = state.history_index;
            state.history[index] = url;
        }
        self.notify_history_hooks();
        Ok(())
    }

    /// Steps back one history entry (the back button). Returns `false` at the first entry.
    pub fn pop_state(&self) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if state.history_index == 0 {
                return false;
            }
            state.history_index -= 1;
        }
        self.notify_history_hooks();
        true
    }

    pub fn history_hook_count(&self) -> usize {
        self.state.lock().unwrap().history_hooks.len()
    }

    pub fn transmissions(&self) -> Vec<Transmission> {
        self.state.lock().unwrap().transmissions.clone()
    }

    pub fn transmissions_on(&self, channel: DeliveryChannel) -> Vec<Transmission> {
        self.transmissions()
            .into_iter()
            .filter(|transmission| transmission.channel == channel)
            .collect()
    }

    pub fn clear_transmissions(&self) {
        self.state.lock().unwrap().transmissions.clear();
    }

    /// Pixels still attached to the body.
    pub fn body_pixels(&self) -> Vec<PixelElement> {
        self.state.lock().unwrap().body.clone()
    }

    /// Settles every held pixel as loaded, removing it from the body.
    pub fn finish_pixel_loads(&self) {
        self.state.lock().unwrap().body.clear();
    }

    fn notify_history_hooks(&self) {
        let hooks = self.state.lock().unwrap().history_hooks.clone();
        for hook in hooks {
            hook();
        }
    }

    fn record(&self, channel: DeliveryChannel, url: &str) {
        self.state.lock().unwrap().transmissions.push(Transmission {
            channel,
            url: url.to_string(),
        });
    }

    fn forward<F>(&self, url: &str, on_settled: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(transport) = self.transport.clone() else {
            on_settled();
            return;
        };
        let url = url.to_string();
        runtime::spawn_detached(async move {
            if let Err(err) = transport.get(&url).await {
                LOGGER.debug(format!("collector request failed: {err}"));
            }
            on_settled();
        });
    }
}

impl Environment for HeadlessEnvironment {
    fn is_browsing(&self) -> bool {
        self.state.lock().unwrap().browsing
    }

    fn user_agent(&self) -> String {
        self.state.lock().unwrap().user_agent.clone()
    }

    fn visibility_state(&self) -> VisibilityState {
        self.state.lock().unwrap().visibility
    }

    fn has_body(&self) -> bool {
        self.state.lock().unwrap().body_ready
    }

    fn on_dom_ready(&self, callback: ReadyCallback) -> TrackerResult<()> {
        self.state.lock().unwrap().ready_listeners.push(callback);
        Ok(())
    }

    fn location_href(&self) -> TrackerResult<String> {
        let state = self.state.lock().unwrap();
        if !state.browsing {
            return Err(environment_error("no browsing location available"));
        }
        Ok(state.location().to_string())
    }

    fn canonical_href(&self) -> Option<String> {
        self.state.lock().unwrap().canonical.clone()
    }

    fn referrer(&self) -> String {
        self.state.lock().unwrap().referrer.clone()
    }

    fn timezone(&self) -> String {
        self.state.lock().unwrap().timezone.clone()
    }

    fn send_beacon(&self, url: &str) -> TrackerResult<()> {
        self.record(DeliveryChannel::Beacon, url);
        self.forward(url, || {});
        Ok(())
    }

    fn insert_pixel(&self, url: &str) -> TrackerResult<()> {
        let (id, hold) = {
            let mut state = self.state.lock().unwrap();
            if !state.body_ready {
                return Err(environment_error("document body not available"));
            }
            let id = state.next_element_id;
            state.next_element_id += 1;
            state.body.push(PixelElement {
                id,
                src: url.to_string(),
                attributes: BTreeMap::from([
                    ("alt".to_string(), String::new()),
                    ("aria-hidden".to_string(), "true".to_string()),
                ]),
                style: BTreeMap::from([
                    ("position".to_string(), "absolute".to_string()),
                    ("top".to_string(), "-100px".to_string()),
                    ("left".to_string(), "-100px".to_string()),
                ]),
            });
            state.transmissions.push(Transmission {
                channel: DeliveryChannel::Pixel,
                url: url.to_string(),
            });
            (id, state.hold_pixel_loads && self.transport.is_none())
        };

        if hold {
            return Ok(());
        }
        let state = Arc::clone(&self.state);
        self.forward(url, move || {
            state.lock().unwrap().body.retain(|pixel| pixel.id != id);
        });
        Ok(())
    }

    fn history_id(&self) -> u64 {
        self.history_id
    }

    fn intercept_history(&self, on_navigate: NavigationCallback) -> TrackerResult<bool> {
        let mut state = self.state.lock().unwrap();
        if !state.browsing {
            return Ok(false);
        }
        state.history_hooks.push(on_navigate);
        Ok(true)
    }
}
