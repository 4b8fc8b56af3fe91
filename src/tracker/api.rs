use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::platform::environment::Environment;
use crate::tracker::error::{invalid_argument, TrackerResult};
use crate::tracker::event::{goal_value_string, non_empty, DeliveryChannel, EventData, EventKind};
use crate::tracker::filter::{suppression_reason, SuppressReason};
use crate::tracker::location::{external_referrer, resolve_location};
use crate::tracker::logger::LOGGER;
use crate::tracker::payload::{
    Payload, GOAL_CODE_KEY, GOAL_VALUE_KEY, HOSTNAME_KEY, PATH_KEY, REFERRER_KEY, RESERVED_KEYS,
    SITE_ID_KEY, TIMEZONE_KEY,
};

/// Collector base URL and site identifier. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackerConfig {
    tracker_url: String,
    site_id: String,
}

impl TrackerConfig {
    /// `tracker_url` must be an absolute URL such as `https://collect.usefathom.com`.
    pub fn new(tracker_url: impl Into<String>, site_id: impl Into<String>) -> TrackerResult<Self> {
        let tracker_url = tracker_url.into();
        Url::parse(&tracker_url)
            .map_err(|err| invalid_argument(format!("invalid tracker URL '{tracker_url}': {err}")))?;
        Ok(Self {
            tracker_url: tracker_url.trim_end_matches('/').to_string(),
            site_id: site_id.into(),
        })
    }

    pub fn tracker_url(&self) -> &str {
        &self.tracker_url
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    /// `{tracker_url}/?{query}`.
    pub fn endpoint(&self, payload: &Payload) -> String {
        format!("{}/{}", self.tracker_url, payload.encode())
    }
}

/// What happened to one `send` call. Never surfaced to callers of [`Tracker::send`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(DeliveryChannel),
    Suppressed(SuppressReason),
    /// Waiting for `DOMContentLoaded`; the send is retried once when it fires.
    Deferred,
}

/// Builds and delivers events for one site.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    config: TrackerConfig,
    environment: Arc<dyn Environment>,
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Tracker {
    pub fn new(config: TrackerConfig, environment: Arc<dyn Environment>) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                config,
                environment,
            }),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    pub fn environment(&self) -> &Arc<dyn Environment> {
        &self.inner.environment
    }

    /// Reports one event. Fire-and-forget: filtered traffic, missing browser APIs and delivery
    /// failures are logged at debug level and otherwise ignored.
    pub fn send(&self, kind: EventKind, data: EventData) {
        self.send_with_policy(kind, data, true);
    }

    fn send_with_policy(&self, kind: EventKind, data: EventData, may_defer: bool) {
        match self.try_send(kind, data, may_defer) {
            Ok(SendOutcome::Sent(channel)) => {
                LOGGER.debug(format!("{kind} event sent via {channel:?}"))
            }
            Ok(SendOutcome::Suppressed(reason)) => {
                LOGGER.debug(format!("{kind} event skipped: {reason}"))
            }
            Ok(SendOutcome::Deferred) => {
                LOGGER.debug(format!("{kind} event deferred until DOMContentLoaded"))
            }
            Err(err) => LOGGER.debug(format!("{kind} event dropped: {err}")),
        }
    }

    /// Runs the guards and delivers the event, reporting what happened.
    pub fn try_send(
        &self,
        kind: EventKind,
        data: EventData,
        may_defer: bool,
    ) -> TrackerResult<SendOutcome> {
        let environment = self.inner.environment.as_ref();
        if let Some(reason) = suppression_reason(environment) {
            return Ok(SendOutcome::Suppressed(reason));
        }

        if may_defer && !environment.has_body() {
            let tracker = self.clone();
            environment.on_dom_ready(Box::new(move || {
                tracker.send_with_policy(kind, data, false);
            }))?;
            return Ok(SendOutcome::Deferred);
        }

        let payload = self.build_payload(kind, &data)?;
        let url = self.inner.config.endpoint(&payload);
        let channel = kind.channel();
        match channel {
            DeliveryChannel::Beacon => environment.send_beacon(&url)?,
            DeliveryChannel::Pixel => environment.insert_pixel(&url)?,
        }
        Ok(SendOutcome::Sent(channel))
    }

    /// Assembles the collector payload from `data` and the current page.
    pub fn build_payload(&self, kind: EventKind, data: &EventData) -> TrackerResult<Payload> {
        let environment = self.inner.environment.as_ref();
        let location = resolve_location(environment)?;
        let hostname = location.origin_hostname();
        let referrer = external_referrer(&environment.referrer(), &hostname);

        let mut payload = Payload::new();
        payload.insert(
            PATH_KEY,
            non_empty(&data.path)
                .map(str::to_string)
                .unwrap_or_else(|| location.path_and_search()),
        );
        payload.insert(
            HOSTNAME_KEY,
            non_empty(&data.hostname).map(str::to_string).unwrap_or(hostname),
        );
        payload.insert(
            REFERRER_KEY,
            non_empty(&data.referrer).map(str::to_string).unwrap_or(referrer),
        );
        payload.insert(SITE_ID_KEY, self.inner.config.site_id());
        payload.insert(TIMEZONE_KEY, environment.timezone());

        if kind == EventKind::Goal {
            payload.insert(GOAL_CODE_KEY, data.goal_id.clone().unwrap_or_default());
            payload.insert(GOAL_VALUE_KEY, goal_value_string(data.goal_value));
        }

        for (key, value) in &data.extra {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            payload.insert(key.as_str(), value.as_str());
        }

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{HeadlessEnvironment, VisibilityState};
    use crate::test_support::example_page;
    use crate::tracker::payload::decode_query;

    const TRACKER_URL: &str = "https://collect.usefathom.com";

    fn tracker_for(page: &Arc<HeadlessEnvironment>) -> Tracker {
        let config = TrackerConfig::new(TRACKER_URL, "ABCDEF").unwrap();
        Tracker::new(config, page.clone())
    }

    #[test]
    fn config_rejects_relative_urls_and_trims_slash() {
        let err = TrackerConfig::new("collect.usefathom.com", "ABCDEF").unwrap_err();
        assert_eq!(err.code_str(), "tracker/invalid-argument");

        let config = TrackerConfig::new("https://stats.example.com/", "ABCDEF").unwrap();
        assert_eq!(config.tracker_url(), "https://stats.example.com");
        assert_eq!(
            config.endpoint(&Payload::new()),
            "https://stats.example.com/?"
        );
    }

    #[test]
    fn page_view_goes_through_pixel() {
        let page = example_page();
        let tracker = tracker_for(&page);

        tracker.send(EventKind::PageView, EventData::new());

        let sent = page.transmissions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, DeliveryChannel::Pixel);
        assert!(sent[0].url.starts_with("https://collect.usefathom.com/?p="));
        assert_eq!(sent[0].param("p").as_deref(), Some("/pricing?plan=pro"));
        assert_eq!(sent[0].param("h").as_deref(), Some("https://example.com"));
        assert_eq!(sent[0].param("r").as_deref(), Some(""));
        assert_eq!(sent[0].param("sid").as_deref(), Some("ABCDEF"));
        assert_eq!(sent[0].param("tz").as_deref(), Some("Europe/Berlin"));
        assert_eq!(sent[0].param("gcode"), None);
        assert!(page.body_pixels().is_empty());
    }

    #[test]
    fn goal_without_value_sends_beacon_with_zero() {
        let page = example_page();
        let tracker = tracker_for(&page);

        tracker.send(EventKind::Goal, EventData::new().with_goal_id("G1"));

        let beacons = page.transmissions_on(DeliveryChannel::Beacon);
        assert_eq!(beacons.len(), 1);
        assert_eq!(page.transmissions().len(), 1);
        assert_eq!(beacons[0].param("gcode").as_deref(), Some("G1"));
        assert_eq!(beacons[0].param("gval").as_deref(), Some("0"));
        assert!(page.body_pixels().is_empty());
    }

    #[test]
    fn goal_value_is_stringified() {
        let page = example_page();
        let tracker = tracker_for(&page);

        tracker.send(
            EventKind::Goal,
            EventData::new().with_goal_id("SIGNUP").with_goal_value(1999.0),
        );

        let beacons = page.transmissions_on(DeliveryChannel::Beacon);
        assert_eq!(beacons[0].param("gval").as_deref(), Some("1999"));
    }

    #[test]
    fn crawler_traffic_is_never_sent() {
        for agent in ["Googlebot/2.1", "Mozilla/5.0 (compatible; BINGBOT/2.0)", "YandexImages"] {
            let page = example_page();
            page.set_user_agent(agent);
            let tracker = tracker_for(&page);

            tracker.send(EventKind::PageView, EventData::new());
            tracker.send(EventKind::Goal, EventData::new().with_goal_id("G1"));

            assert!(page.transmissions().is_empty(), "{agent} was reported");
        }
    }

    #[test]
    fn prerendering_documents_are_skipped() {
        let page = example_page();
        page.set_visibility(VisibilityState::Prerender);
        let tracker = tracker_for(&page);

        let outcome = tracker
            .try_send(EventKind::PageView, EventData::new(), true)
            .unwrap();
        assert_eq!(outcome, SendOutcome::Suppressed(SuppressReason::Prerender));
        assert!(page.transmissions().is_empty());
    }

    #[test]
    fn detached_environment_is_silent() {
        let page = Arc::new(HeadlessEnvironment::detached());
        let tracker = tracker_for(&page);

        tracker.send(EventKind::PageView, EventData::new());
        let outcome = tracker
            .try_send(EventKind::Goal, EventData::new(), true)
            .unwrap();
        assert_eq!(outcome, SendOutcome::Suppressed(SuppressReason::NotBrowsing));
        assert!(page.transmissions().is_empty());
    }

    #[test]
    fn canonical_link_drives_path_and_hostname() {
        let page = example_page();
        page.set_canonical(Some("https://docs.example.org/guide/intro?v=2"));
        let tracker = tracker_for(&page);

        tracker.send(EventKind::PageView, EventData::new());

        let sent = &page.transmissions()[0];
        assert_eq!(sent.param("p").as_deref(), Some("/guide/intro?v=2"));
        assert_eq!(sent.param("h").as_deref(), Some("https://docs.example.org"));
    }

    #[test]
    fn referrer_from_same_host_is_masked() {
        let page = example_page();
        page.set_referrer("https://example.com/foo");
        let tracker = tracker_for(&page);
        tracker.send(EventKind::PageView, EventData::new());

        page.set_referrer("https://search.example.net/?q=fathom");
        tracker.send(EventKind::PageView, EventData::new());

        let sent = page.transmissions();
        assert_eq!(sent[0].param("r").as_deref(), Some(""));
        assert_eq!(
            sent[1].param("r").as_deref(),
            Some("https://search.example.net/?q=fathom")
        );
    }

    #[test]
    fn caller_overrides_win_unless_blank() {
        let page = example_page();
        page.set_referrer("https://example.com/internal");
        let tracker = tracker_for(&page);

        let data = EventData::new()
            .with_path("/virtual/checkout")
            .with_hostname("https://shop.example.com")
            .with_referrer("https://example.com/internal")
            .with_extra("sid", "HIJACK")
            .with_extra("campaign", "spring sale");
        let payload = tracker.build_payload(EventKind::PageView, &data).unwrap();
        assert_eq!(payload.get("p"), Some("/virtual/checkout"));
        assert_eq!(payload.get("h"), Some("https://shop.example.com"));
        assert_eq!(payload.get("r"), Some("https://example.com/internal"));
        assert_eq!(payload.get("sid"), Some("ABCDEF"));
        assert_eq!(payload.get("campaign"), Some("spring sale"));

        let blank = EventData::new().with_path("").with_hostname("");
        let payload = tracker.build_payload(EventKind::PageView, &blank).unwrap();
        assert_eq!(payload.get("p"), Some("/pricing?plan=pro"));
        assert_eq!(payload.get("h"), Some("https://example.com"));
    }

    #[test]
    fn encoded_payload_round_trips() {
        let page = example_page();
        page.set_location("https://example.com/ümlaut path/?q=a&b=c d").unwrap();
        page.set_referrer("https://other.example/?x=1&y=%20");
        let tracker = tracker_for(&page);

        let data = EventData::new()
            .with_goal_id("G 1&2")
            .with_goal_value(12.5)
            .with_extra("note", "100% = done?");
        let payload = tracker.build_payload(EventKind::Goal, &data).unwrap();

        let decoded = decode_query(&payload.encode()).unwrap();
        assert_eq!(decoded, payload.fields().to_vec());
    }

    #[test]
    fn send_before_body_is_deferred_once() {
        let page = example_page();
        page.set_loading();
        let tracker = tracker_for(&page);

        let outcome = tracker
            .try_send(EventKind::PageView, EventData::new().with_path("/early"), true)
            .unwrap();
        assert_eq!(outcome, SendOutcome::Deferred);
        assert!(page.transmissions().is_empty());
        assert_eq!(page.pending_ready_listeners(), 1);

        page.fire_dom_content_loaded();

        let sent = page.transmissions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].param("p").as_deref(), Some("/early"));
        assert_eq!(page.pending_ready_listeners(), 0);
    }

    #[test]
    fn retried_goal_is_sent_even_if_body_is_still_missing() {
        let page = example_page();
        page.set_loading();
        let tracker = tracker_for(&page);

        let outcome = tracker
            .try_send(EventKind::Goal, EventData::new().with_goal_id("G1"), false)
            .unwrap();
        assert_eq!(outcome, SendOutcome::Sent(DeliveryChannel::Beacon));
        assert_eq!(page.pending_ready_listeners(), 0);
    }
}
