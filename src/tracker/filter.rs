use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::platform::environment::{Environment, VisibilityState};

static CRAWLER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)bot|google|baidu|bing|msn|duckduckbot|teoma|slurp|yandex")
        .expect("crawler pattern is a valid regex")
});

/// Why an event was dropped before reaching a delivery channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuppressReason {
    NotBrowsing,
    Crawler,
    Prerender,
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SuppressReason::NotBrowsing => "no browsing environment",
            SuppressReason::Crawler => "automated user agent",
            SuppressReason::Prerender => "document is prerendering",
        };
        f.write_str(label)
    }
}

pub fn is_crawler(user_agent: &str) -> bool {
    CRAWLER_PATTERN.is_match(user_agent)
}

/// First guard that rejects traffic from `environment`, if any.
pub fn suppression_reason(environment: &dyn Environment) -> Option<SuppressReason> {
    if !environment.is_browsing() {
        return Some(SuppressReason::NotBrowsing);
    }
    if is_crawler(&environment.user_agent()) {
        return Some(SuppressReason::Crawler);
    }
    if environment.visibility_state() == VisibilityState::Prerender {
        return Some(SuppressReason::Prerender);
    }
    None
}
