use url::Url;

use crate::platform::environment::Environment;
use crate::tracker::error::{invalid_argument, TrackerResult};
use crate::tracker::logger::LOGGER;

/// The `window.location` fields the payload is built from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub protocol: String,
    pub hostname: String,
    pub pathname: String,
    pub search: String,
}

impl ResolvedLocation {
    pub fn from_url(url: &Url) -> Self {
        Self {
            protocol: format!("{}:", url.scheme()),
            hostname: url.host_str().unwrap_or_default().to_string(),
            pathname: url.path().to_string(),
            search: url
                .query()
                .filter(|query| !query.is_empty())
                .map(|query| format!("?{query}"))
                .unwrap_or_default(),
        }
    }

    /// `{protocol}//{hostname}`, e.g. `https://example.com`.
    pub fn origin_hostname(&self) -> String {
        format!("{}//{}", self.protocol, self.hostname)
    }

    pub fn path_and_search(&self) -> String {
        format!("{}{}", self.pathname, self.search)
    }
}

/// Location used for attribution: the canonical link when the page declares one, otherwise the
/// browsing location. Relative canonical hrefs resolve against the browsing location.
pub fn resolve_location(environment: &dyn Environment) -> TrackerResult<ResolvedLocation> {
    let href = environment.location_href()?;
    let current = Url::parse(&href)
        .map_err(|err| invalid_argument(format!("invalid browsing location '{href}': {err}")))?;

    if let Some(canonical) = environment.canonical_href() {
        match current.join(&canonical) {
            Ok(url) => return Ok(ResolvedLocation::from_url(&url)),
            Err(err) => LOGGER.debug(format!("ignoring canonical link '{canonical}': {err}")),
        }
    }

    Ok(ResolvedLocation::from_url(&current))
}

/// Empty when `referrer` mentions `hostname` (internal navigation), otherwise `referrer`.
pub fn external_referrer(referrer: &str, hostname: &str) -> String {
    if referrer.contains(hostname) {
        String::new()
    } else {
        referrer.to_string()
    }
}
