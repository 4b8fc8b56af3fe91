use std::env;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::tracker::error::{invalid_argument, TrackerResult};

/// Collector host used when no custom domain is configured.
pub const DEFAULT_DOMAIN: &str = "collect.usefathom.com";

/// Provider configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOptions {
    /// Custom collector domain, if configured in Fathom. Falls back to [`DEFAULT_DOMAIN`].
    #[serde(default, alias = "custom_domain")]
    pub custom_domain: Option<String>,
    /// Fathom site ID, usually six uppercase letters.
    #[serde(alias = "site_id")]
    pub site_id: String,
    /// Disables automatic page views on mount and on navigation.
    #[serde(default, alias = "no_pageviews", deserialize_with = "deserialize_flag")]
    pub no_pageviews: bool,
}

impl ProviderOptions {
    pub fn new(site_id: impl Into<String>) -> Self {
        Self {
            custom_domain: None,
            site_id: site_id.into(),
            no_pageviews: false,
        }
    }

    pub fn with_custom_domain(mut self, domain: impl Into<String>) -> Self {
        self.custom_domain = Some(domain.into());
        self
    }

    pub fn with_no_pageviews(mut self, no_pageviews: bool) -> Self {
        self.no_pageviews = no_pageviews;
        self
    }

    /// Configured collector domain, or [`DEFAULT_DOMAIN`] when unset or blank.
    pub fn domain(&self) -> &str {
        self.custom_domain
            .as_deref()
            .map(str::trim)
            .filter(|domain| !domain.is_empty())
            .unwrap_or(DEFAULT_DOMAIN)
    }

    pub fn tracker_url(&self) -> String {
        format!("https://{}", self.domain())
    }

    pub fn validate(&self) -> TrackerResult<()> {
        if self.site_id.trim().is_empty() {
            return Err(invalid_argument("site id must not be empty"));
        }
        Ok(())
    }

    /// Reads options from the process environment.
    ///
    /// `FATHOM_CONFIG` may hold a JSON object or a `key=value,...` list; otherwise the individual
    /// `FATHOM_SITE_ID`, `FATHOM_CUSTOM_DOMAIN` and `FATHOM_NO_PAGEVIEWS` variables are used.
    pub fn from_env() -> TrackerResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> TrackerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("FATHOM_CONFIG").filter(|raw| !raw.trim().is_empty()) {
            return Self::from_config_source(&raw);
        }

        let site_id = lookup("FATHOM_SITE_ID")
            .ok_or_else(|| invalid_argument("FATHOM_SITE_ID is not set"))?;
        let mut options = Self::new(site_id);
        options.custom_domain = lookup("FATHOM_CUSTOM_DOMAIN");
        if let Some(flag) = lookup("FATHOM_NO_PAGEVIEWS") {
            options.no_pageviews = parse_flag(&flag)
                .ok_or_else(|| invalid_argument(format!("invalid FATHOM_NO_PAGEVIEWS '{flag}'")))?;
        }
        options.validate()?;
        Ok(options)
    }

    /// Parses a JSON object or a `key=value,...` list.
    pub fn from_config_source(raw: &str) -> TrackerResult<Self> {
        let value = match serde_json::from_str::<Value>(raw) {
            Ok(json) if json.is_object() => json,
            _ => parse_key_value_config(raw)
                .ok_or_else(|| invalid_argument("provider config is neither JSON nor key=value"))?,
        };
        let options: Self = serde_json::from_value(value)
            .map_err(|err| invalid_argument(format!("invalid provider config: {err}")))?;
        options.validate()?;
        Ok(options)
    }
}

fn parse_key_value_config(raw: &str) -> Option<Value> {
    let mut map = Map::new();
    for entry in raw.split(',') {
        let (key, value) = entry.split_once('=')?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            continue;
        }
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
    if map.is_empty() {
        None
    } else {
        Some(Value::Object(map))
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(flag) => Ok(flag),
        Value::String(text) => parse_flag(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid boolean '{text}'"))),
        Value::Null => Ok(false),
        other => Err(serde::de::Error::custom(format!("invalid boolean {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn blank_custom_domain_falls_back_to_default() {
        let options = ProviderOptions::new("ABCDEF");
        assert_eq!(options.tracker_url(), "https://collect.usefathom.com");

        let options = options.with_custom_domain("  ");
        assert_eq!(options.domain(), DEFAULT_DOMAIN);

        let options = ProviderOptions::new("ABCDEF").with_custom_domain("stats.example.com");
        assert_eq!(options.tracker_url(), "https://stats.example.com");
    }

    #[test]
    fn empty_site_id_is_rejected() {
        let err = ProviderOptions::new(" ").validate().unwrap_err();
        assert_eq!(err.code_str(), "tracker/invalid-argument");
    }

    #[test]
    fn parses_json_config() {
        let options = ProviderOptions::from_config_source(
            r#"{"siteId":"ABCDEF","customDomain":"stats.example.com","noPageviews":true}"#,
        )
        .unwrap();
        assert_eq!(options.site_id, "ABCDEF");
        assert_eq!(options.custom_domain.as_deref(), Some("stats.example.com"));
        assert!(options.no_pageviews);
    }

    #[test]
    fn parses_key_value_config() {
        let options =
            ProviderOptions::from_config_source("site_id=ABCDEF, no_pageviews=yes").unwrap();
        assert_eq!(options.site_id, "ABCDEF");
        assert_eq!(options.custom_domain, None);
        assert!(options.no_pageviews);
    }

    #[test]
    fn config_without_site_id_fails() {
        let err = ProviderOptions::from_config_source(r#"{"noPageviews":false}"#).unwrap_err();
        assert!(err.to_string().contains("siteId"));
    }

    #[test]
    fn individual_variables_are_read() {
        let options = ProviderOptions::from_lookup(lookup_from(&[
            ("FATHOM_SITE_ID", "ABCDEF"),
            ("FATHOM_CUSTOM_DOMAIN", "cdn.example.com"),
            ("FATHOM_NO_PAGEVIEWS", "1"),
        ]))
        .unwrap();
        assert_eq!(options.domain(), "cdn.example.com");
        assert!(options.no_pageviews);

        let err = ProviderOptions::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("FATHOM_SITE_ID"));

        let err = ProviderOptions::from_lookup(lookup_from(&[
            ("FATHOM_SITE_ID", "ABCDEF"),
            ("FATHOM_NO_PAGEVIEWS", "sometimes"),
        ]))
        .unwrap_err();
        assert_eq!(err.code_str(), "tracker/invalid-argument");
    }

    #[test]
    fn combined_config_takes_precedence() {
        let options = ProviderOptions::from_lookup(lookup_from(&[
            ("FATHOM_CONFIG", r#"{"siteId":"FROMJSON"}"#),
            ("FATHOM_SITE_ID", "IGNORED"),
        ]))
        .unwrap();
        assert_eq!(options.site_id, "FROMJSON");
    }
}
