//! Query-string payload sent to the collector.
//!
//! Keys and values are percent-encoded with the same reserved set as JavaScript's
//! `encodeURIComponent`, so the collector sees byte-identical requests regardless of which
//! client produced them.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::tracker::error::{invalid_argument, TrackerResult};

const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub const PATH_KEY: &str = "p";
pub const HOSTNAME_KEY: &str = "h";
pub const REFERRER_KEY: &str = "r";
pub const SITE_ID_KEY: &str = "sid";
pub const TIMEZONE_KEY: &str = "tz";
pub const GOAL_CODE_KEY: &str = "gcode";
pub const GOAL_VALUE_KEY: &str = "gval";

pub(crate) const RESERVED_KEYS: [&str; 7] = [
    PATH_KEY,
    HOSTNAME_KEY,
    REFERRER_KEY,
    SITE_ID_KEY,
    TIMEZONE_KEY,
    GOAL_CODE_KEY,
    GOAL_VALUE_KEY,
];

/// Ordered key/value pairs. Order is cosmetic; the collector parses by key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Payload {
    fields: Vec<(String, String)>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing an earlier value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Renders `?k=v&k=v`.
    pub fn encode(&self) -> String {
        let pairs = self
            .fields
            .iter()
            .map(|(key, value)| format!("{}={}", encode_component(key), encode_component(value)))
            .collect::<Vec<_>>()
            .join("&");
        format!("?{pairs}")
    }
}

pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Parses a query produced by [`Payload::encode`] back into decoded pairs.
pub fn decode_query(query: &str) -> TrackerResult<Vec<(String, String)>> {
    let query = query.strip_prefix('?').unwrap_or(query);
    if query.is_empty() {
        return Ok(Vec::new());
    }

    query
        .split('&')
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            Ok((decode_component(key)?, decode_component(value)?))
        })
        .collect()
}

fn decode_component(value: &str) -> TrackerResult<String> {
    percent_decode_str(value)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|err| invalid_argument(format!("query component is not valid UTF-8: {err}")))
}
