use std::collections::BTreeMap;
use std::fmt;

/// Kind of report sent to the collector. Any event name other than `"goal"` is a page view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    PageView,
    Goal,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PageView => "pageview",
            EventKind::Goal => "goal",
        }
    }

    /// Channel used to deliver events of this kind.
    pub fn channel(&self) -> DeliveryChannel {
        match self {
            EventKind::Goal => DeliveryChannel::Beacon,
            EventKind::PageView => DeliveryChannel::Pixel,
        }
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        if name == "goal" {
            EventKind::Goal
        } else {
            EventKind::PageView
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeliveryChannel {
    /// `navigator.sendBeacon`; survives page teardown.
    Beacon,
    /// Off-screen `<img>` appended to the body and removed once it loads or fails.
    Pixel,
}

/// Caller-supplied fields of an event. Every field is optional; blank strings count as absent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventData {
    pub path: Option<String>,
    pub hostname: Option<String>,
    pub referrer: Option<String>,
    pub goal_id: Option<String>,
    pub goal_value: Option<f64>,
    pub extra: BTreeMap<String, String>,
}

impl EventData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn with_goal_id(mut self, goal_id: impl Into<String>) -> Self {
        self.goal_id = Some(goal_id.into());
        self
    }

    pub fn with_goal_value(mut self, value: f64) -> Self {
        self.goal_value = Some(value);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Layers `self` over `base`: fields set here win, the rest come from `base`.
    pub(crate) fn merged_over(self, base: EventData) -> EventData {
        let mut extra = base.extra;
        extra.extend(self.extra);
        EventData {
            path: self.path.or(base.path),
            hostname: self.hostname.or(base.hostname),
            referrer: self.referrer.or(base.referrer),
            goal_id: self.goal_id.or(base.goal_id),
            goal_value: self.goal_value.or(base.goal_value),
            extra,
        }
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|text| !text.is_empty())
}

/// Formats a goal value the way the collector expects; missing, zero and NaN all become `"0"`.
pub(crate) fn goal_value_string(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_nan() || v == 0.0 => "0".to_string(),
        Some(v) if v.is_infinite() => {
            if v > 0.0 {
                "Infinity".to_string()
            } else {
                "-Infinity".to_string()
            }
        }
        Some(v) => number_string(v),
        None => "0".to_string(),
    }
}

/// Finite, non-zero `v` formatted like JavaScript's `String(number)`: plain decimals for
/// magnitudes in `[1e-6, 1e21)`, exponent notation with an explicit sign outside it.
fn number_string(v: f64) -> String {
    if (1e-6..1e21).contains(&v.abs()) {
        return v.to_string();
    }
    let formatted = format!("{v:e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => formatted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_goal_name_maps_to_goal() {
        assert_eq!(EventKind::from("goal"), EventKind::Goal);
        assert_eq!(EventKind::from("pageview"), EventKind::PageView);
        assert_eq!(EventKind::from("signup"), EventKind::PageView);
        assert_eq!(EventKind::Goal.channel(), DeliveryChannel::Beacon);
        assert_eq!(EventKind::PageView.channel(), DeliveryChannel::Pixel);
    }

    #[test]
    fn merged_fields_prefer_overlay() {
        let base = EventData::new()
            .with_goal_id("BASE")
            .with_goal_value(10.0)
            .with_extra("plan", "free");
        let overlay = EventData::new()
            .with_goal_id("OVERRIDE")
            .with_extra("plan", "pro");

        let merged = overlay.merged_over(base);
        assert_eq!(merged.goal_id.as_deref(), Some("OVERRIDE"));
        assert_eq!(merged.goal_value, Some(10.0));
        assert_eq!(merged.extra.get("plan").map(String::as_str), Some("pro"));
    }

    #[test]
    fn goal_values_are_stringified() {
        assert_eq!(goal_value_string(None), "0");
        assert_eq!(goal_value_string(Some(0.0)), "0");
        assert_eq!(goal_value_string(Some(f64::NAN)), "0");
        assert_eq!(goal_value_string(Some(1250.0)), "1250");
        assert_eq!(goal_value_string(Some(9.99)), "9.99");
        assert_eq!(goal_value_string(Some(f64::INFINITY)), "Infinity");
    }

    #[test]
    fn goal_values_outside_decimal_range_use_exponents() {
        assert_eq!(goal_value_string(Some(1e21)), "1e+21");
        assert_eq!(goal_value_string(Some(-2.5e22)), "-2.5e+22");
        assert_eq!(goal_value_string(Some(1e-7)), "1e-7");
        assert_eq!(goal_value_string(Some(1.5e-7)), "1.5e-7");
        assert_eq!(goal_value_string(Some(1e20)), "100000000000000000000");
        assert_eq!(goal_value_string(Some(0.000001)), "0.000001");
        assert_eq!(goal_value_string(Some(-0.5)), "-0.5");
    }

    #[test]
    fn blank_strings_count_as_absent() {
        assert_eq!(non_empty(&Some(String::new())), None);
        assert_eq!(non_empty(&Some("/a".into())), Some("/a"));
        assert_eq!(non_empty(&None), None);
    }
}
