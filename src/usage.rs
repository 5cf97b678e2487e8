//! Usage data model parsed leniently from the usage endpoint
//!
//! The endpoint answers with an object keyed by window name
//! (`five_hour`, `seven_day`, ...). Every field degrades on its own: a bad
//! `utilization` becomes 0, a missing `resets_at` stays absent, and an
//! unknown shape never discards the rest of the payload.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Account/organization identifier every usage call is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OrganizationId(String);

impl OrganizationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The rate-limit windows the service reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageWindowKind {
    FiveHour,
    SevenDay,
    SevenDayOpus,
    SevenDaySonnet,
}

impl UsageWindowKind {
    /// Display order
    pub const ALL: [UsageWindowKind; 4] = [
        UsageWindowKind::FiveHour,
        UsageWindowKind::SevenDay,
        UsageWindowKind::SevenDayOpus,
        UsageWindowKind::SevenDaySonnet,
    ];

    /// JSON key in the usage payload
    pub fn key(self) -> &'static str {
        match self {
            UsageWindowKind::FiveHour => "five_hour",
            UsageWindowKind::SevenDay => "seven_day",
            UsageWindowKind::SevenDayOpus => "seven_day_opus",
            UsageWindowKind::SevenDaySonnet => "seven_day_sonnet",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            UsageWindowKind::FiveHour => "5-Hour Usage",
            UsageWindowKind::SevenDay => "7-Day Usage",
            UsageWindowKind::SevenDayOpus => "Opus (7-Day)",
            UsageWindowKind::SevenDaySonnet => "Sonnet (7-Day)",
        }
    }

}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageWindow {
    pub kind: UsageWindowKind,
    /// Percent consumed, nominally 0-100; non-numeric input is coerced to 0
    pub utilization: f64,
    /// Raw `resets_at` as sent by the server
    pub resets_at: Option<String>,
}

impl UsageWindow {
    /// Parse one window object. Returns `None` for null, empty or non-object values.
    fn from_json(kind: UsageWindowKind, value: &Value) -> Option<Self> {
        let object = value.as_object().filter(|o| !o.is_empty())?;

        let utilization = object
            .get("utilization")
            .map(coerce_utilization)
            .unwrap_or(0.0);

        let resets_at = object
            .get("resets_at")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Some(Self {
            kind,
            utilization,
            resets_at,
        })
    }

    /// `resets_at` as an instant, if it is valid RFC 3339
    pub fn resets_at_time(&self) -> Option<DateTime<Utc>> {
        let raw = self.resets_at.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

fn coerce_utilization(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// Presence test used for optional sections: null, false, 0 and empty containers count as absent
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Everything known about usage as of one successful fetch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSnapshot {
    /// Windows in display order; absent windows are omitted
    pub windows: Vec<UsageWindow>,
    /// Opaque pass-through payload (`extra_usage`, or the whole body when it is not an object)
    pub extra: Option<Value>,
    pub fetched_at: DateTime<Utc>,
}

impl UsageSnapshot {
    pub fn empty(fetched_at: DateTime<Utc>) -> Self {
        Self {
            windows: Vec::new(),
            extra: None,
            fetched_at,
        }
    }

    /// Parse a response body. Only a body that is not JSON at all is an error.
    pub fn parse(body: &str, fetched_at: DateTime<Utc>) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(body)?;
        Ok(Self::from_json(value, fetched_at))
    }

    pub fn from_json(value: Value, fetched_at: DateTime<Utc>) -> Self {
        let Value::Object(object) = value else {
            return Self {
                windows: Vec::new(),
                extra: is_present(&value).then_some(value),
                fetched_at,
            };
        };

        let windows = UsageWindowKind::ALL
            .into_iter()
            .filter_map(|kind| {
                object
                    .get(kind.key())
                    .and_then(|v| UsageWindow::from_json(kind, v))
            })
            .collect();

        let extra = object.get("extra_usage").filter(|v| is_present(v)).cloned();

        Self {
            windows,
            extra,
            fetched_at,
        }
    }

    pub fn window(&self, kind: UsageWindowKind) -> Option<&UsageWindow> {
        self.windows.iter().find(|w| w.kind == kind)
    }

    /// Reset marker used for reset-boundary detection
    pub fn five_hour_reset(&self) -> Option<&str> {
        self.window(UsageWindowKind::FiveHour)?.resets_at.as_deref()
    }
}
