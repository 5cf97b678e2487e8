//! Pure projection of a usage snapshot into what the presentation layer shows

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::usage::{UsageSnapshot, UsageWindow, UsageWindowKind};

pub const LOADING: &str = "Loading...";
pub const NO_DATA: &str = "No data";
pub const UNKNOWN_RESET: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningTier {
    Normal,
    Warning,
    Critical,
}

impl WarningTier {
    pub fn for_fraction(fraction: f64) -> Self {
        if fraction > 0.9 {
            WarningTier::Critical
        } else if fraction > 0.7 {
            WarningTier::Warning
        } else {
            WarningTier::Normal
        }
    }
}

/// Share of the window consumed, always within [0, 1]
pub fn fraction(utilization: f64) -> f64 {
    let f = utilization / 100.0;
    if f.is_finite() {
        f.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Time until `resets_at` as `2h15m` / `15m`; `unknown` when absent or unparsable
pub fn format_reset(window: &UsageWindow, now: DateTime<Utc>) -> String {
    let Some(reset) = window.resets_at_time() else {
        return UNKNOWN_RESET.to_string();
    };
    let secs = (reset - now).num_seconds().max(0);
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    if hours > 0 {
        format!("{}h{}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowView {
    pub kind: UsageWindowKind,
    pub label: &'static str,
    /// e.g. `42%`
    pub percent: String,
    pub fraction: f64,
    /// e.g. `Resets in 2h15m`
    pub reset: String,
    pub tier: WarningTier,
}

impl WindowView {
    pub fn project(window: &UsageWindow, now: DateTime<Utc>) -> Self {
        let fraction = fraction(window.utilization);
        Self {
            kind: window.kind,
            label: window.kind.label(),
            percent: format!("{:.0}%", window.utilization),
            fraction,
            reset: format!("Resets in {}", format_reset(window, now)),
            tier: WarningTier::for_fraction(fraction),
        }
    }
}

/// One generic key/value line of the pass-through payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtraField {
    pub key: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullView {
    pub windows: Vec<WindowView>,
    pub extra: Vec<ExtraField>,
}

impl FullView {
    pub fn project(snapshot: &UsageSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            windows: snapshot
                .windows
                .iter()
                .map(|w| WindowView::project(w, now))
                .collect(),
            extra: snapshot.extra.as_ref().map(extra_fields).unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty() && self.extra.is_empty()
    }

    pub fn worst_tier(&self) -> WarningTier {
        self.windows
            .iter()
            .map(|w| w.tier)
            .max()
            .unwrap_or(WarningTier::Normal)
    }
}

fn extra_fields(extra: &Value) -> Vec<ExtraField> {
    match extra {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| ExtraField {
                key: Some(title_case(key)),
                value: display_value(value),
            })
            .collect(),
        other => vec![ExtraField {
            key: None,
            value: display_value(other),
        }],
    }
}

/// `monthly_credit_limit` -> `Monthly Credit Limit`
fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}

/// Single-line summary for compact mode and the tray label
pub fn compact_summary(snapshot: Option<&UsageSnapshot>, now: DateTime<Utc>) -> String {
    let Some(snapshot) = snapshot else {
        return LOADING.to_string();
    };

    let mut parts = Vec::new();
    if let Some(window) = snapshot.window(UsageWindowKind::FiveHour) {
        parts.push(format!(
            "5h: {:.0}% ({})",
            window.utilization,
            format_reset(window, now)
        ));
    }
    if let Some(window) = snapshot.window(UsageWindowKind::SevenDay) {
        parts.push(format!("7d: {:.0}%", window.utilization));
    }

    if parts.is_empty() {
        NO_DATA.to_string()
    } else {
        parts.join(" | ")
    }
}

/// Content of the detail area
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "lowercase")]
pub enum DetailView {
    Loading,
    Usage(FullView),
    Error(String),
}

/// Everything the presentation layer needs; published as one value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewModel {
    pub detail: DetailView,
    pub compact: String,
    pub status: String,
    /// Last error, kept alongside the retained compact summary
    pub error: Option<String>,
    pub compact_mode: bool,
}

impl Default for ViewModel {
    fn default() -> Self {
        Self {
            detail: DetailView::Loading,
            compact: LOADING.to_string(),
            status: LOADING.to_string(),
            error: None,
            compact_mode: false,
        }
    }
}

impl ViewModel {
    pub fn worst_tier(&self) -> WarningTier {
        match &self.detail {
            DetailView::Usage(full) => full.worst_tier(),
            _ => WarningTier::Normal,
        }
    }
}

const BAR_WIDTH: usize = 20;

impl fmt::Display for WindowView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filled = (self.fraction * BAR_WIDTH as f64).round() as usize;
        let marker = match self.tier {
            WarningTier::Normal => ' ',
            WarningTier::Warning => '!',
            WarningTier::Critical => '#',
        };
        writeln!(f, "{:<16}{:>6}", self.label, self.percent)?;
        writeln!(
            f,
            "[{}{}]{}",
            "=".repeat(filled),
            " ".repeat(BAR_WIDTH - filled),
            marker
        )?;
        write!(f, "{}", self.reset)
    }
}

impl fmt::Display for DetailView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetailView::Loading => write!(f, "{}", LOADING),
            DetailView::Error(message) => write!(f, "Error: {}", message),
            DetailView::Usage(full) if full.is_empty() => write!(f, "{}", NO_DATA),
            DetailView::Usage(full) => {
                for window in &full.windows {
                    writeln!(f, "{}", window)?;
                }
                if !full.extra.is_empty() {
                    writeln!(f, "Extra Usage")?;
                    for field in &full.extra {
                        match &field.key {
                            Some(key) => writeln!(f, "  {}: {}", key, field.value)?,
                            None => writeln!(f, "  {}", field.value)?,
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    fn window(kind: UsageWindowKind, utilization: f64, resets_at: Option<&str>) -> UsageWindow {
        UsageWindow {
            kind,
            utilization,
            resets_at: resets_at.map(str::to_string),
        }
    }

    #[test]
    fn test_tiers() {
        assert_eq!(WarningTier::for_fraction(0.0), WarningTier::Normal);
        assert_eq!(WarningTier::for_fraction(0.7), WarningTier::Normal);
        assert_eq!(WarningTier::for_fraction(0.71), WarningTier::Warning);
        assert_eq!(WarningTier::for_fraction(0.9), WarningTier::Warning);
        assert_eq!(WarningTier::for_fraction(0.91), WarningTier::Critical);
    }

    #[test]
    fn test_fraction_is_clamped() {
        assert_eq!(fraction(42.0), 0.42);
        assert_eq!(fraction(250.0), 1.0);
        assert_eq!(fraction(-5.0), 0.0);
        assert_eq!(fraction(f64::NAN), 0.0);
        assert_eq!(fraction(f64::INFINITY), 0.0);
    }

    #[test]
    fn test_format_reset() {
        let now = at("2025-01-01T07:45:00+00:00");
        let w = window(UsageWindowKind::FiveHour, 1.0, Some("2025-01-01T10:00:00+00:00"));
        assert_eq!(format_reset(&w, now), "2h15m");

        let w = window(UsageWindowKind::FiveHour, 1.0, Some("2025-01-01T08:00:30+00:00"));
        assert_eq!(format_reset(&w, now), "15m");

        let w = window(UsageWindowKind::FiveHour, 1.0, Some("2025-01-01T07:00:00+00:00"));
        assert_eq!(format_reset(&w, now), "0m");

        let w = window(UsageWindowKind::FiveHour, 1.0, Some("not a date"));
        assert_eq!(format_reset(&w, now), "unknown");

        let w = window(UsageWindowKind::FiveHour, 1.0, None);
        assert_eq!(format_reset(&w, now), "unknown");
    }

    #[test]
    fn test_window_view_over_limit() {
        let now = at("2025-01-01T08:00:00+00:00");
        let view = WindowView::project(&window(UsageWindowKind::SevenDayOpus, 130.0, None), now);
        assert_eq!(view.percent, "130%");
        assert_eq!(view.fraction, 1.0);
        assert_eq!(view.tier, WarningTier::Critical);
        assert_eq!(view.reset, "Resets in unknown");
        assert_eq!(view.label, "Opus (7-Day)");
    }

    #[test]
    fn test_compact_summary() {
        let now = at("2025-01-01T07:45:00+00:00");
        assert_eq!(compact_summary(None, now), "Loading...");

        let mut snapshot = UsageSnapshot::empty(now);
        assert_eq!(compact_summary(Some(&snapshot), now), "No data");

        snapshot.windows = vec![
            window(UsageWindowKind::FiveHour, 42.0, Some("2025-01-01T10:00:00+00:00")),
            window(UsageWindowKind::SevenDay, 12.4, None),
            window(UsageWindowKind::SevenDayOpus, 99.0, None),
        ];
        assert_eq!(compact_summary(Some(&snapshot), now), "5h: 42% (2h15m) | 7d: 12%");
    }

    #[test]
    fn test_full_view_with_extra() {
        let now = at("2025-01-01T08:00:00+00:00");
        let mut snapshot = UsageSnapshot::empty(now);
        snapshot.windows = vec![window(UsageWindowKind::SevenDay, 75.0, None)];
        snapshot.extra = Some(json!({"monthly_limit": 100, "is_enabled": true, "note": "hi"}));

        let view = FullView::project(&snapshot, now);
        assert_eq!(view.worst_tier(), WarningTier::Warning);
        assert_eq!(
            view.extra,
            vec![
                ExtraField {
                    key: Some("Is Enabled".into()),
                    value: "true".into()
                },
                ExtraField {
                    key: Some("Monthly Limit".into()),
                    value: "100".into()
                },
                ExtraField {
                    key: Some("Note".into()),
                    value: "hi".into()
                },
            ]
        );
    }

    #[test]
    fn test_extra_scalar_is_unlabeled() {
        let fields = extra_fields(&json!("plain"));
        assert_eq!(
            fields,
            vec![ExtraField {
                key: None,
                value: "plain".into()
            }]
        );
    }

    #[test]
    fn test_detail_display() {
        let now = at("2025-01-01T08:00:00+00:00");
        let empty = DetailView::Usage(FullView::project(&UsageSnapshot::empty(now), now));
        assert_eq!(empty.to_string(), "No data");
        assert_eq!(DetailView::Error("boom".into()).to_string(), "Error: boom");

        let mut snapshot = UsageSnapshot::empty(now);
        snapshot.windows = vec![window(UsageWindowKind::FiveHour, 50.0, None)];
        let text = DetailView::Usage(FullView::project(&snapshot, now)).to_string();
        assert!(text.contains("5-Hour Usage"));
        assert!(text.contains("50%"));
        assert!(text.contains("[==========          ]"));
    }
}
