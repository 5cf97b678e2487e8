//! Owner of the last good usage snapshot and the five-hour reset detector

use chrono::{DateTime, Local, Utc};

use crate::providers::FetchError;
use crate::usage::UsageSnapshot;
use crate::view::{compact_summary, DetailView, FullView, ViewModel};

/// Result of applying a fresh snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    /// The five-hour window moved to a new reset boundary
    pub reset_crossed: bool,
}

/// Mutated only from the session loop.
#[derive(Debug)]
pub struct Reconciler {
    snapshot: Option<UsageSnapshot>,
    last_five_hour_reset: Option<String>,
    error: Option<String>,
    status: String,
    refresh_secs: u64,
}

impl Reconciler {
    pub fn new(refresh_secs: u64) -> Self {
        Self {
            snapshot: None,
            last_five_hour_reset: None,
            error: None,
            status: crate::view::LOADING.to_string(),
            refresh_secs,
        }
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Option<&UsageSnapshot> {
        self.snapshot.as_ref()
    }

    /// Replace the stored snapshot and report whether a reset boundary was crossed.
    ///
    /// A crossing needs a previously recorded five-hour `resets_at` that differs
    /// from the new one. Snapshots without one leave the recorded value alone.
    pub fn apply_snapshot(&mut self, snapshot: UsageSnapshot) -> Reconciled {
        let mut reset_crossed = false;
        if let Some(current) = snapshot.five_hour_reset() {
            if let Some(previous) = &self.last_five_hour_reset {
                reset_crossed = previous != current;
            }
            self.last_five_hour_reset = Some(current.to_string());
        }

        let local: DateTime<Local> = snapshot.fetched_at.with_timezone(&Local);
        self.status = format!(
            "Updated: {} | Refresh: {}s",
            local.format("%H:%M:%S"),
            self.refresh_secs
        );
        self.snapshot = Some(snapshot);
        self.error = None;

        Reconciled { reset_crossed }
    }

    /// Record a failed fetch. The stored snapshot is left untouched.
    pub fn apply_failure(&mut self, error: &FetchError) {
        self.error = Some(error.to_string());
        self.status = "Error".to_string();
    }

    /// Terminal failure before polling could start (credentials, organization)
    pub fn apply_fatal(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.status = "Error".to_string();
    }

    /// Progress text shown while starting up
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Derive the full view-model. An error replaces the detail view; the
    /// compact summary keeps showing the last good snapshot.
    pub fn view(&self, now: DateTime<Utc>, compact_mode: bool) -> ViewModel {
        let detail = match (&self.error, &self.snapshot) {
            (Some(error), _) => DetailView::Error(error.clone()),
            (None, Some(snapshot)) => DetailView::Usage(FullView::project(snapshot, now)),
            (None, None) => DetailView::Loading,
        };

        ViewModel {
            detail,
            compact: compact_summary(self.snapshot.as_ref(), now),
            status: self.status.clone(),
            error: self.error.clone(),
            compact_mode,
        }
    }
}
