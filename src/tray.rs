//! Tray label and tooltip derived from the current view-model

use crate::view::{ViewModel, WarningTier, LOADING};

const TITLE: &str = "Claude Usage";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayStatus {
    Ok { summary: String },
    Warning { summary: String },
    Error { message: String, summary: String },
}

impl TrayStatus {
    pub fn from_view(view: &ViewModel) -> Self {
        let summary = view.compact.clone();
        if let Some(message) = &view.error {
            return TrayStatus::Error {
                message: message.clone(),
                summary,
            };
        }
        match view.worst_tier() {
            WarningTier::Normal => TrayStatus::Ok { summary },
            WarningTier::Warning | WarningTier::Critical => TrayStatus::Warning { summary },
        }
    }

    /// Short text next to the tray icon. On error the last good summary stays visible.
    pub fn label(&self) -> String {
        match self {
            TrayStatus::Ok { summary } => summary.clone(),
            TrayStatus::Warning { summary } => format!("⚠️ {}", summary),
            TrayStatus::Error { summary, .. } if summary == LOADING => "⚠️ Error".to_string(),
            TrayStatus::Error { summary, .. } => format!("⚠️ {}", summary),
        }
    }

    pub fn tooltip(&self) -> String {
        match self {
            TrayStatus::Ok { summary } => format!("{}\n{}", TITLE, summary),
            TrayStatus::Warning { summary } => format!("{}\n⚠️ {}", TITLE, summary),
            TrayStatus::Error { message, .. } => format!("{}\n❌ {}", TITLE, message),
        }
    }
}
