//! Progress events streamed to the caller during one synchronization run.
//!
//! Ordering matters: percentages are non-decreasing within a run and the final
//! event is exactly one of `Complete` or `Error`. Events are ephemeral; a
//! caller that disconnects mid-run must re-read the quote's status from the
//! CRM to learn the outcome.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress {
        label: String,
        percent: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        link: Option<String>,
    },
    Complete {
        success: bool,
        quote_url: Option<String>,
        pdf_url: Option<String>,
        correlation_id: String,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }

    pub fn percent(&self) -> Option<u8> {
        match self {
            Self::Progress { percent, .. } => Some(*percent),
            _ => None,
        }
    }
}

/// Guards the percentage monotonicity invariant. Steps report their nominal
/// percentage and the tracker clamps it so a late or reordered report can never
/// move the bar backwards.
#[derive(Clone, Debug, Default)]
pub struct ProgressTracker {
    last_percent: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&mut self, label: impl Into<String>, percent: u8) -> ProgressEvent {
        self.progress_with_link(label, percent, None)
    }

    pub fn progress_with_link(
        &mut self,
        label: impl Into<String>,
        percent: u8,
        link: Option<String>,
    ) -> ProgressEvent {
        let clamped = percent.clamp(self.last_percent, 100);
        self.last_percent = clamped;
        ProgressEvent::Progress { label: label.into(), percent: clamped, link }
    }
}
