//! Core data types for ledger records, per-container outcomes, and run reports.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A ledger row: one asset URL and the run that first saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub url: String,
    pub resolution_descriptor: Option<String>,
    pub origin_run_directory: String,
}

/// One `url descriptor` entry parsed from a responsive candidate list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub url: String,
    pub descriptor: Option<String>,
}

/// Why a container was passed over without a download attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// The container holds no inner image element.
    NoImageElement,
    /// The image carries neither a candidate list nor a single source.
    NoSourceAttribute,
    /// The browser could not answer a query about this container.
    Unreadable(String),
    /// The ledger could not be read or written for this container.
    LedgerError(String),
}

/// Result of processing one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadOutcome {
    Downloaded { url: String, file_name: String },
    Failed { url: String },
    AlreadyCollected { url: String, origin_run_directory: String },
    Skipped(SkipReason),
}

/// Which CSS strategy matched the page layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutStrategy {
    /// Generic grid item marker.
    GridItem,
    /// Video pin marker.
    VideoPin,
    /// Narrow fallback for non-story pin images.
    NonStoryPinImage,
}

impl LayoutStrategy {
    /// CSS selector for this strategy.
    pub fn selector(self) -> &'static str {
        match self {
            LayoutStrategy::GridItem => r#"[data-grid-item="true"]"#,
            LayoutStrategy::VideoPin => r#"[data-test-id="pinrep-video"]"#,
            LayoutStrategy::NonStoryPinImage => r#"[data-test-id="non-story-pin-image"]"#,
        }
    }
}

/// Summary of one harvest invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestReport {
    pub run_directory: PathBuf,
    pub strategy: Option<LayoutStrategy>,
    /// Scroll+extract cycles, including the final scroll-to-bottom pass.
    pub scroll_cycles: u32,
    pub sentinel_reached: bool,
    pub containers_processed: usize,
    pub downloaded: usize,
    pub already_collected: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl HarvestReport {
    /// Fold a batch of container outcomes into the tallies.
    pub fn record(&mut self, outcomes: &[DownloadOutcome]) {
        self.containers_processed += outcomes.len();
        for outcome in outcomes {
            match outcome {
                DownloadOutcome::Downloaded { .. } => self.downloaded += 1,
                DownloadOutcome::AlreadyCollected { .. } => self.already_collected += 1,
                DownloadOutcome::Failed { .. } => self.failed += 1,
                DownloadOutcome::Skipped(_) => self.skipped += 1,
            }
        }
    }
}

/// Errors that can occur in the harvest pipeline.
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    #[error("Navigation failed: {0}")]
    NavigationFailure(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience result type.
pub type HarvestResult<T> = Result<T, HarvestError>;
