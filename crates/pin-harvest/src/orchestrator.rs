//! Scroll-driven control loop.
//!
//! ```text
//! Initializing -> Extracting -> (Scrolling -> Waiting -> Extracting)* -> Terminated
//! ```
//!
//! Each iteration scrolls to `increment * iteration`, so the step grows as
//! the loop advances. Only containers past the previously known count are
//! processed after the first pass. When the sentinel heading shows up the
//! loop takes one last scroll to the bottom, processes that suffix, and
//! stops early.

use crate::config::ScrollOptions;
use crate::extractor::VariantExtractor;
use crate::locator::ContainerLocator;
use crate::session::BrowserSession;
use crate::types::{HarvestError, HarvestReport, HarvestResult};

/// Script that jumps to the bottom of the document.
pub const SCROLL_TO_BOTTOM_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight)";

/// Script that scrolls to an absolute vertical offset.
pub fn scroll_to_script(offset_px: u64) -> String {
    format!("window.scrollTo(0, {offset_px})")
}

/// Script that reports whether any heading contains `text`.
pub fn sentinel_probe_script(text: &str) -> String {
    let literal = serde_json::Value::String(text.to_string());
    format!(
        "Array.from(document.querySelectorAll('h1, h2, h3, h4'))\
         .some(h => (h.textContent || '').includes({literal}))"
    )
}

/// Loop state for one orchestration call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScrollCursor {
    pub iteration: u32,
    pub known_containers: usize,
    pub terminated: bool,
}

/// Drives scrolling, location, and extraction until the feed is exhausted.
pub struct ScrollOrchestrator {
    options: ScrollOptions,
    locator: ContainerLocator,
}

impl ScrollOrchestrator {
    pub fn new(options: ScrollOptions) -> Self {
        Self {
            options,
            locator: ContainerLocator::new(),
        }
    }

    /// Run the loop against `session`, filling `report` as it goes.
    ///
    /// Only navigation can fail; everything after that is logged and
    /// contained.
    pub async fn run<S: BrowserSession>(
        &self,
        session: &S,
        target_url: &str,
        extractor: &VariantExtractor<'_>,
        report: &mut HarvestReport,
    ) -> HarvestResult<ScrollCursor> {
        if session.is_closed() {
            tracing::warn!("Page is already closed, cannot navigate");
            return Err(HarvestError::NavigationFailure(format!(
                "page closed before navigating to {target_url}"
            )));
        }
        session.navigate(target_url).await.map_err(|e| match e {
            HarvestError::NavigationFailure(_) => e,
            other => HarvestError::NavigationFailure(other.to_string()),
        })?;
        tracing::info!("Loaded {target_url}");

        let mut cursor = ScrollCursor {
            known_containers: self.extract_suffix(session, extractor, 0, report).await,
            ..ScrollCursor::default()
        };

        tracing::debug!("Scrolling to load more content");
        let step = u64::from(self.options.increment_px);
        while cursor.iteration < self.options.max_iterations {
            cursor.iteration += 1;

            let offset = step * u64::from(cursor.iteration);
            tracing::debug!("Scrolling to {offset}px (iteration {})", cursor.iteration);
            self.scroll_and_settle(session, &scroll_to_script(offset)).await;

            cursor.known_containers = self
                .extract_suffix(session, extractor, cursor.known_containers, report)
                .await;
            report.scroll_cycles += 1;

            if self.sentinel_visible(session).await {
                tracing::info!(
                    "End-of-content marker found at iteration {}, final pass",
                    cursor.iteration
                );
                report.sentinel_reached = true;
                self.scroll_and_settle(session, SCROLL_TO_BOTTOM_SCRIPT).await;
                cursor.known_containers = self
                    .extract_suffix(session, extractor, cursor.known_containers, report)
                    .await;
                report.scroll_cycles += 1;
                break;
            }
        }

        cursor.terminated = true;
        tracing::info!(
            "Harvest loop finished after {} scroll cycles ({} containers seen)",
            report.scroll_cycles,
            cursor.known_containers
        );
        Ok(cursor)
    }

    async fn scroll_and_settle<S: BrowserSession>(&self, session: &S, script: &str) {
        if let Err(e) = session.evaluate(script).await {
            tracing::warn!("Scroll failed: {e}");
        }
        tokio::time::sleep(self.options.settle_delay).await;
    }

    /// Re-locate containers and process those past `known`. Returns the new
    /// known count; a locate failure keeps the old one.
    async fn extract_suffix<S: BrowserSession>(
        &self,
        session: &S,
        extractor: &VariantExtractor<'_>,
        known: usize,
        report: &mut HarvestReport,
    ) -> usize {
        let located = match self.locator.locate(session).await {
            Ok(located) => located,
            Err(e) => {
                tracing::warn!("Could not locate containers: {e}");
                return known;
            }
        };

        let total = located.containers.len();
        report.strategy = Some(located.strategy);
        let fresh = located.containers.get(known..).unwrap_or(&[]);
        tracing::debug!("{} containers on page, {} new", total, fresh.len());

        let outcomes = extractor.extract_all(session, fresh).await;
        report.record(&outcomes);
        total
    }

    async fn sentinel_visible<S: BrowserSession>(&self, session: &S) -> bool {
        match session
            .evaluate(&sentinel_probe_script(&self.options.sentinel_text))
            .await
        {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(e) => {
                tracing::warn!("Sentinel check failed: {e}");
                false
            }
        }
    }
}
