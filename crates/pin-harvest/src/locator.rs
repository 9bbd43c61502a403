//! Picks the CSS strategy that matches the current pin layout.

use crate::session::BrowserSession;
use crate::types::{HarvestResult, LayoutStrategy};

/// Containers found on the page and the strategy that found them.
pub struct Located<E> {
    pub strategy: LayoutStrategy,
    pub containers: Vec<E>,
}

/// Choose between the grid-item and video-pin strategies by match count.
///
/// Equal non-zero counts go to the grid-item strategy. `None` means neither
/// matched and the caller should use the narrow fallback.
pub fn choose_strategy(grid_items: usize, video_pins: usize) -> Option<LayoutStrategy> {
    if grid_items == 0 && video_pins == 0 {
        None
    } else if video_pins > grid_items {
        Some(LayoutStrategy::VideoPin)
    } else {
        Some(LayoutStrategy::GridItem)
    }
}

/// Locates pin containers in the current DOM snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContainerLocator;

impl ContainerLocator {
    pub fn new() -> Self {
        Self
    }

    /// Query both primary strategies, keep the larger match set, and fall
    /// back to the non-story selector when both are empty.
    pub async fn locate<S: BrowserSession>(
        &self,
        session: &S,
    ) -> HarvestResult<Located<S::Element>> {
        let grid = session.query_all(LayoutStrategy::GridItem.selector()).await?;
        let video = session.query_all(LayoutStrategy::VideoPin.selector()).await?;

        let located = match choose_strategy(grid.len(), video.len()) {
            Some(LayoutStrategy::VideoPin) => Located {
                strategy: LayoutStrategy::VideoPin,
                containers: video,
            },
            Some(strategy) => Located {
                strategy,
                containers: grid,
            },
            None => Located {
                strategy: LayoutStrategy::NonStoryPinImage,
                containers: session
                    .query_all(LayoutStrategy::NonStoryPinImage.selector())
                    .await?,
            },
        };

        tracing::debug!(
            "Found {} containers with {:?} strategy",
            located.containers.len(),
            located.strategy
        );
        Ok(located)
    }
}
