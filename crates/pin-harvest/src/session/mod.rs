//! Browser session abstraction consumed by the pipeline.
//!
//! Defines the `BrowserSession` trait, the only view the pipeline has of the
//! page. Elements are opaque handles owned by the implementation.

pub mod chromium;

use async_trait::async_trait;

use crate::types::HarvestResult;

/// A live page the pipeline can navigate, query, and script.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Opaque handle to one DOM element.
    type Element: Send + Sync;

    /// Load `url` in the page.
    async fn navigate(&self, url: &str) -> HarvestResult<()>;
    /// All elements matching `selector`, in document order.
    async fn query_all(&self, selector: &str) -> HarvestResult<Vec<Self::Element>>;
    /// First descendant of `element` matching `selector`.
    async fn query_selector(
        &self,
        element: &Self::Element,
        selector: &str,
    ) -> HarvestResult<Option<Self::Element>>;
    /// Value of attribute `name` on `element`, if set.
    async fn get_attribute(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> HarvestResult<Option<String>>;
    /// Evaluate a script in the page and return its JSON result.
    async fn evaluate(&self, script: &str) -> HarvestResult<serde_json::Value>;
    /// Whether the page can no longer be driven.
    fn is_closed(&self) -> bool;
}

/// A cookie copied from a browser's `Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePair {
    pub name: String,
    pub value: String,
}

/// Parse `name=value; name2=value2` into cookie pairs.
///
/// Pairs without `=` are dropped; values may themselves contain `=`.
pub fn parse_cookie_string(raw: &str) -> Vec<CookiePair> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(CookiePair {
                name: name.to_string(),
                value: value.trim().to_string(),
            })
        })
        .collect()
}
