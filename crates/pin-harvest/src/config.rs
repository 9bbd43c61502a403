//! Explicit options passed into the pipeline.
//!
//! Nothing in the core reads the environment; hosts build a [`HarvestOptions`]
//! and hand it to [`crate::harvest`].

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{HarvestError, HarvestResult};

/// Default distance of the first scroll step, in pixels.
pub const DEFAULT_SCROLL_INCREMENT_PX: u32 = 1000;

/// Default pause after each scroll for lazy content to render.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Default number of scroll iterations.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Heading text the page shows once the feed stops loading new pins.
pub const DEFAULT_SENTINEL_TEXT: &str = "More to explore";

/// Desktop user-agent sent with asset requests.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Referer sent with asset requests.
pub const DEFAULT_REFERER: &str = "https://www.pinterest.com/";

/// Per-request timeout for asset downloads.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Scroll loop tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollOptions {
    pub increment_px: u32,
    #[serde(with = "duration_secs")]
    pub settle_delay: Duration,
    pub max_iterations: u32,
    pub sentinel_text: String,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            increment_px: DEFAULT_SCROLL_INCREMENT_PX,
            settle_delay: DEFAULT_SETTLE_DELAY,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            sentinel_text: DEFAULT_SENTINEL_TEXT.to_string(),
        }
    }
}

/// HTTP settings for the asset fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    pub proxy_url: Option<String>,
    pub user_agent: String,
    pub referer: String,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            proxy_url: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Everything one harvest invocation needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestOptions {
    pub target_url: String,
    pub ledger_path: PathBuf,
    /// Parent of the per-run timestamped directories.
    pub output_root: PathBuf,
    #[serde(default)]
    pub scroll: ScrollOptions,
    #[serde(default)]
    pub fetch: FetchOptions,
    /// Re-download single-source images the ledger already knows.
    #[serde(default)]
    pub overwrite_existing: bool,
}

impl HarvestOptions {
    /// Options with default tuning for the given target and storage paths.
    pub fn new(
        target_url: impl Into<String>,
        ledger_path: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            target_url: target_url.into(),
            ledger_path: ledger_path.into(),
            output_root: output_root.into(),
            scroll: ScrollOptions::default(),
            fetch: FetchOptions::default(),
            overwrite_existing: false,
        }
    }

    /// Reject option values the pipeline cannot run with.
    pub fn validate(&self) -> HarvestResult<()> {
        let parsed = url::Url::parse(&self.target_url).map_err(|e| {
            HarvestError::InvalidConfig(format!("target URL '{}': {e}", self.target_url))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(HarvestError::InvalidConfig(format!(
                "target URL must be http(s), got '{}'",
                parsed.scheme()
            )));
        }
        if self.scroll.increment_px == 0 {
            return Err(HarvestError::InvalidConfig(
                "scroll increment must be greater than zero".into(),
            ));
        }
        if let Some(proxy) = &self.fetch.proxy_url {
            url::Url::parse(proxy)
                .map_err(|e| HarvestError::InvalidConfig(format!("proxy URL '{proxy}': {e}")))?;
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("duration must be a non-negative number of seconds"));
        }
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = HarvestOptions::new("https://www.pinterest.com/pin/1/", "l.db", "out");
        assert_eq!(opts.scroll.increment_px, 1000);
        assert_eq!(opts.scroll.settle_delay, Duration::from_secs(5));
        assert_eq!(opts.scroll.max_iterations, 10);
        assert_eq!(opts.fetch.timeout, Duration::from_secs(10));
        assert!(opts.fetch.proxy_url.is_none());
        assert!(!opts.overwrite_existing);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut opts = HarvestOptions::new("not a url", "l.db", "out");
        assert!(opts.validate().is_err());

        opts.target_url = "ftp://example.com/pin/1".into();
        assert!(opts.validate().is_err());

        opts.target_url = "https://example.com/pin/1".into();
        opts.scroll.increment_px = 0;
        assert!(opts.validate().is_err());

        opts.scroll.increment_px = 500;
        opts.fetch.proxy_url = Some("::nope".into());
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_scroll_options_deserialize_partial() {
        let scroll: ScrollOptions =
            serde_json::from_str(r#"{"settle_delay": 0.5, "max_iterations": 3}"#).unwrap();
        assert_eq!(scroll.settle_delay, Duration::from_millis(500));
        assert_eq!(scroll.max_iterations, 3);
        assert_eq!(scroll.increment_px, DEFAULT_SCROLL_INCREMENT_PX);
        assert_eq!(scroll.sentinel_text, DEFAULT_SENTINEL_TEXT);
    }

    #[test]
    fn test_scroll_options_reject_out_of_range_delay() {
        assert!(serde_json::from_str::<ScrollOptions>(r#"{"settle_delay": 1e30}"#).is_err());
        assert!(serde_json::from_str::<ScrollOptions>(r#"{"settle_delay": -1}"#).is_err());
    }
}
