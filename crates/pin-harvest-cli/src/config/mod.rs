//! Configuration loading and resolution.
//!
//! Precedence for every value: command-line flag, then environment where one
//! is documented, then the settings file, then the library default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use pin_harvest::HarvestOptions;

/// Persisted user settings (`settings.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Raw `Cookie` header copied from a logged-in browser.
    pub cookie_string: Option<String>,
    /// Pin page to harvest.
    pub target_url: Option<String>,
    pub proxy_url: Option<String>,
    pub output_root: Option<String>,
    pub ledger_path: Option<String>,
    pub max_iterations: Option<u32>,
    pub scroll_increment_px: Option<u32>,
    pub settle_delay_secs: Option<f64>,
    pub sentinel_text: Option<String>,
}

impl Settings {
    /// Load settings from `path`; a missing file yields empty settings.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No settings file at {}", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid settings file: {}", path.display()))
    }

    /// Write settings as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write settings: {}", path.display()))
    }
}

/// Per-run flag values that override the settings file.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub target_url: Option<String>,
    pub proxy_url: Option<String>,
    pub output_root: Option<String>,
    pub ledger_path: Option<String>,
    pub max_iterations: Option<u32>,
    pub scroll_increment_px: Option<u32>,
    pub settle_delay_secs: Option<f64>,
    pub sentinel_text: Option<String>,
    pub overwrite_existing: bool,
}

/// Check that `url` is an http(s) pin page.
pub fn validate_target_url(url: &str) -> Result<()> {
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        bail!("target URL must start with http:// or https://: {url}");
    }
    if !url.contains("/pin") {
        bail!("target URL must point at a pin page (contain /pin): {url}");
    }
    Ok(())
}

/// Merge flags, environment, and settings into library options.
pub fn build_options(settings: &Settings, overrides: &RunOverrides) -> Result<HarvestOptions> {
    let Some(target_url) = overrides
        .target_url
        .clone()
        .or_else(|| settings.target_url.clone())
    else {
        bail!("no target URL; pass --url or run `pin-harvest settings save --url ...`");
    };
    validate_target_url(&target_url)?;

    let ledger_path = resolve_ledger_path(
        overrides
            .ledger_path
            .as_deref()
            .or(settings.ledger_path.as_deref()),
    );
    let output_root = overrides
        .output_root
        .clone()
        .or_else(|| settings.output_root.clone())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("downloads"));

    let mut options = HarvestOptions::new(target_url, ledger_path, output_root);

    if let Some(n) = overrides.max_iterations.or(settings.max_iterations) {
        options.scroll.max_iterations = n;
    }
    if let Some(px) = overrides.scroll_increment_px.or(settings.scroll_increment_px) {
        options.scroll.increment_px = px;
    }
    if let Some(secs) = overrides.settle_delay_secs.or(settings.settle_delay_secs) {
        if !secs.is_finite() || secs < 0.0 {
            bail!("settle delay must be a non-negative number of seconds, got {secs}");
        }
        options.scroll.settle_delay = match Duration::try_from_secs_f64(secs) {
            Ok(delay) => delay,
            Err(e) => bail!("settle delay of {secs} seconds is out of range: {e}"),
        };
    }
    if let Some(text) = overrides
        .sentinel_text
        .clone()
        .or_else(|| settings.sentinel_text.clone())
    {
        options.scroll.sentinel_text = text;
    }

    options.fetch.proxy_url = resolve_proxy(
        overrides
            .proxy_url
            .as_deref()
            .or(settings.proxy_url.as_deref()),
    );
    options.overwrite_existing = overrides.overwrite_existing;

    options
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid options: {e}"))?;
    Ok(options)
}

/// Resolve the settings file path.
pub fn resolve_settings_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var("PIN_HARVEST_SETTINGS") {
        return PathBuf::from(env_path);
    }

    let cwd_settings = PathBuf::from("settings.json");
    if cwd_settings.exists() {
        return cwd_settings;
    }

    data_dir().join("settings.json")
}

/// Resolve the ledger database path.
pub fn resolve_ledger_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var("PIN_HARVEST_LEDGER") {
        return PathBuf::from(env_path);
    }

    data_dir().join("ledger.db")
}

/// Proxy from the flag/settings value, else `PROXY_URL`. Blank means none.
pub fn resolve_proxy(explicit: Option<&str>) -> Option<String> {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var("PROXY_URL").ok())
        .filter(|p| !p.trim().is_empty())
}

fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pin-harvest")
}
