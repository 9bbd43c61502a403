//! PinHarvest — scroll-driven image harvesting with a persistent dedup ledger.

pub mod config;
pub mod extractor;
pub mod fetcher;
pub mod ledger;
pub mod locator;
pub mod orchestrator;
pub mod pipeline;
pub mod run_dir;
pub mod session;
pub mod types;

pub use config::{FetchOptions, HarvestOptions, ScrollOptions};
pub use extractor::{parse_srcset, VariantExtractor};
pub use fetcher::{file_name_from_url, AssetFetcher};
pub use ledger::DedupLedger;
pub use locator::{choose_strategy, ContainerLocator, Located};
pub use orchestrator::{ScrollCursor, ScrollOrchestrator};
pub use pipeline::harvest;
pub use run_dir::RunDirectory;
pub use session::chromium::{ChromiumSession, LaunchOptions};
pub use session::{parse_cookie_string, BrowserSession, CookiePair};
pub use types::*;
