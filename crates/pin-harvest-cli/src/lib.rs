//! PinHarvest command-line host — settings resolution for the `pin-harvest` binary.

pub mod config;

pub use config::{
    build_options, resolve_ledger_path, resolve_proxy, resolve_settings_path,
    validate_target_url, RunOverrides, Settings,
};
