//! Configuration Module
//!
//! Connection parameters and ambient bridge settings. Both are loaded once at
//! startup and never reloaded.

mod params;
mod settings;

pub use params::{ConfigError, load_params_file, load_params_from_string};
pub use settings::{
    BridgeSettings, DEFAULT_PROVIDER, EventHubSettings, ReconnectSettings,
};
