//! Merge rules: defaults, override order, conflict handling.
//!
//! Sources are layered lowest to highest: defaults, global file, workspace files,
//! environment. A key set by a later source replaces the earlier value outright;
//! lists are replaced, never concatenated.

use crate::config::{DEFAULT_CLIENT, DEFAULT_ENDPOINT};
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("generation.enabled", true)?
        .set_default("generation.client", DEFAULT_CLIENT)?
        .set_default("generation.endpoint", DEFAULT_ENDPOINT)?
        .set_default("generation.temperature", 1.0)?
        .set_default("generation.request_timeout_secs", 80)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")
}
