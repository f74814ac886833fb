//! # roomlog-settings
//!
//! Layered configuration for the room event log.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RoomLogSettings::default()`]
//! 2. **User file**: `~/.roomlog/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `ROOMLOG_*` overrides (highest priority)
//!
//! Components take their settings by value at construction; the global
//! accessor exists for the embedding binary only.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings, load_settings_from_path, resolve_db_path, settings_path,
};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<RoomLogSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.roomlog/settings.json` with env var
/// overrides, falling back to compiled defaults if loading fails.
pub fn get_settings() -> &'static RoomLogSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// # Errors
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: RoomLogSettings) -> std::result::Result<(), RoomLogSettings> {
    SETTINGS.set(settings)
}
