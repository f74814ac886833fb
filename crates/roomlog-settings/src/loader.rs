//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RoomLogSettings::default()`]
//! 2. If `~/.roomlog/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::RoomLogSettings;

/// Resolve the roomlog home directory (`~/.roomlog`).
pub fn roomlog_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".roomlog")
}

/// Resolve the path to the settings file (`~/.roomlog/settings.json`).
pub fn settings_path() -> PathBuf {
    roomlog_home().join("settings.json")
}

/// Resolve the configured database path against `~/.roomlog`.
pub fn resolve_db_path(settings: &RoomLogSettings) -> PathBuf {
    let configured = Path::new(&settings.store.db_path);
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        roomlog_home().join(configured)
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RoomLogSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RoomLogSettings> {
    let defaults = serde_json::to_value(RoomLogSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RoomLogSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (file/default value stays).
pub fn apply_env_overrides(settings: &mut RoomLogSettings) {
    if let Some(v) = read_env_string("ROOMLOG_LOCAL_SOURCE") {
        settings.local_source = v;
    }
    if let Some(v) = read_env_string("ROOMLOG_DB_PATH") {
        settings.store.db_path = v;
    }
    if let Some(v) = read_env_u32("ROOMLOG_POOL_SIZE", 1, 256) {
        settings.store.pool_size = v;
    }
    if let Some(v) = read_env_u64("ROOMLOG_TTL_SWEEP_INTERVAL_MS", 1000, 86_400_000) {
        settings.retention.ttl_sweep_interval_ms = v;
    }
    if let Some(v) = read_env_string("ROOMLOG_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("ROOMLOG_LOG_JSON") {
        settings.logging.json = v;
    }
}

/// Reject settings the store cannot run with.
pub fn validate(settings: &RoomLogSettings) -> Result<()> {
    let invalid = |key, reason| Err(SettingsError::Invalid { key, reason });
    if settings.local_source.trim().is_empty() {
        return invalid("localSource", "must not be empty");
    }
    if settings.store.pool_size == 0 {
        return invalid("store.poolSize", "must be at least 1");
    }
    if settings.retention.ttl_sweep_interval_ms == 0 {
        return invalid("retention.ttlSweepIntervalMs", "must be positive");
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}
