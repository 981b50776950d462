//! Engine configuration.
//!
//! A single JSON document with one section per component. Every field has a
//! default, so an absent file or an empty object yields a working engine.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default tracking parameters stripped from page URLs. A trailing `*` matches by prefix.
const DEFAULT_TRACKING_PARAMS: &[&str] = &[
    "utm_*",
    "fbclid",
    "gclid",
    "dclid",
    "msclkid",
    "yclid",
    "igshid",
    "mc_cid",
    "mc_eid",
    "_ga",
    "_gl",
    "ref",
    "ref_src",
    "si",
    "feature",
    "spm",
];

const DEFAULT_ALLOWED_PARAMS: &[&str] = &["v", "id", "vid", "video", "list", "p", "page", "ep"];

const DEFAULT_IDENTIFYING_ATTRIBUTES: &[&str] = &[
    "data-video-id",
    "data-videoid",
    "data-media-id",
    "data-asset-id",
    "data-vid",
    "data-id",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub key: KeyDerivationConfig,
    pub merge: MergePolicy,
    pub sync: SyncSettings,
    pub service: ServiceSettings,
}

/// How page URLs lose their query string before hashing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Strip parameters on the tracking deny-list, keep the rest.
    #[default]
    DenyList,
    /// Strip every parameter that is not on the allow-list.
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct KeyDerivationConfig {
    /// Key resources by page URL alone.
    pub url_only: bool,
    pub query_mode: QueryMode,
    pub tracking_params: Vec<String>,
    pub allowed_params: Vec<String>,
    pub preserve_fragment: bool,
    /// Attributes that carry a site's own media identifier.
    pub identifying_attributes: Vec<String>,
    /// How many ancestor elements are searched for an identifier.
    pub ancestor_depth: usize,
    /// Duration bucket width; 1 rounds to the nearest second.
    pub duration_bucket_secs: u32,
    /// Shorter resources are treated as previews and never keyed.
    pub min_duration_secs: f64,
    /// Longer resources are treated as live/DVR streams and never keyed.
    pub max_duration_secs: f64,
    /// Prefix of every derived key.
    pub namespace: String,
}

impl Default for KeyDerivationConfig {
    fn default() -> Self {
        Self {
            url_only: false,
            query_mode: QueryMode::DenyList,
            tracking_params: to_strings(DEFAULT_TRACKING_PARAMS),
            allowed_params: to_strings(DEFAULT_ALLOWED_PARAMS),
            preserve_fragment: false,
            identifying_attributes: to_strings(DEFAULT_IDENTIFYING_ATTRIBUTES),
            ancestor_depth: 5,
            duration_bucket_secs: 1,
            min_duration_secs: 5.0,
            max_duration_secs: 12.0 * 60.0 * 60.0,
            namespace: "rk-".to_string(),
        }
    }
}

/// Thresholds of the two-replica merge. Both values are empirical.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MergePolicy {
    /// Same-label bookmarks closer than this are one bookmark.
    pub duplicate_window_secs: f64,
    /// Auto-saves closer than this are ranked by record activity instead.
    pub auto_save_tie_threshold_ms: i64,
}

impl MergePolicy {
    pub const DEFAULT_DUPLICATE_WINDOW_SECS: f64 = 1.0;
    pub const DEFAULT_AUTO_SAVE_TIE_THRESHOLD_MS: i64 = 5_000;
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            duplicate_window_secs: Self::DEFAULT_DUPLICATE_WINDOW_SECS,
            auto_save_tie_threshold_ms: Self::DEFAULT_AUTO_SAVE_TIE_THRESHOLD_MS,
        }
    }
}

/// Cadence, retry and notification settings of the sync scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    pub tick_interval_ms: u64,
    /// Minimum gap between syncs while a tracked resource plays.
    pub playing_min_gap_ms: i64,
    /// How long a foreground interaction keeps the interaction trigger armed.
    pub interaction_window_ms: i64,
    pub interaction_min_gap_ms: i64,
    /// Unconditional sync once this much time passed.
    pub fallback_gap_ms: i64,
    /// Attempts per cycle for recoverable failures.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Minimum gap between two user notifications of the same kind.
    pub notify_min_interval_ms: i64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 30_000,
            playing_min_gap_ms: 15_000,
            interaction_window_ms: 120_000,
            interaction_min_gap_ms: 30_000,
            fallback_gap_ms: 120_000,
            max_attempts: 4,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
            notify_min_interval_ms: 60_000,
        }
    }
}

impl SyncSettings {
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Delay before retry number `attempt` (1-based), doubling up to the cap.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.backoff_base_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.backoff_max_ms))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSettings {
    /// Auto-save is skipped within this fraction of the start or end.
    pub auto_save_edge_fraction: f64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            auto_save_edge_fraction: 0.05,
        }
    }
}

impl EngineConfig {
    /// Load a config file, returning defaults when the file does not exist.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        parse_engine_config(&raw).map_err(|error| {
            Error::InvalidInput(format!(
                "Failed to load config at {}: {error}",
                path.display()
            ))
        })
    }

    /// Reject values that would make the engine misbehave.
    pub fn validate(&self) -> Result<()> {
        let key = &self.key;
        if key.duration_bucket_secs == 0 {
            return Err(invalid("key.duration_bucket_secs must be at least 1"));
        }
        if key.min_duration_secs.is_nan()
            || key.min_duration_secs < 0.0
            || key.min_duration_secs >= key.max_duration_secs
        {
            return Err(invalid(
                "key.min_duration_secs must be non-negative and below key.max_duration_secs",
            ));
        }
        if key.namespace.trim().is_empty() || key.namespace.chars().any(char::is_whitespace) {
            return Err(invalid("key.namespace must be a non-empty token"));
        }
        let window = self.merge.duplicate_window_secs;
        if window.is_nan() || window < 0.0 {
            return Err(invalid("merge.duplicate_window_secs must be non-negative"));
        }
        if self.merge.auto_save_tie_threshold_ms < 0 {
            return Err(invalid("merge.auto_save_tie_threshold_ms must be non-negative"));
        }
        if self.sync.max_attempts == 0 {
            return Err(invalid("sync.max_attempts must be at least 1"));
        }
        if self.sync.tick_interval_ms == 0 {
            return Err(invalid("sync.tick_interval_ms must be positive"));
        }
        let edge = self.service.auto_save_edge_fraction;
        if !(0.0..0.5).contains(&edge) {
            return Err(invalid("service.auto_save_edge_fraction must be in [0, 0.5)"));
        }
        Ok(())
    }
}

/// Parse and validate a config document.
///
/// Public so callers can parse a payload without touching disk.
pub fn parse_engine_config(payload: &str) -> Result<EngineConfig> {
    let config: EngineConfig = serde_json::from_str(payload)?;
    config.validate()?;
    Ok(config)
}

fn invalid(message: &str) -> Error {
    Error::InvalidInput(message.to_string())
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document_yields_defaults() {
        let config = parse_engine_config("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.merge.auto_save_tie_threshold_ms, 5_000);
        assert_eq!(config.key.ancestor_depth, 5);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = parse_engine_config(
            r#"{
                "key": { "query_mode": "strict", "allowed_params": ["v"] },
                "sync": { "max_attempts": 2 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.key.query_mode, QueryMode::Strict);
        assert_eq!(config.key.allowed_params, vec!["v".to_string()]);
        assert_eq!(config.key.namespace, "rk-");
        assert_eq!(config.sync.max_attempts, 2);
        assert_eq!(config.sync.fallback_gap_ms, 120_000);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = parse_engine_config(r#"{ "merge": { "window": 2 } }"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn validate_rejects_zero_attempts() {
        let error = parse_engine_config(r#"{ "sync": { "max_attempts": 0 } }"#).unwrap_err();
        assert!(matches!(error, Error::InvalidInput(message) if message.contains("max_attempts")));
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let settings = SyncSettings::default();
        assert_eq!(settings.backoff_delay(1), Duration::from_millis(500));
        assert_eq!(settings.backoff_delay(2), Duration::from_millis(1_000));
        assert_eq!(settings.backoff_delay(4), Duration::from_millis(4_000));
        assert_eq!(settings.backoff_delay(10), Duration::from_millis(8_000));
    }

    #[test]
    fn load_from_missing_path_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn load_from_path_reports_file_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let error = EngineConfig::load_from_path(&path).unwrap_err();
        assert!(error.to_string().contains("config.json"));
    }
}
