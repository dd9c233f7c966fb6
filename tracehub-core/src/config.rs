//! Configuration value types.
//!
//! These types describe the shape of an already-materialized
//! configuration value; loading it from a TOML file on disk (path
//! resolution, validation) is a concern of the CLI crate, not this
//! library.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_true() -> bool {
    true
}

fn default_scan_mode() -> String {
    "adaptive".to_string()
}

fn default_interval_min_ms() -> u64 {
    2_000
}

fn default_interval_max_ms() -> u64 {
    60_000
}

fn default_interval_seconds() -> u64 {
    10
}

fn default_full_rescan_interval_ms() -> u64 {
    300_000
}

fn default_batch_debounce_ms() -> u64 {
    250
}

fn default_recent_event_window() -> u64 {
    200
}

fn default_status_running_ttl_ms() -> i64 {
    30_000
}

fn default_status_waiting_ttl_ms() -> i64 {
    120_000
}

fn default_activity_window_minutes() -> u32 {
    60
}

fn default_activity_bin_minutes() -> u32 {
    5
}

fn default_activity_bin_count() -> u32 {
    12
}

fn default_retention_strategy() -> String {
    "aggressive_recency".to_string()
}

fn default_hot_trace_count() -> usize {
    20
}

fn default_warm_trace_count() -> usize {
    60
}

fn default_max_resident_hot() -> usize {
    2_000
}

fn default_max_resident_warm() -> usize {
    200
}

fn default_redaction_mode() -> String {
    "off".to_string()
}

fn default_replacement() -> String {
    "[REDACTED]".to_string()
}

fn default_key_pattern() -> String {
    "(?i)(api[_-]?key|token|secret|password|authorization)".to_string()
}

fn default_value_pattern() -> String {
    "sk-[A-Za-z0-9]{10,}".to_string()
}

fn default_unknown_model_policy() -> String {
    "n_a".to_string()
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_context_window_tokens() -> u64 {
    128_000
}

fn default_top_model_count() -> usize {
    5
}

fn default_top_tool_count() -> usize {
    10
}

/// Scan-loop tuning, §6 group `scan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    #[serde(default = "default_scan_mode")]
    pub mode: String,
    #[serde(default = "default_interval_min_ms")]
    pub interval_min_ms: u64,
    #[serde(default = "default_interval_max_ms")]
    pub interval_max_ms: u64,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_full_rescan_interval_ms")]
    pub full_rescan_interval_ms: u64,
    #[serde(default = "default_batch_debounce_ms")]
    pub batch_debounce_ms: u64,
    #[serde(default = "default_recent_event_window")]
    pub recent_event_window: u64,
    #[serde(default)]
    pub include_meta_default: bool,
    #[serde(default = "default_status_running_ttl_ms")]
    pub status_running_ttl_ms: i64,
    #[serde(default = "default_status_waiting_ttl_ms")]
    pub status_waiting_ttl_ms: i64,
    #[serde(default = "default_activity_window_minutes")]
    pub activity_window_minutes: u32,
    #[serde(default = "default_activity_bin_minutes")]
    pub activity_bin_minutes: u32,
    #[serde(default = "default_activity_bin_count")]
    pub activity_bin_count: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: default_scan_mode(),
            interval_min_ms: default_interval_min_ms(),
            interval_max_ms: default_interval_max_ms(),
            interval_seconds: default_interval_seconds(),
            full_rescan_interval_ms: default_full_rescan_interval_ms(),
            batch_debounce_ms: default_batch_debounce_ms(),
            recent_event_window: default_recent_event_window(),
            include_meta_default: false,
            status_running_ttl_ms: default_status_running_ttl_ms(),
            status_waiting_ttl_ms: default_status_waiting_ttl_ms(),
            activity_window_minutes: default_activity_window_minutes(),
            activity_bin_minutes: default_activity_bin_minutes(),
            activity_bin_count: default_activity_bin_count(),
        }
    }
}

impl ScanConfig {
    pub fn is_fixed(&self) -> bool {
        self.mode == "fixed"
    }
}

/// Tiered retention, §6 group `retention`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionConfig {
    #[serde(default = "default_retention_strategy")]
    pub strategy: String,
    #[serde(default = "default_hot_trace_count")]
    pub hot_trace_count: usize,
    #[serde(default = "default_warm_trace_count")]
    pub warm_trace_count: usize,
    #[serde(default = "default_max_resident_hot")]
    pub max_resident_events_per_hot_trace: usize,
    #[serde(default = "default_max_resident_warm")]
    pub max_resident_events_per_warm_trace: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            strategy: default_retention_strategy(),
            hot_trace_count: default_hot_trace_count(),
            warm_trace_count: default_warm_trace_count(),
            max_resident_events_per_hot_trace: default_max_resident_hot(),
            max_resident_events_per_warm_trace: default_max_resident_warm(),
        }
    }
}

impl RetentionConfig {
    pub fn is_full_memory(&self) -> bool {
        self.strategy == "full_memory"
    }
}

/// Redaction policy, §6 group `redaction`. Regex *policy* (the patterns
/// themselves) is pluggable and out of core scope; only the mechanism
/// that consumes these values is specified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionConfig {
    #[serde(default = "default_redaction_mode")]
    pub mode: String,
    #[serde(default)]
    pub always_on: bool,
    #[serde(default = "default_replacement")]
    pub replacement: String,
    #[serde(default = "default_key_pattern")]
    pub key_pattern: String,
    #[serde(default = "default_value_pattern")]
    pub value_pattern: String,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            mode: default_redaction_mode(),
            always_on: false,
            replacement: default_replacement(),
            key_pattern: default_key_pattern(),
            value_pattern: default_value_pattern(),
        }
    }
}

impl RedactionConfig {
    pub fn is_enabled(&self) -> bool {
        self.always_on || self.mode != "off"
    }
}

/// Per-model USD rate, §6 group `cost`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRate {
    pub model: String,
    /// USD per 1,000,000 tokens.
    pub rate_per_million: f64,
}

/// Cost estimation, §6 group `cost`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_unknown_model_policy")]
    pub unknown_model_policy: String,
    #[serde(default)]
    pub model_rates: Vec<ModelRate>,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            currency: default_currency(),
            unknown_model_policy: default_unknown_model_policy(),
            model_rates: Vec::new(),
        }
    }
}

/// A model's context-window size in tokens, §6 group `models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelContextWindow {
    pub model: String,
    pub tokens: u64,
}

/// Model metadata, §6 group `models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsConfig {
    #[serde(default = "default_context_window_tokens")]
    pub default_context_window_tokens: u64,
    #[serde(default)]
    pub context_windows: Vec<ModelContextWindow>,
    #[serde(default = "default_top_model_count")]
    pub top_model_count: usize,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default_context_window_tokens: default_context_window_tokens(),
            context_windows: Vec::new(),
            top_model_count: default_top_model_count(),
        }
    }
}

/// One named source profile, §6 group `sources` / §4.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceProfile {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub roots: Vec<String>,
    #[serde(default)]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub max_depth: Option<u32>,
    #[serde(default)]
    pub agent_hint: Option<String>,
}

/// A directory + log-type pair contributing a default source profile
/// per agent kind, §6 `sessionLogDirectories`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLogDirectory {
    pub directory: String,
    pub log_type: String,
}

/// Top-level configuration value consumed by the indexing engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
    #[serde(default)]
    pub cost: CostConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub sources: HashMap<String, SourceProfile>,
    #[serde(default)]
    pub session_log_directories: Vec<SessionLogDirectory>,
    #[serde(default = "default_top_tool_count")]
    pub top_tool_count: usize,
}

impl Config {
    /// Turn each `sessionLogDirectories` entry into a default source
    /// profile keyed by its log type (spec §6: "adds a default source
    /// profile per agent kind"), without overriding a profile the user
    /// already named explicitly under `sources`.
    pub fn synthesize_session_log_sources(&mut self) {
        for dir in &self.session_log_directories {
            self.sources.entry(dir.log_type.clone()).or_insert_with(|| SourceProfile {
                enabled: true,
                roots: vec![dir.directory.clone()],
                include_globs: vec!["**/*.jsonl".to_string()],
                exclude_globs: vec![],
                max_depth: None,
                agent_hint: Some(dir.log_type.clone()),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.scan.mode, "adaptive");
        assert!(!cfg.scan.is_fixed());
        assert_eq!(cfg.retention.strategy, "aggressive_recency");
        assert!(cfg.cost.enabled);
        assert_eq!(cfg.redaction.mode, "off");
        assert!(!cfg.redaction.is_enabled());
    }

    #[test]
    fn parses_from_toml_fragment() {
        let toml_src = r#"
            [scan]
            mode = "fixed"
            intervalSeconds = 5

            [retention]
            strategy = "full_memory"

            [redaction]
            mode = "strict"
            alwaysOn = true
            replacement = "[REDACTED]"
            valuePattern = "sk-[a-z0-9]+"

            [cost]
            enabled = false
            unknownModelPolicy = "zero"

            [sources.claude]
            roots = ["~/.claude/projects"]
            includeGlobs = ["**/*.jsonl"]
        "#;
        let cfg: Config = toml::from_str(toml_src).expect("valid config");
        assert!(cfg.scan.is_fixed());
        assert_eq!(cfg.scan.interval_seconds, 5);
        assert!(cfg.retention.is_full_memory());
        assert!(cfg.redaction.is_enabled());
        assert_eq!(cfg.cost.unknown_model_policy, "zero");
        assert!(!cfg.cost.enabled);
        let claude = cfg.sources.get("claude").expect("claude profile");
        assert!(claude.enabled);
        assert_eq!(claude.roots, vec!["~/.claude/projects".to_string()]);
    }

    #[test]
    fn synthesizes_source_profile_per_session_log_directory() {
        let mut cfg = Config {
            session_log_directories: vec![SessionLogDirectory {
                directory: "~/.codex/sessions".to_string(),
                log_type: "codex".to_string(),
            }],
            ..Config::default()
        };
        cfg.synthesize_session_log_sources();
        let profile = cfg.sources.get("codex").expect("synthesized codex profile");
        assert!(profile.enabled);
        assert_eq!(profile.roots, vec!["~/.codex/sessions".to_string()]);
        assert_eq!(profile.agent_hint.as_deref(), Some("codex"));
    }

    #[test]
    fn synthesize_does_not_override_explicit_profile() {
        let mut cfg = Config {
            session_log_directories: vec![SessionLogDirectory {
                directory: "~/.codex/sessions".to_string(),
                log_type: "codex".to_string(),
            }],
            ..Config::default()
        };
        cfg.sources.insert(
            "codex".to_string(),
            SourceProfile {
                enabled: false,
                roots: vec!["/custom/codex/root".to_string()],
                include_globs: vec![],
                exclude_globs: vec![],
                max_depth: None,
                agent_hint: Some("codex".to_string()),
            },
        );
        cfg.synthesize_session_log_sources();
        let profile = cfg.sources.get("codex").unwrap();
        assert!(!profile.enabled);
        assert_eq!(profile.roots, vec!["/custom/codex/root".to_string()]);
    }
}
