use serde::Deserialize;
use std::path::Path;

/// Top-level config loaded from `sentinel.toml`. Secrets (DB URL, LLM API
/// key) come from the environment instead, keeping credentials out of the
/// checked-in TOML.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub findings: FindingsConfig,
    #[serde(default)]
    pub effective_score: EffectiveScoreConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub privacy: PrivacyConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_pipeline_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_max_parallel_systems")]
    pub max_parallel_systems: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_pipeline_interval_minutes(),
            max_parallel_systems: default_max_parallel_systems(),
        }
    }
}

fn default_pipeline_interval_minutes() -> u64 {
    5
}
fn default_max_parallel_systems() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ScoringConfig {
    #[serde(default = "default_scoring_limit_per_run")]
    pub limit_per_run: i64,
    #[serde(default = "default_scoring_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_message_max_length")]
    pub message_max_length: usize,
    #[serde(default = "default_score_cache_ttl_minutes")]
    pub score_cache_ttl_minutes: i64,
    #[serde(default)]
    pub low_score_auto_skip_enabled: bool,
    #[serde(default = "default_low_score_threshold")]
    pub low_score_threshold: f64,
    #[serde(default = "default_low_score_min_scorings")]
    pub low_score_min_scorings: i64,
    #[serde(default)]
    pub severity_skip_list: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            limit_per_run: default_scoring_limit_per_run(),
            batch_size: default_scoring_batch_size(),
            message_max_length: default_message_max_length(),
            score_cache_ttl_minutes: default_score_cache_ttl_minutes(),
            low_score_auto_skip_enabled: false,
            low_score_threshold: default_low_score_threshold(),
            low_score_min_scorings: default_low_score_min_scorings(),
            severity_skip_list: Vec::new(),
        }
    }
}

fn default_scoring_limit_per_run() -> i64 {
    500
}
fn default_scoring_batch_size() -> usize {
    20
}
fn default_message_max_length() -> usize {
    512
}
fn default_score_cache_ttl_minutes() -> i64 {
    360
}
fn default_low_score_threshold() -> f64 {
    0.2
}
fn default_low_score_min_scorings() -> i64 {
    5
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct MetaConfig {
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
    #[serde(default = "default_meta_max_events")]
    pub max_events: usize,
    #[serde(default = "default_true")]
    pub prioritize_high_scores: bool,
    #[serde(default = "default_true")]
    pub filter_zero_score_meta_events: bool,
    #[serde(default = "default_true")]
    pub skip_zero_score_meta: bool,
    #[serde(default = "default_context_window_size")]
    pub context_window_size: usize,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            max_events: default_meta_max_events(),
            prioritize_high_scores: true,
            filter_zero_score_meta_events: true,
            skip_zero_score_meta: true,
            context_window_size: default_context_window_size(),
        }
    }
}

fn default_window_minutes() -> i64 {
    5
}
fn default_meta_max_events() -> usize {
    200
}
fn default_context_window_size() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct FindingsConfig {
    #[serde(default = "default_true")]
    pub finding_dedup_enabled: bool,
    #[serde(default = "default_finding_dedup_threshold")]
    pub finding_dedup_threshold: f64,
    #[serde(default = "default_max_new_findings_per_window")]
    pub max_new_findings_per_window: usize,
    #[serde(default = "default_max_open_findings_per_system")]
    pub max_open_findings_per_system: usize,
    #[serde(default = "default_true")]
    pub severity_decay_enabled: bool,
    #[serde(default = "default_severity_decay_after_occurrences")]
    pub severity_decay_after_occurrences: i64,
    #[serde(default = "default_recurring_lookback_days")]
    pub recurring_lookback_days: i64,
    #[serde(default = "default_auto_resolve_after_misses")]
    pub auto_resolve_after_misses: i64,
}

impl Default for FindingsConfig {
    fn default() -> Self {
        Self {
            finding_dedup_enabled: true,
            finding_dedup_threshold: default_finding_dedup_threshold(),
            max_new_findings_per_window: default_max_new_findings_per_window(),
            max_open_findings_per_system: default_max_open_findings_per_system(),
            severity_decay_enabled: true,
            severity_decay_after_occurrences: default_severity_decay_after_occurrences(),
            recurring_lookback_days: default_recurring_lookback_days(),
            auto_resolve_after_misses: default_auto_resolve_after_misses(),
        }
    }
}

fn default_finding_dedup_threshold() -> f64 {
    0.6
}
fn default_max_new_findings_per_window() -> usize {
    3
}
fn default_max_open_findings_per_system() -> usize {
    50
}
fn default_severity_decay_after_occurrences() -> i64 {
    5
}
fn default_recurring_lookback_days() -> i64 {
    14
}
fn default_auto_resolve_after_misses() -> i64 {
    3
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct EffectiveScoreConfig {
    #[serde(default = "default_meta_weight")]
    pub meta_weight: f64,
    #[serde(default = "default_score_display_window_days")]
    pub score_display_window_days: i64,
}

impl Default for EffectiveScoreConfig {
    fn default() -> Self {
        Self {
            meta_weight: default_meta_weight(),
            score_display_window_days: default_score_display_window_days(),
        }
    }
}

fn default_meta_weight() -> f64 {
    0.7
}
fn default_score_display_window_days() -> i64 {
    7
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_days")]
    pub default_retention_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            default_retention_days: default_retention_days(),
        }
    }
}

fn default_retention_days() -> i64 {
    90
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_maintenance_interval_hours")]
    pub interval_hours: u64,
    #[serde(default = "default_partition_lookahead_months")]
    pub partition_lookahead_months: i64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_maintenance_interval_hours(),
            partition_lookahead_months: default_partition_lookahead_months(),
        }
    }
}

fn default_maintenance_interval_hours() -> u64 {
    6
}
fn default_partition_lookahead_months() -> i64 {
    3
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct BackupConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_backup_interval_hours")]
    pub interval_hours: u64,
    #[serde(default = "default_backup_dir")]
    pub directory: String,
    #[serde(default = "default_backup_retention_count")]
    pub retention_count: usize,
    #[serde(default = "default_backup_format")]
    pub format: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_backup_interval_hours(),
            directory: default_backup_dir(),
            retention_count: default_backup_retention_count(),
            format: default_backup_format(),
        }
    }
}

fn default_backup_interval_hours() -> u64 {
    24
}
fn default_backup_dir() -> String {
    "./data/backups".to_string()
}
fn default_backup_retention_count() -> usize {
    7
}
fn default_backup_format() -> String {
    "custom".to_string()
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_scoring_model")]
    pub scoring_model: String,
    #[serde(default = "default_meta_model")]
    pub meta_model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_retry_base_ms")]
    pub retry_base_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            scoring_model: default_scoring_model(),
            meta_model: default_meta_model(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
            retry_base_ms: default_llm_retry_base_ms(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_scoring_model() -> String {
    "gpt-5-mini".to_string()
}
fn default_meta_model() -> String {
    "gpt-5".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_llm_max_retries() -> u32 {
    2
}
fn default_llm_retry_base_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize, Default, serde::Serialize)]
pub struct PrivacyConfig {
    #[serde(default = "default_true")]
    pub redact_pii: bool,
    #[serde(default)]
    pub strip_host_program: bool,
    #[serde(default)]
    pub custom_patterns: Vec<String>,
}

/// Operator-supplied prompt text layered on top of the adapter's built-in
/// defaults. Stored and served through the same `app_config` resolver as the
/// rest of these sections; picked up by the scoring/meta loops on their next
/// scheduled tick rather than applied mid-flight.
#[derive(Debug, Clone, Deserialize, Default, serde::Serialize)]
pub struct PromptsConfig {
    #[serde(default)]
    pub scoring_system_prompt: Option<String>,
    #[serde(default)]
    pub meta_system_prompt: Option<String>,
    #[serde(default)]
    pub criterion_guidelines: std::collections::HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_returns_defaults() {
        let config = AppConfig::load("/nonexistent/path/sentinel.toml").unwrap();
        assert!(config.privacy.redact_pii);
        assert_eq!(config.scoring.batch_size, ScoringConfig::default().batch_size);
    }

    #[test]
    fn load_parses_partial_toml_over_defaults() {
        let dir = std::env::temp_dir().join(format!("log-sentinel-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sentinel.toml");
        std::fs::write(&path, "[scoring]\nbatch_size = 7\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.scoring.batch_size, 7);

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }

    #[test]
    fn privacy_config_defaults_redact_pii_on() {
        let config = PrivacyConfig { redact_pii: default_true(), strip_host_program: false, custom_patterns: vec![] };
        assert!(config.redact_pii);
    }
}
