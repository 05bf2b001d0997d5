use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Token accounting for one LLM call (or one batch of identical calls).
#[derive(Debug, Clone, FromRow)]
pub struct LlmUsage {
    pub id: Uuid,
    pub system_id: Option<Uuid>,
    pub run_type: String,
    pub model: String,
    pub token_input: i64,
    pub token_output: i64,
    pub request_count: i64,
    pub event_count: i64,
    pub cost_estimate: f64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct LlmUsageResponse {
    pub id: Uuid,
    pub system_id: Option<Uuid>,
    pub run_type: String,
    pub model: String,
    pub token_input: i64,
    pub token_output: i64,
    pub request_count: i64,
    pub event_count: i64,
    pub cost_estimate: f64,
    pub created_at: String,
}

impl From<LlmUsage> for LlmUsageResponse {
    fn from(u: LlmUsage) -> Self {
        Self {
            id: u.id,
            system_id: u.system_id,
            run_type: u.run_type,
            model: u.model,
            token_input: u.token_input,
            token_output: u.token_output,
            request_count: u.request_count,
            event_count: u.event_count,
            cost_estimate: u.cost_estimate,
            created_at: u.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

/// Maintenance tick outcome, persisted to `maintenance_log`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct MaintenanceRunResult {
    pub partitions_created: i64,
    pub partitions_dropped: i64,
    pub events_deleted: i64,
    pub scores_deleted: i64,
    pub templates_deleted: i64,
    pub windows_deleted: i64,
    pub vacuum_errors: Vec<String>,
    pub reindex_errors: Vec<String>,
    pub backup: Option<BackupRunResult>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupRunResult {
    pub success: bool,
    pub file_path: Option<String>,
    pub bytes_written: Option<u64>,
    pub error: Option<String>,
}
