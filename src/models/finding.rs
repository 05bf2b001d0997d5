use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl FindingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingStatus::Open => "open",
            FindingStatus::Acknowledged => "acknowledged",
            FindingStatus::Resolved => "resolved",
        }
    }
}

/// Durable, deduplicated issue surfaced by the meta analyzer.
#[derive(Debug, Clone, FromRow)]
pub struct Finding {
    pub id: Uuid,
    pub system_id: Uuid,
    pub fingerprint: String,
    pub text: String,
    pub criterion_slug: Option<String>,
    pub severity: String,
    pub original_severity: String,
    pub status: String,
    pub occurrence_count: i64,
    pub consecutive_misses: i64,
    pub first_seen_at: chrono::DateTime<chrono::Utc>,
    pub last_seen_at: chrono::DateTime<chrono::Utc>,
    pub acknowledged_at: Option<chrono::DateTime<chrono::Utc>>,
    pub resolved_at: Option<chrono::DateTime<chrono::Utc>>,
    pub resolution_evidence: Option<serde_json::Value>,
    pub key_event_ids: serde_json::Value,
}

impl Finding {
    pub fn key_event_ids_vec(&self) -> Vec<Uuid> {
        match &self.key_event_ids {
            serde_json::Value::Array(arr) => arr
                .iter()
                .filter_map(|v| v.as_str().and_then(|s| Uuid::parse_str(s).ok()))
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FindingResponse {
    pub id: Uuid,
    pub system_id: Uuid,
    pub fingerprint: String,
    pub text: String,
    pub criterion_slug: Option<String>,
    pub severity: String,
    pub original_severity: String,
    pub status: String,
    pub occurrence_count: i64,
    pub consecutive_misses: i64,
    pub first_seen_at: String,
    pub last_seen_at: String,
    pub acknowledged_at: Option<String>,
    pub resolved_at: Option<String>,
    pub resolution_evidence: serde_json::Value,
    pub key_event_ids: serde_json::Value,
}

impl From<Finding> for FindingResponse {
    fn from(f: Finding) -> Self {
        Self {
            id: f.id,
            system_id: f.system_id,
            fingerprint: f.fingerprint,
            text: f.text,
            criterion_slug: f.criterion_slug,
            severity: f.severity,
            original_severity: f.original_severity,
            status: f.status,
            occurrence_count: f.occurrence_count,
            consecutive_misses: f.consecutive_misses,
            first_seen_at: f.first_seen_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            last_seen_at: f.last_seen_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            acknowledged_at: f.acknowledged_at.map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            resolved_at: f.resolved_at.map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            resolution_evidence: f.resolution_evidence.unwrap_or(serde_json::Value::Null),
            key_event_ids: f.key_event_ids,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ListFindingsRequest {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}
