use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A single log event. Immutable after ingest except for `acknowledged_at`
/// and `template_id`, per the data model's lifecycle note.
#[derive(Debug, Clone, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub system_id: Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub message: String,
    pub host: Option<String>,
    pub program: Option<String>,
    pub severity: Option<String>,
    pub service: Option<String>,
    pub facility: Option<String>,
    pub source_ip: Option<String>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub external_id: Option<String>,
    pub template_id: Option<Uuid>,
    pub acknowledged_at: Option<chrono::DateTime<chrono::Utc>>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: Uuid,
    pub system_id: Uuid,
    pub timestamp: String,
    pub message: String,
    pub host: Option<String>,
    pub program: Option<String>,
    pub severity: Option<String>,
    pub service: Option<String>,
    pub facility: Option<String>,
    pub source_ip: Option<String>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub external_id: Option<String>,
    pub template_id: Option<Uuid>,
    pub acknowledged_at: Option<String>,
    pub raw: serde_json::Value,
}

impl From<Event> for EventResponse {
    fn from(e: Event) -> Self {
        Self {
            id: e.id,
            system_id: e.system_id,
            timestamp: e.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            message: e.message,
            host: e.host,
            program: e.program,
            severity: e.severity,
            service: e.service,
            facility: e.facility,
            source_ip: e.source_ip,
            trace_id: e.trace_id,
            span_id: e.span_id,
            external_id: e.external_id,
            template_id: e.template_id,
            acknowledged_at: e.acknowledged_at.map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            raw: e.raw,
        }
    }
}

/// Ingest payload. `external_id`, when present with `system_id`, is the
/// de-duplication key: a second ingest with the same pair must not create a
/// second row or duplicate EventScores.
#[derive(Debug, Deserialize)]
pub struct IngestEventRequest {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub message: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub facility: Option<String>,
    #[serde(default)]
    pub source_ip: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub span_id: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default = "default_raw")]
    pub raw: serde_json::Value,
}

fn default_raw() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Deserialize)]
pub struct IngestEventsRequest {
    pub events: Vec<IngestEventRequest>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TimeRange {
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub confirmation: String,
    #[serde(default)]
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub to: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub system_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Default)]
pub struct DeleteCounts {
    pub deleted_events: i64,
    pub deleted_scores: i64,
    pub cleaned_windows: i64,
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgeEventsRequest {
    #[serde(default)]
    pub system_id: Option<Uuid>,
    #[serde(default)]
    pub group_key: Option<String>,
    #[serde(default)]
    pub event_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub up_to: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SearchEventsRequest {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub time_range: TimeRange,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    200
}
