use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Where a MonitoredSystem's events live: the primary partitioned Postgres
/// store, or an optional external search engine reachable over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Primary,
    External,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Primary => "primary",
            EventSource::External => "external",
        }
    }
}

impl std::str::FromStr for EventSource {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(EventSource::Primary),
            "external" => Ok(EventSource::External),
            other => anyhow::bail!("unknown event_source: {other}"),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct MonitoredSystem {
    pub id: Uuid,
    pub name: String,
    pub event_source: String,
    pub retention_days: Option<i64>,
    pub external_endpoint: Option<String>,
    pub active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct MonitoredSystemResponse {
    pub id: Uuid,
    pub name: String,
    pub event_source: String,
    pub retention_days: Option<i64>,
    pub external_endpoint: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<MonitoredSystem> for MonitoredSystemResponse {
    fn from(s: MonitoredSystem) -> Self {
        Self {
            id: s.id,
            name: s.name,
            event_source: s.event_source,
            retention_days: s.retention_days,
            external_endpoint: s.external_endpoint,
            active: s.active,
            created_at: s.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            updated_at: s.updated_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSystemRequest {
    pub name: String,
    #[serde(default = "default_event_source")]
    pub event_source: String,
    #[serde(default)]
    pub retention_days: Option<i64>,
    #[serde(default)]
    pub external_endpoint: Option<String>,
}

fn default_event_source() -> String {
    "primary".to_string()
}

#[derive(Debug, Deserialize)]
pub struct UpdateSystemRequest {
    pub name: Option<String>,
    pub retention_days: Option<i64>,
    pub external_endpoint: Option<String>,
    pub active: Option<bool>,
}
