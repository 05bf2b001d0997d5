use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

pub fn default_enabled() -> bool {
    true
}

/// User-supplied regex template tagging matching events as known-normal.
#[derive(Debug, Clone, FromRow)]
pub struct NormalBehaviorTemplate {
    pub id: Uuid,
    pub system_id: Uuid,
    pub pattern_regex: String,
    pub host_pattern: Option<String>,
    pub program_pattern: Option<String>,
    pub enabled: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct NormalBehaviorTemplateResponse {
    pub id: Uuid,
    pub system_id: Uuid,
    pub pattern_regex: String,
    pub host_pattern: Option<String>,
    pub program_pattern: Option<String>,
    pub enabled: bool,
    pub created_at: String,
}

impl From<NormalBehaviorTemplate> for NormalBehaviorTemplateResponse {
    fn from(t: NormalBehaviorTemplate) -> Self {
        Self {
            id: t.id,
            system_id: t.system_id,
            pattern_regex: t.pattern_regex,
            host_pattern: t.host_pattern,
            program_pattern: t.program_pattern,
            enabled: t.enabled,
            created_at: t.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}
