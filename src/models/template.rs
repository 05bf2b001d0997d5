use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

/// Content-addressed cache of per-criterion scores for a canonicalized
/// message pattern. `cached_scores` is a JSON-in-column map of criterion
/// slug -> score, decoded tolerantly so a corrupt row can't crash reads.
#[derive(Debug, Clone, FromRow)]
pub struct MessageTemplate {
    pub id: Uuid,
    pub system_id: Uuid,
    pub fingerprint: String,
    pub pattern: String,
    pub cached_scores: Option<serde_json::Value>,
    pub last_scored_at: Option<chrono::DateTime<chrono::Utc>>,
    pub avg_max_score: Option<f64>,
    pub scoring_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl MessageTemplate {
    /// Tolerant decode: any shape other than a string->number object
    /// degrades to an empty map rather than propagating an error.
    pub fn cached_scores_map(&self) -> HashMap<String, f64> {
        match &self.cached_scores {
            Some(serde_json::Value::Object(map)) => map
                .iter()
                .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
                .collect(),
            _ => HashMap::new(),
        }
    }

    pub fn is_fresh(&self, ttl_minutes: i64, now: chrono::DateTime<chrono::Utc>) -> bool {
        match self.last_scored_at {
            Some(t) => now.signed_duration_since(t).num_minutes() < ttl_minutes,
            None => false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageTemplateResponse {
    pub id: Uuid,
    pub system_id: Uuid,
    pub fingerprint: String,
    pub pattern: String,
    pub cached_scores: serde_json::Value,
    pub last_scored_at: Option<String>,
    pub avg_max_score: Option<f64>,
    pub scoring_count: i64,
}

impl From<MessageTemplate> for MessageTemplateResponse {
    fn from(t: MessageTemplate) -> Self {
        Self {
            id: t.id,
            system_id: t.system_id,
            fingerprint: t.fingerprint.clone(),
            pattern: t.pattern.clone(),
            cached_scores: t.cached_scores.clone().unwrap_or_else(|| serde_json::json!({})),
            last_scored_at: t.last_scored_at.map(|x| x.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            avg_max_score: t.avg_max_score,
            scoring_count: t.scoring_count,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateNormalBehaviorRequest {
    pub pattern_regex: String,
    #[serde(default)]
    pub host_pattern: Option<String>,
    #[serde(default)]
    pub program_pattern: Option<String>,
    #[serde(default = "super::suppressor::default_enabled")]
    pub enabled: bool,
}
