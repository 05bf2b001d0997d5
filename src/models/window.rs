use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A non-overlapping time slice for one system, created atomically with its
/// MetaResult.
#[derive(Debug, Clone, FromRow)]
pub struct Window {
    pub id: Uuid,
    pub system_id: Uuid,
    pub from_ts: chrono::DateTime<chrono::Utc>,
    pub to_ts: chrono::DateTime<chrono::Utc>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One per Window. `meta_scores`/`findings`/`key_event_ids` are JSON-in-columns
/// decoded tolerantly.
#[derive(Debug, Clone, FromRow)]
pub struct MetaResult {
    pub id: Uuid,
    pub window_id: Uuid,
    pub system_id: Uuid,
    pub summary: String,
    pub meta_scores: serde_json::Value,
    pub findings: serde_json::Value,
    pub recommended_action: Option<String>,
    pub key_event_ids: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl MetaResult {
    pub fn meta_scores_map(&self) -> std::collections::HashMap<String, f64> {
        match &self.meta_scores {
            serde_json::Value::Object(map) => map
                .iter()
                .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
                .collect(),
            _ => std::collections::HashMap::new(),
        }
    }

    pub fn findings_vec(&self) -> Vec<EmittedFinding> {
        serde_json::from_value(self.findings.clone()).unwrap_or_default()
    }

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

/// One finding as emitted by the LLM's meta-analysis pass, before the
/// Finding Engine reconciles it against durable Finding rows.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmittedFinding {
    pub text: String,
    pub severity: String,
    #[serde(default)]
    pub criterion_slug: Option<String>,
    #[serde(default)]
    pub key_event_ids: Vec<Uuid>,
}

/// The LLM's full meta-analysis response shape, parsed from the wire before
/// being persisted as a MetaResult row.
#[derive(Debug, Clone, Deserialize)]
pub struct MetaAnalysisOutcome {
    pub summary: String,
    pub meta_scores: std::collections::HashMap<String, f64>,
    #[serde(default)]
    pub findings: Vec<EmittedFinding>,
    #[serde(default)]
    pub recommended_action: Option<String>,
}

/// `(system_id, window_id, criterion_id)` -> aggregated dashboard value.
#[derive(Debug, Clone, FromRow)]
pub struct EffectiveScore {
    pub id: Uuid,
    pub system_id: Uuid,
    pub window_id: Uuid,
    pub criterion_slug: String,
    pub effective_value: f64,
    pub meta_score: f64,
    pub max_event_score: f64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct MetaResultResponse {
    pub id: Uuid,
    pub window_id: Uuid,
    pub system_id: Uuid,
    pub summary: String,
    pub meta_scores: serde_json::Value,
    pub findings: serde_json::Value,
    pub recommended_action: Option<String>,
    pub key_event_ids: serde_json::Value,
    pub created_at: String,
}

impl From<MetaResult> for MetaResultResponse {
    fn from(m: MetaResult) -> Self {
        Self {
            id: m.id,
            window_id: m.window_id,
            system_id: m.system_id,
            summary: m.summary,
            meta_scores: m.meta_scores,
            findings: m.findings,
            recommended_action: m.recommended_action,
            key_event_ids: m.key_event_ids,
            created_at: m.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}
