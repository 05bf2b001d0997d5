use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreType {
    Event,
    Meta,
}

impl ScoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreType::Event => "event",
            ScoreType::Meta => "meta",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Severity {
        match s {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            _ => Severity::Info,
        }
    }

    /// One level down the ladder; stops at `info` — severity decay never
    /// decays below `info`.
    pub fn decay_one_level(&self) -> Severity {
        match self {
            Severity::Critical => Severity::High,
            Severity::High => Severity::Medium,
            Severity::Medium => Severity::Low,
            Severity::Low => Severity::Info,
            Severity::Info => Severity::Info,
        }
    }
}

/// `(event_id, criterion_id)` -> score row. An event score exists at most
/// once per (event, criterion); the DB enforces this with a unique index.
#[derive(Debug, Clone, FromRow)]
pub struct EventScore {
    pub id: Uuid,
    pub event_id: Uuid,
    pub system_id: Uuid,
    pub criterion_slug: String,
    pub score: f64,
    pub score_type: String,
    pub severity_label: String,
    pub reason_codes: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl EventScore {
    pub fn reason_codes_vec(&self) -> Vec<String> {
        match &self.reason_codes {
            serde_json::Value::Array(arr) => arr
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// One resolved score from the LLM for a single event.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreVectorEntry {
    pub criterion_scores: std::collections::HashMap<String, f64>,
    pub severity_label: String,
    #[serde(default)]
    pub reason_codes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parse_roundtrips_known_labels() {
        for label in ["critical", "high", "medium", "low", "info"] {
            assert_eq!(Severity::parse(label).as_str(), label);
        }
    }

    #[test]
    fn severity_parse_defaults_unknown_to_info() {
        assert_eq!(Severity::parse("nonsense"), Severity::Info);
    }

    #[test]
    fn severity_ordering_is_ascending_by_urgency() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn severity_decay_steps_down_one_level_at_a_time() {
        assert_eq!(Severity::Critical.decay_one_level(), Severity::High);
        assert_eq!(Severity::High.decay_one_level(), Severity::Medium);
        assert_eq!(Severity::Medium.decay_one_level(), Severity::Low);
        assert_eq!(Severity::Low.decay_one_level(), Severity::Info);
        assert_eq!(Severity::Info.decay_one_level(), Severity::Info);
    }

    #[test]
    fn reason_codes_vec_extracts_strings_from_json_array() {
        let score = EventScore {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            system_id: Uuid::new_v4(),
            criterion_slug: "security".to_string(),
            score: 0.8,
            score_type: "event".to_string(),
            severity_label: "high".to_string(),
            reason_codes: serde_json::json!(["auth_failure", "geo_anomaly"]),
            created_at: chrono::Utc::now(),
        };
        assert_eq!(score.reason_codes_vec(), vec!["auth_failure".to_string(), "geo_anomaly".to_string()]);
    }

    #[test]
    fn reason_codes_vec_tolerates_non_array_json() {
        let score = EventScore {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            system_id: Uuid::new_v4(),
            criterion_slug: "security".to_string(),
            score: 0.0,
            score_type: "event".to_string(),
            severity_label: "info".to_string(),
            reason_codes: serde_json::Value::Null,
            created_at: chrono::Utc::now(),
        };
        assert!(score.reason_codes_vec().is_empty());
    }
}
