use serde::{Deserialize, Serialize};

/// The six fixed risk dimensions scored independently. Not stored as a DB
/// table with mutable rows — the set is immutable and known at compile time,
/// but each slug is also used as a JSON map key in `cached_scores`/
/// `meta_scores`/`reason_codes`, so a string round-trip stays cheap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    ItSecurity,
    PerformanceDegradation,
    FailurePrediction,
    Anomaly,
    ComplianceAudit,
    OperationalRisk,
}

impl Criterion {
    pub const ALL: [Criterion; 6] = [
        Criterion::ItSecurity,
        Criterion::PerformanceDegradation,
        Criterion::FailurePrediction,
        Criterion::Anomaly,
        Criterion::ComplianceAudit,
        Criterion::OperationalRisk,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Criterion::ItSecurity => "it_security",
            Criterion::PerformanceDegradation => "performance_degradation",
            Criterion::FailurePrediction => "failure_prediction",
            Criterion::Anomaly => "anomaly",
            Criterion::ComplianceAudit => "compliance_audit",
            Criterion::OperationalRisk => "operational_risk",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Criterion::ItSecurity => "IT Security",
            Criterion::PerformanceDegradation => "Performance Degradation",
            Criterion::FailurePrediction => "Failure Prediction",
            Criterion::Anomaly => "Anomaly",
            Criterion::ComplianceAudit => "Compliance / Audit",
            Criterion::OperationalRisk => "Operational Risk",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Criterion> {
        Criterion::ALL.into_iter().find(|c| c.slug() == slug)
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.slug())
    }
}
