use regex::Regex;
use sha2::{Digest, Sha256};
use sqlx::Row;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::db::Store;
use crate::error::AppResult;
use crate::models::template::MessageTemplate;

static IPV6_RE: OnceLock<Regex> = OnceLock::new();
static IPV4_RE: OnceLock<Regex> = OnceLock::new();
static MAC_RE: OnceLock<Regex> = OnceLock::new();
static UUID_RE: OnceLock<Regex> = OnceLock::new();
static TS_RE: OnceLock<Regex> = OnceLock::new();
static NUM_RE: OnceLock<Regex> = OnceLock::new();
static WS_RE: OnceLock<Regex> = OnceLock::new();

fn num_re() -> &'static Regex {
    NUM_RE.get_or_init(|| Regex::new(r"\d{4,}").unwrap())
}

fn ipv6_re() -> &'static Regex {
    IPV6_RE.get_or_init(|| Regex::new(r"(?i)\b([0-9a-f]{1,4}:){2,7}[0-9a-f]{1,4}\b").unwrap())
}
fn ipv4_re() -> &'static Regex {
    IPV4_RE.get_or_init(|| Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").unwrap())
}
fn mac_re() -> &'static Regex {
    MAC_RE.get_or_init(|| Regex::new(r"(?i)\b([0-9a-f]{2}:){5}[0-9a-f]{2}\b").unwrap())
}
fn uuid_re() -> &'static Regex {
    UUID_RE.get_or_init(|| Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b").unwrap())
}
fn ts_re() -> &'static Regex {
    TS_RE.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?").unwrap())
}
fn ws_re() -> &'static Regex {
    WS_RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Canonicalize a raw message to a stable pattern: lowercase, substitute
/// identifying tokens with class placeholders in a fixed order (so the
/// result is deterministic), collapse whitespace, truncate.
///
/// Substitution order (IPv6 before IPv4 before MAC before UUID before
/// timestamp before numeric/hex runs) is fixed so two runs of the
/// canonicalizer over the same message always agree.
pub fn canonicalize(message: &str, message_max_length: usize) -> String {
    let mut s = message.to_lowercase();
    s = ipv6_re().replace_all(&s, "<ip>").to_string();
    s = ipv4_re().replace_all(&s, "<ip>").to_string();
    s = mac_re().replace_all(&s, "<mac>").to_string();
    s = uuid_re().replace_all(&s, "<uuid>").to_string();
    s = ts_re().replace_all(&s, "<ts>").to_string();
    s = num_re().replace_all(&s, "<num>").to_string();
    s = ws_re().replace_all(&s, " ").trim().to_string();
    if s.len() > message_max_length {
        s.truncate(message_max_length);
    }
    s
}

/// Stable 128-bit fingerprint: first 16 bytes of the SHA-256 digest of the
/// canonicalized message, hex-encoded. Scoped per-system by the caller
/// (fingerprints are not globally unique by design).
pub fn fingerprint(pattern: &str) -> String {
    let digest = Sha256::digest(pattern.as_bytes());
    hex::encode_bytes_16(&digest)
}

mod hex {
    pub fn encode_bytes_16(digest: &[u8]) -> String {
        digest[..16].iter().map(|b| format!("{b:02x}")).collect()
    }
}

pub struct TemplateCache {
    pub store: Store,
}

impl TemplateCache {
    /// `resolveTemplate(event)`. On a fingerprint miss, inserts a new
    /// template row and returns `cached_scores=None`.
    pub async fn resolve_template(&self, system_id: Uuid, message: &str, message_max_length: usize) -> AppResult<MessageTemplate> {
        let pattern = canonicalize(message, message_max_length);
        let fp = fingerprint(&pattern);

        if let Some(existing) = sqlx::query_as::<_, MessageTemplate>(
            "SELECT id, system_id, fingerprint, pattern, cached_scores, last_scored_at, \
             avg_max_score, scoring_count, created_at FROM message_templates \
             WHERE system_id = $1 AND fingerprint = $2",
        )
        .bind(system_id)
        .bind(&fp)
        .fetch_optional(&self.store.pool)
        .await?
        {
            return Ok(existing);
        }

        let id = Uuid::new_v4();
        let row = sqlx::query_as::<_, MessageTemplate>(
            "INSERT INTO message_templates (id, system_id, fingerprint, pattern) \
             VALUES ($1,$2,$3,$4) \
             ON CONFLICT (system_id, fingerprint) DO UPDATE SET fingerprint = EXCLUDED.fingerprint \
             RETURNING id, system_id, fingerprint, pattern, cached_scores, last_scored_at, \
             avg_max_score, scoring_count, created_at",
        )
        .bind(id)
        .bind(system_id)
        .bind(&fp)
        .bind(&pattern)
        .fetch_one(&self.store.pool)
        .await?;
        Ok(row)
    }

    /// Writes a freshly-scored vector back to the template: updates
    /// `cached_scores`, `last_scored_at`, and the running `avg_max_score`
    /// (mean of per-template max score across `scoring_count` observations).
    pub async fn record_scores(&self, template_id: Uuid, criterion_scores: &std::collections::HashMap<String, f64>) -> AppResult<()> {
        let max_score = criterion_scores.values().cloned().fold(0.0_f64, f64::max);
        let value = serde_json::to_value(criterion_scores).unwrap_or(serde_json::json!({}));

        sqlx::query(
            "UPDATE message_templates SET \
             cached_scores = $2, last_scored_at = now(), scoring_count = scoring_count + 1, \
             avg_max_score = COALESCE(avg_max_score, 0) * scoring_count / (scoring_count + 1) + $3 / (scoring_count + 1) \
             WHERE id = $1",
        )
        .bind(template_id)
        .bind(&value)
        .bind(max_score)
        .execute(&self.store.pool)
        .await?;
        Ok(())
    }

    /// Zeros `last_scored_at`/`cached_scores` for every template of a
    /// system — the operator-triggered cache flush.
    pub async fn flush(&self, system_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE message_templates SET last_scored_at = NULL, cached_scores = NULL WHERE system_id = $1",
        )
        .bind(system_id)
        .execute(&self.store.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// True when the template's `avg_max_score` has stayed under
    /// `low_score_threshold` across at least `low_score_min_scorings`
    /// observations, letting the scoring loop skip the LLM call entirely.
    pub async fn is_low_interest(&self, template_id: Uuid, low_score_threshold: f64, low_score_min_scorings: i64) -> AppResult<bool> {
        let row = sqlx::query("SELECT avg_max_score, scoring_count FROM message_templates WHERE id = $1")
            .bind(template_id)
            .fetch_optional(&self.store.pool)
            .await?;
        Ok(match row {
            Some(row) => {
                let avg: Option<f64> = row.get("avg_max_score");
                let count: i64 = row.get("scoring_count");
                matches!(avg, Some(a) if a < low_score_threshold) && count >= low_score_min_scorings
            }
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_replaces_ips_and_numbers() {
        let msg = "conn from 10.0.0.12 failed after 48291 retries at 2024-01-02T03:04:05Z";
        let pattern = canonicalize(msg, 1000);
        assert_eq!(pattern, "conn from <ip> failed after <num> retries at <ts>");
    }

    #[test]
    fn canonicalize_replaces_uuids_and_is_deterministic() {
        let msg = "request 123e4567-e89b-12d3-a456-426614174000 completed";
        let a = canonicalize(msg, 1000);
        let b = canonicalize(msg, 1000);
        assert_eq!(a, b);
        assert_eq!(a, "request <uuid> completed");
    }

    #[test]
    fn canonicalize_truncates_to_max_length() {
        let long = "x ".repeat(500);
        let pattern = canonicalize(&long, 50);
        assert!(pattern.chars().count() <= 50);
    }

    #[test]
    fn fingerprint_is_stable_for_same_pattern() {
        let a = fingerprint("disk check ok <num>");
        let b = fingerprint("disk check ok <num>");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn fingerprint_differs_for_different_patterns() {
        assert_ne!(fingerprint("pattern one"), fingerprint("pattern two"));
    }
}
