use std::collections::HashSet;
use uuid::Uuid;

use crate::config::FindingsConfig;
use crate::db::Store;
use crate::error::AppResult;
use crate::models::finding::Finding;
use crate::models::score::Severity;
use crate::models::window::EmittedFinding;

pub struct FindingEngine {
    pub store: Store,
}

/// Lowercased, whitespace-normalized prefix of `text` (first 240 chars),
/// with English stopwords removed — the canonical fingerprint basis for
/// finding dedup.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "on", "in", "at", "of", "to", "for", "and",
    "or", "has", "have", "had", "been", "with", "this", "that", "it", "by", "from",
];

fn fingerprint_text(text: &str) -> String {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split_whitespace()
        .filter(|w| !STOPWORDS.contains(w))
        .collect();
    let joined = words.join(" ");
    joined.chars().take(240).collect()
}

fn token_jaccard(a: &str, b: &str) -> f64 {
    let sa: HashSet<&str> = a.split_whitespace().collect();
    let sb: HashSet<&str> = b.split_whitespace().collect();
    if sa.is_empty() && sb.is_empty() {
        return 1.0;
    }
    let intersection = sa.intersection(&sb).count() as f64;
    let union = sa.union(&sb).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

impl FindingEngine {
    /// Invoked immediately after a MetaResult is persisted. Reconciles the
    /// emitted findings against existing Finding rows, then ages out
    /// findings that were not re-observed this window. Runs as one
    /// transaction for the window's output.
    pub async fn reconcile(&self, system_id: Uuid, _window_id: Uuid, emitted: &[EmittedFinding], config: &FindingsConfig) -> AppResult<Vec<Finding>> {
        let mut tx = self.store.pool.begin().await?;
        let now = chrono::Utc::now();
        let mut touched_ids: HashSet<Uuid> = HashSet::new();
        let mut new_this_window = 0usize;
        let mut persisted = Vec::new();

        let open_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM findings WHERE system_id = $1 AND status IN ('open','acknowledged')",
        )
        .bind(system_id)
        .fetch_one(&mut *tx)
        .await?;
        let mut open_count = open_count;

        for emitted_finding in emitted {
            let fp = fingerprint_text(&emitted_finding.text);
            let key_event_ids_json = serde_json::to_value(&emitted_finding.key_event_ids).unwrap_or(serde_json::json!([]));

            // Exact fingerprint match against an open/acknowledged finding -> recurrence.
            if let Some(existing) = sqlx::query_as::<_, Finding>(
                "SELECT id, system_id, fingerprint, text, criterion_slug, severity, original_severity, \
                 status, occurrence_count, consecutive_misses, first_seen_at, last_seen_at, \
                 acknowledged_at, resolved_at, resolution_evidence, key_event_ids \
                 FROM findings WHERE system_id = $1 AND fingerprint = $2 AND status IN ('open','acknowledged')",
            )
            .bind(system_id)
            .bind(&fp)
            .fetch_optional(&mut *tx)
            .await?
            {
                let finding = self.apply_recurrence(&mut tx, &existing, &emitted_finding.key_event_ids, config).await?;
                touched_ids.insert(finding.id);
                persisted.push(finding);
                continue;
            }

            // Similar open finding (token-Jaccard) -> treat as recurrence.
            if config.finding_dedup_enabled {
                let open_findings = sqlx::query_as::<_, Finding>(
                    "SELECT id, system_id, fingerprint, text, criterion_slug, severity, original_severity, \
                     status, occurrence_count, consecutive_misses, first_seen_at, last_seen_at, \
                     acknowledged_at, resolved_at, resolution_evidence, key_event_ids \
                     FROM findings WHERE system_id = $1 AND status = 'open'",
                )
                .bind(system_id)
                .fetch_all(&mut *tx)
                .await?;

                if let Some(similar) = open_findings
                    .iter()
                    .find(|f| token_jaccard(&f.fingerprint, &fp) >= config.finding_dedup_threshold)
                {
                    let finding = self.apply_recurrence(&mut tx, similar, &emitted_finding.key_event_ids, config).await?;
                    touched_ids.insert(finding.id);
                    persisted.push(finding);
                    continue;
                }
            }

            // Recently-resolved finding with the same fingerprint -> "recurring" new finding.
            let cutoff = now - chrono::Duration::days(config.recurring_lookback_days);
            if let Some(_resolved) = sqlx::query_as::<_, Finding>(
                "SELECT id, system_id, fingerprint, text, criterion_slug, severity, original_severity, \
                 status, occurrence_count, consecutive_misses, first_seen_at, last_seen_at, \
                 acknowledged_at, resolved_at, resolution_evidence, key_event_ids \
                 FROM findings WHERE system_id = $1 AND fingerprint = $2 AND status = 'resolved' \
                 AND resolved_at >= $3 ORDER BY resolved_at DESC LIMIT 1",
            )
            .bind(system_id)
            .bind(&fp)
            .bind(cutoff)
            .fetch_optional(&mut *tx)
            .await?
            {
                if new_this_window >= config.max_new_findings_per_window || open_count >= config.max_open_findings_per_system as i64 {
                    tracing::warn!("finding overflow: dropping recurring finding for system {system_id}");
                    continue;
                }
                let severity = Severity::parse(&emitted_finding.severity);
                let id = Uuid::new_v4();
                let finding = sqlx::query_as::<_, Finding>(
                    "INSERT INTO findings (id, system_id, fingerprint, text, criterion_slug, \
                     severity, original_severity, status, occurrence_count, consecutive_misses, \
                     first_seen_at, last_seen_at, key_event_ids) \
                     VALUES ($1,$2,$3,$4,$5,$6,$6,'open',1,0,$7,$7,$8) \
                     RETURNING id, system_id, fingerprint, text, criterion_slug, severity, \
                     original_severity, status, occurrence_count, consecutive_misses, first_seen_at, \
                     last_seen_at, acknowledged_at, resolved_at, resolution_evidence, key_event_ids",
                )
                .bind(id)
                .bind(system_id)
                .bind(&fp)
                .bind(format!("Recurring: {}", emitted_finding.text))
                .bind(&emitted_finding.criterion_slug)
                .bind(severity.as_str())
                .bind(now)
                .bind(&key_event_ids_json)
                .fetch_one(&mut *tx)
                .await?;
                touched_ids.insert(finding.id);
                new_this_window += 1;
                open_count += 1;
                persisted.push(finding);
                continue;
            }

            // Brand new finding.
            if new_this_window >= config.max_new_findings_per_window || open_count >= config.max_open_findings_per_system as i64 {
                tracing::warn!("finding overflow: dropping new finding for system {system_id}");
                continue;
            }
            let severity = Severity::parse(&emitted_finding.severity);
            let id = Uuid::new_v4();
            let finding = sqlx::query_as::<_, Finding>(
                "INSERT INTO findings (id, system_id, fingerprint, text, criterion_slug, severity, \
                 original_severity, status, occurrence_count, consecutive_misses, first_seen_at, \
                 last_seen_at, key_event_ids) \
                 VALUES ($1,$2,$3,$4,$5,$6,$6,'open',1,0,$7,$7,$8) \
                 RETURNING id, system_id, fingerprint, text, criterion_slug, severity, \
                 original_severity, status, occurrence_count, consecutive_misses, first_seen_at, \
                 last_seen_at, acknowledged_at, resolved_at, resolution_evidence, key_event_ids",
            )
            .bind(id)
            .bind(system_id)
            .bind(&fp)
            .bind(&emitted_finding.text)
            .bind(&emitted_finding.criterion_slug)
            .bind(severity.as_str())
            .bind(now)
            .bind(&key_event_ids_json)
            .fetch_one(&mut *tx)
            .await?;
            touched_ids.insert(finding.id);
            new_this_window += 1;
            open_count += 1;
            persisted.push(finding);
        }

        // Age out findings not re-observed this window.
        let stale: Vec<Finding> = sqlx::query_as::<_, Finding>(
            "SELECT id, system_id, fingerprint, text, criterion_slug, severity, original_severity, \
             status, occurrence_count, consecutive_misses, first_seen_at, last_seen_at, \
             acknowledged_at, resolved_at, resolution_evidence, key_event_ids \
             FROM findings WHERE system_id = $1 AND status IN ('open','acknowledged')",
        )
        .bind(system_id)
        .fetch_all(&mut *tx)
        .await?;

        for f in stale {
            if touched_ids.contains(&f.id) {
                continue;
            }
            let misses = f.consecutive_misses + 1;
            if config.auto_resolve_after_misses > 0 && misses >= config.auto_resolve_after_misses {
                let evidence = serde_json::json!({ "text": format!("auto-resolved after {misses} consecutive misses"), "event_ids": [] });
                sqlx::query(
                    "UPDATE findings SET status = 'resolved', resolved_at = $2, \
                     resolution_evidence = $3, consecutive_misses = $4 WHERE id = $1",
                )
                .bind(f.id)
                .bind(now)
                .bind(&evidence)
                .bind(misses)
                .execute(&mut *tx)
                .await?;
            } else {
                sqlx::query("UPDATE findings SET consecutive_misses = $2 WHERE id = $1")
                    .bind(f.id)
                    .bind(misses)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(persisted)
    }

    async fn apply_recurrence(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        existing: &Finding,
        new_key_event_ids: &[Uuid],
        config: &FindingsConfig,
    ) -> AppResult<Finding> {
        let now = chrono::Utc::now();
        let occurrence_count = existing.occurrence_count + 1;

        let mut key_ids: HashSet<Uuid> = existing.key_event_ids_vec().into_iter().collect();
        key_ids.extend(new_key_event_ids.iter().copied());
        let capped: Vec<Uuid> = key_ids.into_iter().take(50).collect();
        let key_event_ids_json = serde_json::to_value(&capped).unwrap_or(serde_json::json!([]));

        let severity = if config.severity_decay_enabled && occurrence_count >= config.severity_decay_after_occurrences {
            Severity::parse(&existing.severity).decay_one_level().as_str().to_string()
        } else {
            existing.severity.clone()
        };

        let finding = sqlx::query_as::<_, Finding>(
            "UPDATE findings SET occurrence_count = $2, last_seen_at = $3, consecutive_misses = 0, \
             key_event_ids = $4, severity = $5 WHERE id = $1 \
             RETURNING id, system_id, fingerprint, text, criterion_slug, severity, original_severity, \
             status, occurrence_count, consecutive_misses, first_seen_at, last_seen_at, \
             acknowledged_at, resolved_at, resolution_evidence, key_event_ids",
        )
        .bind(existing.id)
        .bind(occurrence_count)
        .bind(now)
        .bind(&key_event_ids_json)
        .bind(&severity)
        .fetch_one(&mut **tx)
        .await?;
        Ok(finding)
    }

    pub async fn list(&self, system_id: Uuid, status: Option<&str>, limit: i64) -> AppResult<Vec<Finding>> {
        let rows = sqlx::query_as::<_, Finding>(
            "SELECT id, system_id, fingerprint, text, criterion_slug, severity, original_severity, \
             status, occurrence_count, consecutive_misses, first_seen_at, last_seen_at, \
             acknowledged_at, resolved_at, resolution_evidence, key_event_ids \
             FROM findings WHERE system_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY last_seen_at DESC LIMIT $3",
        )
        .bind(system_id)
        .bind(status)
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.store.pool)
        .await?;
        Ok(rows)
    }

    pub async fn acknowledge(&self, id: Uuid) -> AppResult<Finding> {
        // Idempotent: acknowledging an already-acknowledged finding is a no-op success.
        let finding = sqlx::query_as::<_, Finding>(
            "SELECT id, system_id, fingerprint, text, criterion_slug, severity, original_severity, \
             status, occurrence_count, consecutive_misses, first_seen_at, last_seen_at, \
             acknowledged_at, resolved_at, resolution_evidence, key_event_ids FROM findings WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.store.pool)
        .await?
        .ok_or_else(|| crate::error::AppError::NotFound(format!("finding {id} not found")))?;

        if finding.status == "acknowledged" {
            return Ok(finding);
        }
        if finding.status != "open" {
            return Err(crate::error::AppError::Validation(format!("finding {id} is {}, cannot acknowledge", finding.status)));
        }

        sqlx::query_as::<_, Finding>(
            "UPDATE findings SET status = 'acknowledged', acknowledged_at = now() WHERE id = $1 \
             RETURNING id, system_id, fingerprint, text, criterion_slug, severity, original_severity, \
             status, occurrence_count, consecutive_misses, first_seen_at, last_seen_at, \
             acknowledged_at, resolved_at, resolution_evidence, key_event_ids",
        )
        .bind(id)
        .fetch_one(&self.store.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn reopen(&self, id: Uuid) -> AppResult<Finding> {
        let finding = sqlx::query_as::<_, Finding>(
            "SELECT id, system_id, fingerprint, text, criterion_slug, severity, original_severity, \
             status, occurrence_count, consecutive_misses, first_seen_at, last_seen_at, \
             acknowledged_at, resolved_at, resolution_evidence, key_event_ids FROM findings WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.store.pool)
        .await?
        .ok_or_else(|| crate::error::AppError::NotFound(format!("finding {id} not found")))?;

        // Reopen on an already-open finding is a no-op.
        if finding.status == "open" {
            return Ok(finding);
        }
        if finding.status != "acknowledged" && finding.status != "resolved" {
            return Err(crate::error::AppError::Validation(format!("finding {id} is {}, cannot reopen", finding.status)));
        }

        // occurrence_count is preserved on reopen, not reset. Resolved is
        // terminal except by this explicit reopen, which clears both
        // acknowledged_at and resolved_at/resolution_evidence so the finding
        // reads as freshly open regardless of which terminal state it left.
        sqlx::query_as::<_, Finding>(
            "UPDATE findings SET status = 'open', acknowledged_at = NULL, resolved_at = NULL, resolution_evidence = NULL WHERE id = $1 \
             RETURNING id, system_id, fingerprint, text, criterion_slug, severity, original_severity, \
             status, occurrence_count, consecutive_misses, first_seen_at, last_seen_at, \
             acknowledged_at, resolved_at, resolution_evidence, key_event_ids",
        )
        .bind(id)
        .fetch_one(&self.store.pool)
        .await
        .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jaccard_over_threshold_for_similar_findings() {
        let a = fingerprint_text("High CPU on worker-3");
        let b = fingerprint_text("High CPU on worker-3 observed");
        assert!(token_jaccard(&a, &b) >= 0.6);
    }

    #[test]
    fn severity_decay_floors_at_info() {
        let mut s = Severity::Critical;
        for _ in 0..10 {
            s = s.decay_one_level();
        }
        assert_eq!(s.as_str(), "info");
    }

    #[test]
    fn fingerprint_truncates_to_240_chars() {
        let long = "word ".repeat(200);
        let fp = fingerprint_text(&long);
        assert!(fp.chars().count() <= 240);
    }
}
