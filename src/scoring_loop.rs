use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ScoringConfig;
use crate::db::Store;
use crate::error::AppResult;
use crate::llm_adapter::LlmAdapter;
use crate::models::event::Event;
use crate::models::score::ScoreType;
use crate::privacy_filter::PrivacyFilterHandle;
use crate::suppressor::Suppressor;
use crate::template_cache::TemplateCache;

pub struct ScoringLoop {
    pub store: Store,
    pub template_cache: Arc<TemplateCache>,
    pub suppressor: Arc<Suppressor>,
    pub llm: Arc<LlmAdapter>,
    pub privacy: Arc<PrivacyFilterHandle>,
}

impl ScoringLoop {
    /// Selects unscored recent events for one system, groups by template,
    /// fans out cached vectors or submits LLM batches, persists
    /// EventScores. Suppressor-matched events get `score=0` without an LLM
    /// call.
    pub async fn run_for_system(&self, system_id: Uuid, config: &ScoringConfig) -> AppResult<usize> {
        let events = self.select_unscored(system_id, config).await?;
        if events.is_empty() {
            return Ok(0);
        }

        let mut suppressed = Vec::new();
        let mut scoreable = Vec::new();
        for e in events {
            if self.suppressor.matches(&e).await? {
                suppressed.push(e);
            } else if config.severity_skip_list.iter().any(|s| e.severity.as_deref() == Some(s.as_str())) {
                // severity-filtered events receive a zero vector, same as suppressed ones
                suppressed.push(e);
            } else {
                scoreable.push(e);
            }
        }

        for e in &suppressed {
            self.write_zero_score(e).await?;
        }

        // group by template_id, preserving timestamp-ascending order within
        // each group (events arrive already ordered from select_unscored).
        let mut groups: HashMap<Uuid, Vec<Event>> = HashMap::new();
        for e in scoreable {
            let template = self
                .template_cache
                .resolve_template(system_id, &e.message, config.message_max_length)
                .await?;
            self.link_template(e.id, template.id).await?;
            groups.entry(template.id).or_default().push(e);
        }

        let mut scored_count = 0usize;
        for (template_id, group_events) in groups {
            let template = sqlx::query_as::<_, crate::models::template::MessageTemplate>(
                "SELECT id, system_id, fingerprint, pattern, cached_scores, last_scored_at, \
                 avg_max_score, scoring_count, created_at FROM message_templates WHERE id = $1",
            )
            .bind(template_id)
            .fetch_one(&self.store.pool)
            .await?;

            let now = chrono::Utc::now();
            let fresh_cached = template.is_fresh(config.score_cache_ttl_minutes, now);
            let low_interest = config.low_score_auto_skip_enabled
                && self
                    .template_cache
                    .is_low_interest(template_id, config.low_score_threshold, config.low_score_min_scorings)
                    .await?;

            if fresh_cached || low_interest {
                let cached = template.cached_scores_map();
                for e in &group_events {
                    self.write_score_from_map(e, &cached, "cached", &[]).await?;
                }
                continue;
            }

            for chunk in group_events.chunks(config.batch_size) {
                let privacy = self.privacy.current();
                let vectors = self.llm.score_batch(system_id, &privacy, chunk).await?;
                for (event, vector) in chunk.iter().zip(vectors.iter()) {
                    self.write_score_from_map(event, &vector.criterion_scores, &vector.severity_label, &vector.reason_codes).await?;
                }
                if let Some(last_vector) = vectors.last() {
                    self.template_cache.record_scores(template_id, &last_vector.criterion_scores).await?;
                }
                scored_count += chunk.len();
            }
        }

        Ok(scored_count + suppressed.len())
    }

    async fn select_unscored(&self, system_id: Uuid, config: &ScoringConfig) -> AppResult<Vec<Event>> {
        let rows = sqlx::query_as::<_, Event>(
            "SELECT e.id, e.system_id, e.timestamp, e.message, e.host, e.program, e.severity, \
             e.service, e.facility, e.source_ip, e.trace_id, e.span_id, e.external_id, \
             e.template_id, e.acknowledged_at, e.raw \
             FROM events e \
             WHERE e.system_id = $1 \
             AND NOT EXISTS (SELECT 1 FROM event_scores es WHERE es.event_id = e.id) \
             ORDER BY e.timestamp ASC LIMIT $2",
        )
        .bind(system_id)
        .bind(config.limit_per_run)
        .fetch_all(&self.store.pool)
        .await?;
        Ok(rows)
    }

    async fn link_template(&self, event_id: Uuid, template_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE events SET template_id = $2 WHERE id = $1")
            .bind(event_id)
            .bind(template_id)
            .execute(&self.store.pool)
            .await?;
        Ok(())
    }

    async fn write_zero_score(&self, event: &Event) -> AppResult<()> {
        let zero = crate::llm_adapter::empty_criterion_map();
        self.write_score_from_map(event, &zero, "info", &[]).await
    }

    async fn write_score_from_map(&self, event: &Event, scores: &HashMap<String, f64>, severity_label: &str, reason_codes: &[String]) -> AppResult<()> {
        let reason_json = serde_json::to_value(reason_codes).unwrap_or(serde_json::json!([]));
        for criterion in crate::models::criterion::Criterion::ALL {
            let score = scores.get(criterion.slug()).copied().unwrap_or(0.0);
            sqlx::query(
                "INSERT INTO event_scores (id, event_id, system_id, criterion_slug, score, \
                 score_type, severity_label, reason_codes) VALUES ($1,$2,$3,$4,$5,$6,$7,$8) \
                 ON CONFLICT (event_id, criterion_slug) DO NOTHING",
            )
            .bind(Uuid::new_v4())
            .bind(event.id)
            .bind(event.system_id)
            .bind(criterion.slug())
            .bind(score)
            .bind(ScoreType::Event.as_str())
            .bind(severity_label)
            .bind(&reason_json)
            .execute(&self.store.pool)
            .await?;
        }
        Ok(())
    }
}
