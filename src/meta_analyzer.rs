use chrono::Timelike;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::MetaConfig;
use crate::db::Store;
use crate::error::AppResult;
use crate::llm_adapter::LlmAdapter;
use crate::models::event::Event;
use crate::models::window::{MetaResult, Window};
use crate::privacy_filter::PrivacyFilterHandle;
use crate::suppressor::Suppressor;

pub struct MetaAnalyzer {
    pub store: Store,
    pub suppressor: Arc<Suppressor>,
    pub llm: Arc<LlmAdapter>,
    pub privacy: Arc<PrivacyFilterHandle>,
}

/// Max per-criterion score across an event's EventScore rows; 0 for an
/// event with no scores yet.
async fn max_event_score(store: &Store, event_id: Uuid) -> AppResult<f64> {
    let max: Option<f64> = sqlx::query_scalar("SELECT MAX(score) FROM event_scores WHERE event_id = $1")
        .bind(event_id)
        .fetch_one(&store.pool)
        .await?;
    Ok(max.unwrap_or(0.0))
}

impl MetaAnalyzer {
    /// Creates at most one new Window per tick for a system, selects its
    /// events, optionally skips the LLM call entirely, and persists the
    /// MetaResult. Returns the created (window, meta_result) pair, or `None`
    /// when there was no new interval to analyze (scoring hasn't caught up
    /// yet, or the window would be empty of wall-clock time).
    pub async fn run_for_system(&self, system_id: Uuid, config: &MetaConfig) -> AppResult<Option<(Window, MetaResult)>> {
        let now = floor_to_minute(chrono::Utc::now());
        let last_to = self.last_window_end(system_id).await?;
        let from_ts = last_to.unwrap_or_else(|| now - chrono::Duration::minutes(config.window_minutes));

        if now <= from_ts {
            return Ok(None);
        }

        let window_id = Uuid::new_v4();
        let window = sqlx::query_as::<_, Window>(
            "INSERT INTO windows (id, system_id, from_ts, to_ts) VALUES ($1,$2,$3,$4) \
             RETURNING id, system_id, from_ts, to_ts, created_at",
        )
        .bind(window_id)
        .bind(system_id)
        .bind(from_ts)
        .bind(now)
        .fetch_one(&self.store.pool)
        .await?;

        let candidate_events = sqlx::query_as::<_, Event>(
            "SELECT id, system_id, timestamp, message, host, program, severity, service, \
             facility, source_ip, trace_id, span_id, external_id, template_id, acknowledged_at, raw \
             FROM events WHERE system_id = $1 AND timestamp >= $2 AND timestamp < $3 \
             ORDER BY timestamp ASC",
        )
        .bind(system_id)
        .bind(from_ts)
        .bind(now)
        .fetch_all(&self.store.pool)
        .await?;

        let mut scored: Vec<(Event, f64)> = Vec::with_capacity(candidate_events.len());
        for e in candidate_events {
            if self.suppressor.matches(&e).await? {
                continue;
            }
            let max_score = max_event_score(&self.store, e.id).await?;
            if config.filter_zero_score_meta_events && max_score == 0.0 {
                continue;
            }
            scored.push((e, max_score));
        }

        if config.prioritize_high_scores {
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        }
        scored.truncate(config.max_events);

        let meta_result = if config.skip_zero_score_meta && scored.iter().all(|(_, s)| *s == 0.0) {
            self.synthesize_neutral(window_id, system_id).await?
        } else {
            let events: Vec<Event> = scored.into_iter().map(|(e, _)| e).collect();
            let prior_summaries = self.prior_summaries(system_id, config.context_window_size).await?;
            let privacy = self.privacy.current();
            let outcome = self.llm.meta_analyze(system_id, &privacy, &events, &prior_summaries).await?;
            self.persist_outcome(window_id, system_id, outcome).await?
        };

        Ok(Some((window, meta_result)))
    }

    async fn last_window_end(&self, system_id: Uuid) -> AppResult<Option<chrono::DateTime<chrono::Utc>>> {
        let to_ts: Option<chrono::DateTime<chrono::Utc>> =
            sqlx::query_scalar("SELECT MAX(to_ts) FROM windows WHERE system_id = $1")
                .bind(system_id)
                .fetch_one(&self.store.pool)
                .await?;
        Ok(to_ts)
    }

    async fn prior_summaries(&self, system_id: Uuid, n: usize) -> AppResult<Vec<String>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT summary FROM meta_results WHERE system_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(system_id)
        .bind(n as i64)
        .fetch_all(&self.store.pool)
        .await?;
        Ok(rows)
    }

    async fn synthesize_neutral(&self, window_id: Uuid, system_id: Uuid) -> AppResult<MetaResult> {
        let zeros = serde_json::to_value(crate::llm_adapter::empty_criterion_map()).unwrap_or(serde_json::json!({}));
        sqlx::query_as::<_, MetaResult>(
            "INSERT INTO meta_results (id, window_id, system_id, summary, meta_scores, findings, \
             recommended_action, key_event_ids) VALUES ($1,$2,$3,$4,$5,'[]','[]') \
             RETURNING id, window_id, system_id, summary, meta_scores, findings, recommended_action, key_event_ids, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(window_id)
        .bind(system_id)
        .bind("no notable activity")
        .bind(&zeros)
        .fetch_one(&self.store.pool)
        .await
        .map_err(Into::into)
    }

    async fn persist_outcome(&self, window_id: Uuid, system_id: Uuid, outcome: crate::models::window::MetaAnalysisOutcome) -> AppResult<MetaResult> {
        let meta_scores = serde_json::to_value(&outcome.meta_scores).unwrap_or(serde_json::json!({}));
        let findings = serde_json::to_value(&outcome.findings).unwrap_or(serde_json::json!([]));
        let key_event_ids: Vec<Uuid> = outcome.findings.iter().flat_map(|f| f.key_event_ids.clone()).collect();
        let key_event_ids_json = serde_json::to_value(&key_event_ids).unwrap_or(serde_json::json!([]));

        sqlx::query_as::<_, MetaResult>(
            "INSERT INTO meta_results (id, window_id, system_id, summary, meta_scores, findings, \
             recommended_action, key_event_ids) VALUES ($1,$2,$3,$4,$5,$6,$7,$8) \
             RETURNING id, window_id, system_id, summary, meta_scores, findings, recommended_action, key_event_ids, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(window_id)
        .bind(system_id)
        .bind(&outcome.summary)
        .bind(&meta_scores)
        .bind(&findings)
        .bind(&outcome.recommended_action)
        .bind(&key_event_ids_json)
        .fetch_one(&self.store.pool)
        .await
        .map_err(Into::into)
    }
}

fn floor_to_minute(t: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
    t.date_naive()
        .and_hms_opt(t.time().hour(), t.time().minute(), 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(t)
}
