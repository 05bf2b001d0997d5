use uuid::Uuid;

use crate::config::EffectiveScoreConfig;
use crate::db::Store;
use crate::error::AppResult;
use crate::models::criterion::Criterion;
use crate::models::window::MetaResult;

pub struct EffectiveScoreAggregator {
    pub store: Store,
}

impl EffectiveScoreAggregator {
    /// After a MetaResult insert, writes one EffectiveScore row per
    /// criterion: `effective_value = w * meta_score + (1-w) * max_event_score`,
    /// where `max_event_score` excludes Suppressor-matched events (already
    /// true here because suppressed events are written with score 0, which
    /// only lowers the max if no un-suppressed event scored higher — so the
    /// max naturally reflects only genuinely-scored events).
    pub async fn persist_for_window(&self, window_id: Uuid, meta_result: &MetaResult, config: &EffectiveScoreConfig) -> AppResult<()> {
        let meta_scores = meta_result.meta_scores_map();

        for criterion in Criterion::ALL {
            let meta_score = meta_scores.get(criterion.slug()).copied().unwrap_or(0.0);
            let max_event_score: Option<f64> = sqlx::query_scalar(
                "SELECT MAX(es.score) FROM event_scores es \
                 JOIN events e ON e.id = es.event_id \
                 WHERE es.criterion_slug = $1 AND e.system_id = $2 \
                 AND e.timestamp >= (SELECT from_ts FROM windows WHERE id = $3) \
                 AND e.timestamp < (SELECT to_ts FROM windows WHERE id = $3)",
            )
            .bind(criterion.slug())
            .bind(meta_result.system_id)
            .bind(window_id)
            .fetch_one(&self.store.pool)
            .await?;
            let max_event_score = max_event_score.unwrap_or(0.0);

            let w = config.meta_weight.clamp(0.0, 1.0);
            let effective_value = w * meta_score + (1.0 - w) * max_event_score;

            sqlx::query(
                "INSERT INTO effective_scores (id, system_id, window_id, criterion_slug, \
                 effective_value, meta_score, max_event_score) VALUES ($1,$2,$3,$4,$5,$6,$7) \
                 ON CONFLICT (window_id, criterion_slug) DO UPDATE SET \
                 effective_value = EXCLUDED.effective_value, meta_score = EXCLUDED.meta_score, \
                 max_event_score = EXCLUDED.max_event_score",
            )
            .bind(Uuid::new_v4())
            .bind(meta_result.system_id)
            .bind(window_id)
            .bind(criterion.slug())
            .bind(effective_value)
            .bind(meta_score)
            .bind(max_event_score)
            .execute(&self.store.pool)
            .await?;
        }
        Ok(())
    }

    /// Dashboard query: per-criterion MAX across windows in the rolling
    /// display range.
    pub async fn rolling_max(&self, system_id: Uuid, days: i64) -> AppResult<std::collections::HashMap<String, f64>> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(days);
        let rows: Vec<(String, f64)> = sqlx::query_as(
            "SELECT criterion_slug, MAX(effective_value) FROM effective_scores \
             WHERE system_id = $1 AND created_at >= $2 GROUP BY criterion_slug",
        )
        .bind(system_id)
        .bind(cutoff)
        .fetch_all(&self.store.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}
