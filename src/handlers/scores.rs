use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::system::MonitoredSystem;
use crate::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct ScoresQuery {
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SystemScores {
    pub system_id: Uuid,
    pub system_name: String,
    pub scores: std::collections::HashMap<String, f64>,
}

/// Dashboard rollup across every active system. `from`/`to` narrow the
/// rolling window the aggregator already expresses in days; when given,
/// their span overrides `effective_score.score_display_window_days`.
pub async fn list_system_scores(State(state): State<AppState>, Query(q): Query<ScoresQuery>) -> AppResult<Json<Vec<SystemScores>>> {
    let config = state.config.get().await;
    let days = match (q.from, q.to) {
        (Some(from), Some(to)) => (to - from).num_days().max(1),
        _ => config.effective_score.score_display_window_days,
    };

    let systems = sqlx::query_as::<_, MonitoredSystem>(
        "SELECT id, name, event_source, retention_days, external_endpoint, active, created_at, updated_at \
         FROM monitored_systems WHERE active = true ORDER BY name ASC",
    )
    .fetch_all(&state.store.pool)
    .await?;

    let mut out = Vec::with_capacity(systems.len());
    for system in systems {
        let scores = state.effective_score.rolling_max(system.id, days).await?;
        out.push(SystemScores { system_id: system.id, system_name: system.name, scores });
    }
    Ok(Json(out))
}
