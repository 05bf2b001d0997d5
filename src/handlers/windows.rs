use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::window::{MetaResult, MetaResultResponse};
use crate::AppState;

pub async fn get_window_meta(State(state): State<AppState>, Path(window_id): Path<Uuid>) -> AppResult<Json<MetaResultResponse>> {
    let row = sqlx::query_as::<_, MetaResult>(
        "SELECT id, window_id, system_id, summary, meta_scores, findings, recommended_action, \
         key_event_ids, created_at FROM meta_results WHERE window_id = $1",
    )
    .bind(window_id)
    .fetch_optional(&state.store.pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("window {window_id} has no meta result")))?;
    Ok(Json(row.into()))
}
