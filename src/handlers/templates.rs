use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::suppressor::{CreateNormalBehaviorRequest, NormalBehaviorTemplate, NormalBehaviorTemplateResponse};
use crate::AppState;

pub async fn list_templates(State(state): State<AppState>, Path(system_id): Path<Uuid>) -> AppResult<Json<Vec<NormalBehaviorTemplateResponse>>> {
    let rows = sqlx::query_as::<_, NormalBehaviorTemplate>(
        "SELECT id, system_id, pattern_regex, host_pattern, program_pattern, enabled, created_at \
         FROM normal_behavior_templates WHERE system_id = $1 ORDER BY created_at DESC",
    )
    .bind(system_id)
    .fetch_all(&state.store.pool)
    .await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Creating a template retroactively zeroes every already-scored event it
/// now matches (within the retention horizon), then flushes the template
/// cache so a subsequent scoring tick recomputes fresh templates.
pub async fn create_template(
    State(state): State<AppState>,
    Path(system_id): Path<Uuid>,
    Json(req): Json<CreateNormalBehaviorRequest>,
) -> AppResult<Json<NormalBehaviorTemplateResponse>> {
    if regex::Regex::new(&req.pattern_regex).is_err() {
        return Err(AppError::Validation(format!("invalid pattern_regex: {}", req.pattern_regex)));
    }

    let row = sqlx::query_as::<_, NormalBehaviorTemplate>(
        "INSERT INTO normal_behavior_templates (id, system_id, pattern_regex, host_pattern, program_pattern, enabled) \
         VALUES ($1,$2,$3,$4,$5,$6) \
         RETURNING id, system_id, pattern_regex, host_pattern, program_pattern, enabled, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(system_id)
    .bind(&req.pattern_regex)
    .bind(&req.host_pattern)
    .bind(&req.program_pattern)
    .bind(req.enabled)
    .fetch_one(&state.store.pool)
    .await?;

    if row.enabled {
        let config = state.config.get().await;
        state.suppressor.apply_retroactive(system_id, config.retention.default_retention_days).await?;
        state.template_cache.flush(system_id).await?;
        state.store.write_audit("api", "cache_flush", Some(&system_id.to_string()), serde_json::json!({ "reason": "template_created" })).await?;
    }

    state
        .store
        .write_audit("api", "create_template", Some(&row.id.to_string()), serde_json::json!({ "system_id": system_id }))
        .await?;
    Ok(Json(row.into()))
}

pub async fn toggle_template(
    State(state): State<AppState>,
    Path((system_id, id)): Path<(Uuid, Uuid)>,
    Json(enabled): Json<bool>,
) -> AppResult<Json<NormalBehaviorTemplateResponse>> {
    let row = sqlx::query_as::<_, NormalBehaviorTemplate>(
        "UPDATE normal_behavior_templates SET enabled = $2 WHERE id = $1 AND system_id = $3 \
         RETURNING id, system_id, pattern_regex, host_pattern, program_pattern, enabled, created_at",
    )
    .bind(id)
    .bind(enabled)
    .bind(system_id)
    .fetch_optional(&state.store.pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("template {id} not found")))?;

    state.suppressor.rebuild(system_id).await?;
    if enabled {
        let config = state.config.get().await;
        state.suppressor.apply_retroactive(system_id, config.retention.default_retention_days).await?;
        state.template_cache.flush(system_id).await?;
        state.store.write_audit("api", "cache_flush", Some(&system_id.to_string()), serde_json::json!({ "reason": "template_enabled" })).await?;
    }

    state
        .store
        .write_audit("api", "toggle_template", Some(&id.to_string()), serde_json::json!({ "system_id": system_id, "enabled": enabled }))
        .await?;
    Ok(Json(row.into()))
}

pub async fn delete_template(State(state): State<AppState>, Path((system_id, id)): Path<(Uuid, Uuid)>) -> AppResult<Json<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM normal_behavior_templates WHERE id = $1 AND system_id = $2")
        .bind(id)
        .bind(system_id)
        .execute(&state.store.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("template {id} not found")));
    }
    state.suppressor.rebuild(system_id).await?;
    state
        .store
        .write_audit("api", "delete_template", Some(&id.to_string()), serde_json::json!({ "system_id": system_id }))
        .await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
