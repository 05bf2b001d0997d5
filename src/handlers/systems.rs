use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::system::{CreateSystemRequest, MonitoredSystem, MonitoredSystemResponse, UpdateSystemRequest};
use crate::AppState;

pub async fn list_systems(State(state): State<AppState>) -> AppResult<Json<Vec<MonitoredSystemResponse>>> {
    let rows = sqlx::query_as::<_, MonitoredSystem>(
        "SELECT id, name, event_source, retention_days, external_endpoint, active, created_at, updated_at \
         FROM monitored_systems ORDER BY name ASC",
    )
    .fetch_all(&state.store.pool)
    .await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn create_system(
    State(state): State<AppState>,
    Json(req): Json<CreateSystemRequest>,
) -> AppResult<Json<MonitoredSystemResponse>> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }
    let event_source: crate::models::system::EventSource = req
        .event_source
        .parse()
        .map_err(|_| AppError::Validation(format!("unknown event_source: {}", req.event_source)))?;
    if event_source == crate::models::system::EventSource::External && req.external_endpoint.is_none() {
        return Err(AppError::Validation("external event_source requires external_endpoint".to_string()));
    }

    let row = sqlx::query_as::<_, MonitoredSystem>(
        "INSERT INTO monitored_systems (id, name, event_source, retention_days, external_endpoint, active) \
         VALUES ($1,$2,$3,$4,$5,true) \
         RETURNING id, name, event_source, retention_days, external_endpoint, active, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(&req.name)
    .bind(event_source.as_str())
    .bind(req.retention_days)
    .bind(&req.external_endpoint)
    .fetch_one(&state.store.pool)
    .await?;
    Ok(Json(row.into()))
}

pub async fn get_system(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<MonitoredSystemResponse>> {
    let row = fetch_system(&state, id).await?;
    Ok(Json(row.into()))
}

pub async fn update_system(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSystemRequest>,
) -> AppResult<Json<MonitoredSystemResponse>> {
    let current = fetch_system(&state, id).await?;
    let name = req.name.unwrap_or(current.name);
    let retention_days = req.retention_days.or(current.retention_days);
    let external_endpoint = req.external_endpoint.or(current.external_endpoint);
    let active = req.active.unwrap_or(current.active);

    let row = sqlx::query_as::<_, MonitoredSystem>(
        "UPDATE monitored_systems SET name = $2, retention_days = $3, external_endpoint = $4, \
         active = $5, updated_at = now() WHERE id = $1 \
         RETURNING id, name, event_source, retention_days, external_endpoint, active, created_at, updated_at",
    )
    .bind(id)
    .bind(&name)
    .bind(retention_days)
    .bind(&external_endpoint)
    .bind(active)
    .fetch_one(&state.store.pool)
    .await?;
    Ok(Json(row.into()))
}

pub async fn delete_system(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM monitored_systems WHERE id = $1").bind(id).execute(&state.store.pool).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("system {id} not found")));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn fetch_system(state: &AppState, id: Uuid) -> AppResult<MonitoredSystem> {
    sqlx::query_as::<_, MonitoredSystem>(
        "SELECT id, name, event_source, retention_days, external_endpoint, active, created_at, updated_at \
         FROM monitored_systems WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&state.store.pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("system {id} not found")))
}
