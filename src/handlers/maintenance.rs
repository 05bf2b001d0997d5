use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;

use crate::backup;
use crate::config::BackupConfig;
use crate::error::{AppError, AppResult};
use crate::models::usage::{BackupRunResult, MaintenanceRunResult};
use crate::AppState;

pub async fn run_maintenance_now(State(state): State<AppState>) -> AppResult<Json<MaintenanceRunResult>> {
    let config = state.config.get().await;
    let result = crate::maintenance::run_maintenance_tick(&state.maintenance, &config)
        .await
        .map_err(AppError::Internal)?;
    state.store.write_audit("api", "maintenance_run", None, serde_json::to_value(&result).unwrap_or_default()).await?;
    Ok(Json(result))
}

pub async fn get_backup_config(State(state): State<AppState>) -> AppResult<Json<BackupConfig>> {
    Ok(Json(state.config.get().await.backup))
}

pub async fn put_backup_config(State(state): State<AppState>, Json(req): Json<BackupConfig>) -> AppResult<Json<BackupConfig>> {
    state.config.set_section("backup", &req).await?;
    Ok(Json(req))
}

pub async fn trigger_backup(State(state): State<AppState>) -> AppResult<Json<BackupRunResult>> {
    let config = state.config.get().await;
    let result = backup::run_backup(&config.backup).await;
    state.store.write_audit("api", "backup_trigger", result.file_path.as_deref(), serde_json::to_value(&result).unwrap_or_default()).await?;
    Ok(Json(result))
}

pub async fn list_backups(State(state): State<AppState>) -> AppResult<Json<Vec<String>>> {
    let config = state.config.get().await;
    let names = backup::list_backups(&config.backup.directory).await.map_err(AppError::Internal)?;
    Ok(Json(names))
}

pub async fn delete_backup(State(state): State<AppState>, Path(file_name): Path<String>) -> AppResult<Json<serde_json::Value>> {
    let config = state.config.get().await;
    backup::delete_backup(&config.backup.directory, &file_name).await.map_err(|e| AppError::Validation(e.to_string()))?;
    state.store.write_audit("api", "backup_delete", Some(&file_name), serde_json::json!({})).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn download_backup(State(state): State<AppState>, Path(file_name): Path<String>) -> AppResult<impl IntoResponse> {
    if file_name.contains('/') || file_name.contains("..") {
        return Err(AppError::Validation("invalid backup file name".to_string()));
    }
    let config = state.config.get().await;
    let path = std::path::Path::new(&config.backup.directory).join(&file_name);
    let file = tokio::fs::File::open(&path).await.map_err(|_| AppError::NotFound(format!("backup {file_name} not found")))?;
    let stream = tokio_util::io::ReaderStream::new(file);
    let body = Body::from_stream(stream);
    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{file_name}\"")),
    ];
    Ok((headers, body))
}
