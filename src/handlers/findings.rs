use axum::extract::{Path, Query, State};
use axum::Json;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::finding::{FindingResponse, ListFindingsRequest};
use crate::AppState;

pub async fn list_findings(
    State(state): State<AppState>,
    Path(system_id): Path<Uuid>,
    Query(req): Query<ListFindingsRequest>,
) -> AppResult<Json<Vec<FindingResponse>>> {
    let rows = state.finding_engine.list(system_id, req.status.as_deref(), req.limit).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn acknowledge_finding(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<FindingResponse>> {
    let finding = state.finding_engine.acknowledge(id).await?;
    state.store.write_audit("api", "acknowledge", Some(&id.to_string()), serde_json::json!({ "kind": "finding" })).await?;
    Ok(Json(finding.into()))
}

pub async fn reopen_finding(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<FindingResponse>> {
    let finding = state.finding_engine.reopen(id).await?;
    state.store.write_audit("api", "reopen", Some(&id.to_string()), serde_json::json!({ "kind": "finding" })).await?;
    Ok(Json(finding.into()))
}
