use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::event::{
    AcknowledgeEventsRequest, BulkDeleteRequest, EventResponse, IngestEventsRequest, SearchEventsRequest,
};
use crate::models::system::MonitoredSystem;
use crate::AppState;

async fn system_store(state: &AppState, system_id: Uuid) -> AppResult<Box<dyn crate::event_store::EventStore>> {
    let system = sqlx::query_as::<_, MonitoredSystem>(
        "SELECT id, name, event_source, retention_days, external_endpoint, active, created_at, updated_at \
         FROM monitored_systems WHERE id = $1",
    )
    .bind(system_id)
    .fetch_optional(&state.store.pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("system {system_id} not found")))?;
    state.event_stores.for_system(&system.event_source, system.external_endpoint.as_deref())
}

pub async fn ingest_events(
    State(state): State<AppState>,
    Path(system_id): Path<Uuid>,
    Json(req): Json<IngestEventsRequest>,
) -> AppResult<Json<Vec<EventResponse>>> {
    if req.events.is_empty() {
        return Err(AppError::Validation("events must not be empty".to_string()));
    }
    let store = system_store(&state, system_id).await?;
    let inserted = store.ingest(system_id, req.events).await?;
    Ok(Json(inserted.into_iter().map(Into::into).collect()))
}

pub async fn search_events(
    State(state): State<AppState>,
    Path(system_id): Path<Uuid>,
    Query(req): Query<SearchEventsRequest>,
) -> AppResult<Json<Vec<EventResponse>>> {
    let store = system_store(&state, system_id).await?;
    let rows = store
        .search(system_id, req.q.as_deref(), req.time_range.from, req.time_range.to, req.limit, req.offset)
        .await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Deserialize, Default)]
pub struct GroupedQuery {
    pub criterion_id: Option<String>,
    pub min_score: Option<f64>,
    #[serde(default)]
    pub show_acknowledged: bool,
    #[serde(default = "default_grouped_limit")]
    pub limit: i64,
}

fn default_grouped_limit() -> i64 {
    100
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct GroupedEventScoreRow {
    pub group_key: String,
    pub message: String,
    pub occurrence_count: i64,
    pub first_seen: chrono::DateTime<chrono::Utc>,
    pub last_seen: chrono::DateTime<chrono::Utc>,
    pub hosts: Vec<String>,
    pub source_ips: Vec<String>,
    pub program: Option<String>,
    pub severity: Option<String>,
    pub criterion_slug: String,
    pub score: f64,
    pub severity_label: String,
    pub reason_codes: Vec<String>,
    pub acknowledged: bool,
}

pub async fn list_grouped_event_scores(
    State(state): State<AppState>,
    Path(system_id): Path<Uuid>,
    Query(q): Query<GroupedQuery>,
) -> AppResult<Json<Vec<GroupedEventScoreRow>>> {
    let rows = sqlx::query_as::<_, GroupedEventScoreRow>(
        "SELECT COALESCE(e.template_id::text, e.id::text) AS group_key, \
         MIN(e.message) AS message, COUNT(*) AS occurrence_count, \
         MIN(e.timestamp) AS first_seen, MAX(e.timestamp) AS last_seen, \
         COALESCE(array_agg(DISTINCT e.host) FILTER (WHERE e.host IS NOT NULL), ARRAY[]::text[]) AS hosts, \
         COALESCE(array_agg(DISTINCT e.source_ip) FILTER (WHERE e.source_ip IS NOT NULL), ARRAY[]::text[]) AS source_ips, \
         MIN(e.program) AS program, MIN(e.severity) AS severity, \
         es.criterion_slug, MAX(es.score) AS score, MIN(es.severity_label) AS severity_label, \
         COALESCE(array_agg(DISTINCT rc.code) FILTER (WHERE rc.code IS NOT NULL), ARRAY[]::text[]) AS reason_codes, \
         bool_or(e.acknowledged_at IS NOT NULL) AS acknowledged \
         FROM events e JOIN event_scores es ON es.event_id = e.id \
         LEFT JOIN LATERAL jsonb_array_elements_text(es.reason_codes) AS rc(code) ON true \
         WHERE e.system_id = $1 \
         AND ($2::text IS NULL OR es.criterion_slug = $2) \
         AND ($3::float8 IS NULL OR es.score >= $3) \
         AND ($4::bool OR e.acknowledged_at IS NULL) \
         GROUP BY COALESCE(e.template_id::text, e.id::text), es.criterion_slug \
         ORDER BY MAX(es.score) DESC LIMIT $5",
    )
    .bind(system_id)
    .bind(&q.criterion_id)
    .bind(q.min_score)
    .bind(q.show_acknowledged)
    .bind(q.limit.clamp(1, 500))
    .fetch_all(&state.store.pool)
    .await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize, Default)]
pub struct GroupedEventsQuery {
    pub criterion_id: Option<String>,
    #[serde(default = "default_grouped_limit")]
    pub limit: i64,
}

pub async fn list_grouped_group_events(
    State(state): State<AppState>,
    Path((system_id, group_key)): Path<(Uuid, String)>,
    Query(q): Query<GroupedEventsQuery>,
) -> AppResult<Json<Vec<EventResponse>>> {
    let rows = sqlx::query_as::<_, crate::models::event::Event>(
        "SELECT e.id, e.system_id, e.timestamp, e.message, e.host, e.program, e.severity, \
         e.service, e.facility, e.source_ip, e.trace_id, e.span_id, e.external_id, \
         e.template_id, e.acknowledged_at, e.raw \
         FROM events e WHERE e.system_id = $1 \
         AND ((e.template_id IS NOT NULL AND e.template_id::text = $2) \
              OR (e.template_id IS NULL AND e.id::text = $2)) \
         AND ($3::text IS NULL OR EXISTS (SELECT 1 FROM event_scores es WHERE es.event_id = e.id AND es.criterion_slug = $3)) \
         ORDER BY e.timestamp DESC LIMIT $4",
    )
    .bind(system_id)
    .bind(&group_key)
    .bind(&q.criterion_id)
    .bind(q.limit.clamp(1, 500))
    .fetch_all(&state.store.pool)
    .await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn bulk_delete_events(
    State(state): State<AppState>,
    Json(req): Json<BulkDeleteRequest>,
) -> AppResult<Json<crate::models::event::DeleteCounts>> {
    if req.confirmation != "YES" {
        return Err(AppError::Validation("confirmation must be the literal string YES".to_string()));
    }
    if req.system_id.is_none() && req.from.is_none() && req.to.is_none() {
        return Err(AppError::Validation("bulk-delete requires at least one of system_id/from/to".to_string()));
    }
    let store = if let Some(system_id) = req.system_id {
        system_store(&state, system_id).await?
    } else {
        Box::new(crate::event_store::PgEventStore { store: state.store.clone() })
    };
    let counts = store.bulk_delete(req.system_id, req.from, req.to).await?;
    state
        .store
        .write_audit(
            "api",
            "bulk_delete",
            req.system_id.map(|id| id.to_string()).as_deref(),
            serde_json::json!({ "from": req.from, "to": req.to, "counts": counts }),
        )
        .await?;
    Ok(Json(counts))
}

pub async fn acknowledge_events(
    State(state): State<AppState>,
    Json(req): Json<AcknowledgeEventsRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let store = if let Some(system_id) = req.system_id {
        system_store(&state, system_id).await?
    } else {
        Box::new(crate::event_store::PgEventStore { store: state.store.clone() })
    };

    let group_ids: Option<Vec<Uuid>> = match (&req.group_key, req.system_id) {
        (Some(group_key), Some(system_id)) => {
            let ids: Vec<Uuid> = sqlx::query_scalar(
                "SELECT id FROM events WHERE system_id = $1 \
                 AND ((template_id IS NOT NULL AND template_id::text = $2) \
                      OR (template_id IS NULL AND id::text = $2))",
            )
            .bind(system_id)
            .bind(group_key)
            .fetch_all(&state.store.pool)
            .await?;
            Some(ids)
        }
        (Some(_), None) => return Err(AppError::Validation("group_key requires system_id".to_string())),
        (None, _) => None,
    };

    let event_ids = group_ids.as_deref().or(req.event_ids.as_deref());
    let acknowledged = store.acknowledge(req.system_id, event_ids, req.up_to).await?;
    state
        .store
        .write_audit(
            "api",
            "acknowledge",
            req.system_id.map(|id| id.to_string()).as_deref(),
            serde_json::json!({ "group_key": req.group_key, "up_to": req.up_to, "acknowledged": acknowledged }),
        )
        .await?;
    Ok(Json(serde_json::json!({ "acknowledged": acknowledged })))
}
