use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::db::Store;
use crate::error::{AppError, AppResult};
use crate::models::event::{DeleteCounts, Event};

/// Narrow capability interface over event storage, keyed per system by
/// `event_source`. Centralizes the primary-vs-external branching in a
/// factory instead of duck-typing it inline at every call site.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn ingest(&self, system_id: Uuid, events: Vec<crate::models::event::IngestEventRequest>) -> AppResult<Vec<Event>>;
    async fn list_window(&self, system_id: Uuid, from: chrono::DateTime<chrono::Utc>, to: chrono::DateTime<chrono::Utc>, limit: i64) -> AppResult<Vec<Event>>;
    async fn get_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<Event>>;
    async fn search(&self, system_id: Uuid, q: Option<&str>, from: Option<chrono::DateTime<chrono::Utc>>, to: Option<chrono::DateTime<chrono::Utc>>, limit: i64, offset: i64) -> AppResult<Vec<Event>>;
    async fn acknowledge(&self, system_id: Option<Uuid>, event_ids: Option<&[Uuid]>, up_to: Option<chrono::DateTime<chrono::Utc>>) -> AppResult<u64>;
    async fn delete_old_events(&self, system_id: Uuid, cutoff: chrono::DateTime<chrono::Utc>) -> AppResult<DeleteCounts>;
    async fn bulk_delete(&self, system_id: Option<Uuid>, from: Option<chrono::DateTime<chrono::Utc>>, to: Option<chrono::DateTime<chrono::Utc>>) -> AppResult<DeleteCounts>;
}

/// Primary backend: the partitioned Postgres `events` table.
pub struct PgEventStore {
    pub store: Store,
}

fn row_to_event(row: sqlx::postgres::PgRow) -> Event {
    Event {
        id: row.get("id"),
        system_id: row.get("system_id"),
        timestamp: row.get("timestamp"),
        message: row.get("message"),
        host: row.get("host"),
        program: row.get("program"),
        severity: row.get("severity"),
        service: row.get("service"),
        facility: row.get("facility"),
        source_ip: row.get("source_ip"),
        trace_id: row.get("trace_id"),
        span_id: row.get("span_id"),
        external_id: row.get("external_id"),
        template_id: row.get("template_id"),
        acknowledged_at: row.get("acknowledged_at"),
        raw: row.get("raw"),
    }
}

const EVENT_COLUMNS: &str = "id, system_id, timestamp, message, host, program, severity, service, \
    facility, source_ip, trace_id, span_id, external_id, template_id, acknowledged_at, raw";

#[async_trait]
impl EventStore for PgEventStore {
    async fn ingest(&self, system_id: Uuid, events: Vec<crate::models::event::IngestEventRequest>) -> AppResult<Vec<Event>> {
        let mut inserted = Vec::with_capacity(events.len());
        for e in events {
            let id = Uuid::new_v4();
            let row = sqlx::query(&format!(
                "INSERT INTO events (id, system_id, timestamp, message, host, program, severity, \
                 service, facility, source_ip, trace_id, span_id, external_id, raw) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14) \
                 ON CONFLICT (system_id, external_id, timestamp) WHERE external_id IS NOT NULL DO NOTHING \
                 RETURNING {EVENT_COLUMNS}"
            ))
            .bind(id)
            .bind(system_id)
            .bind(e.timestamp)
            .bind(&e.message)
            .bind(&e.host)
            .bind(&e.program)
            .bind(&e.severity)
            .bind(&e.service)
            .bind(&e.facility)
            .bind(&e.source_ip)
            .bind(&e.trace_id)
            .bind(&e.span_id)
            .bind(&e.external_id)
            .bind(&e.raw)
            .fetch_optional(&self.store.pool)
            .await?;
            if let Some(row) = row {
                inserted.push(row_to_event(row));
            }
        }
        Ok(inserted)
    }

    async fn list_window(&self, system_id: Uuid, from: chrono::DateTime<chrono::Utc>, to: chrono::DateTime<chrono::Utc>, limit: i64) -> AppResult<Vec<Event>> {
        let limit = limit.clamp(1, 500);
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE system_id = $1 AND timestamp >= $2 AND timestamp < $3 \
             ORDER BY timestamp DESC LIMIT $4"
        ))
        .bind(system_id)
        .bind(from)
        .bind(to)
        .bind(limit)
        .fetch_all(&self.store.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_event).collect())
    }

    async fn get_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<Event>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ANY($1)"))
            .bind(ids)
            .fetch_all(&self.store.pool)
            .await?;
        Ok(rows.into_iter().map(row_to_event).collect())
    }

    async fn search(&self, system_id: Uuid, q: Option<&str>, from: Option<chrono::DateTime<chrono::Utc>>, to: Option<chrono::DateTime<chrono::Utc>>, limit: i64, offset: i64) -> AppResult<Vec<Event>> {
        let limit = limit.clamp(1, 500);
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE system_id = $1 \
             AND ($2::timestamptz IS NULL OR timestamp >= $2) \
             AND ($3::timestamptz IS NULL OR timestamp < $3) \
             AND ($4::text IS NULL OR message ILIKE '%' || $4 || '%') \
             ORDER BY timestamp DESC LIMIT $5 OFFSET $6"
        ))
        .bind(system_id)
        .bind(from)
        .bind(to)
        .bind(q)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.store.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_event).collect())
    }

    async fn acknowledge(&self, system_id: Option<Uuid>, event_ids: Option<&[Uuid]>, up_to: Option<chrono::DateTime<chrono::Utc>>) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE events SET acknowledged_at = now() \
             WHERE acknowledged_at IS NULL \
             AND ($1::uuid IS NULL OR system_id = $1) \
             AND ($2::uuid[] IS NULL OR id = ANY($2)) \
             AND ($3::timestamptz IS NULL OR timestamp <= $3)",
        )
        .bind(system_id)
        .bind(event_ids)
        .bind(up_to)
        .execute(&self.store.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_old_events(&self, system_id: Uuid, cutoff: chrono::DateTime<chrono::Utc>) -> AppResult<DeleteCounts> {
        self.bulk_delete(Some(system_id), None, Some(cutoff)).await
    }

    async fn bulk_delete(&self, system_id: Option<Uuid>, from: Option<chrono::DateTime<chrono::Utc>>, to: Option<chrono::DateTime<chrono::Utc>>) -> AppResult<DeleteCounts> {
        if system_id.is_none() && from.is_none() && to.is_none() {
            return Err(AppError::Validation("bulk-delete requires at least one of system_id/from/to".to_string()));
        }

        let mut total = DeleteCounts::default();
        loop {
            let mut tx = self.store.pool.begin().await?;
            let ids: Vec<Uuid> = sqlx::query_scalar(
                "SELECT id FROM events \
                 WHERE ($1::uuid IS NULL OR system_id = $1) \
                 AND ($2::timestamptz IS NULL OR timestamp >= $2) \
                 AND ($3::timestamptz IS NULL OR timestamp < $3) \
                 LIMIT 500",
            )
            .bind(system_id)
            .bind(from)
            .bind(to)
            .fetch_all(&mut *tx)
            .await?;

            if ids.is_empty() {
                tx.commit().await?;
                break;
            }

            let scores_deleted = sqlx::query("DELETE FROM event_scores WHERE event_id = ANY($1)")
                .bind(&ids)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            let events_deleted = sqlx::query("DELETE FROM events WHERE id = ANY($1)")
                .bind(&ids)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            tx.commit().await?;

            total.deleted_events += events_deleted as i64;
            total.deleted_scores += scores_deleted as i64;

            if ids.len() < 500 {
                break;
            }
        }

        total.cleaned_windows = self.clean_orphaned_windows(system_id).await?;
        Ok(total)
    }
}

impl PgEventStore {
    /// After a bulk-delete, a Window can be left referencing an interval
    /// with no surviving events. Those windows (and the meta-analysis rows
    /// that hang off them) are removed rather than left as dangling husks.
    async fn clean_orphaned_windows(&self, system_id: Option<Uuid>) -> AppResult<i64> {
        let orphaned: Vec<Uuid> = sqlx::query_scalar(
            "SELECT w.id FROM windows w \
             WHERE ($1::uuid IS NULL OR w.system_id = $1) \
             AND NOT EXISTS ( \
                 SELECT 1 FROM events e \
                 WHERE e.system_id = w.system_id AND e.timestamp >= w.from_ts AND e.timestamp < w.to_ts \
             )",
        )
        .bind(system_id)
        .fetch_all(&self.store.pool)
        .await?;

        if orphaned.is_empty() {
            return Ok(0);
        }

        let mut tx = self.store.pool.begin().await?;
        sqlx::query("DELETE FROM effective_scores WHERE window_id = ANY($1)").bind(&orphaned).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM meta_results WHERE window_id = ANY($1)").bind(&orphaned).execute(&mut *tx).await?;
        let deleted = sqlx::query("DELETE FROM windows WHERE id = ANY($1)").bind(&orphaned).execute(&mut *tx).await?.rows_affected();
        tx.commit().await?;
        Ok(deleted as i64)
    }
}

/// Secondary backend: an optional external search engine reached over HTTP.
/// It does not own retention/bulk-delete (those remain the primary store's
/// job), so those two operations return a validation error here.
pub struct ExternalEventStore {
    pub client: reqwest::Client,
    pub base_url: String,
}

#[async_trait]
impl EventStore for ExternalEventStore {
    async fn ingest(&self, system_id: Uuid, events: Vec<crate::models::event::IngestEventRequest>) -> AppResult<Vec<Event>> {
        let resp = self
            .client
            .post(format!("{}/ingest", self.base_url))
            .json(&serde_json::json!({ "system_id": system_id, "events": events }))
            .send()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;
        let parsed: Vec<ExternalEvent> = resp.json().await.map_err(|e| AppError::Upstream(e.to_string()))?;
        Ok(parsed.into_iter().map(|e| e.into_event(system_id)).collect())
    }

    async fn list_window(&self, system_id: Uuid, from: chrono::DateTime<chrono::Utc>, to: chrono::DateTime<chrono::Utc>, limit: i64) -> AppResult<Vec<Event>> {
        let resp = self
            .client
            .get(format!("{}/events", self.base_url))
            .query(&[("system_id", system_id.to_string()), ("from", from.to_rfc3339()), ("to", to.to_rfc3339()), ("limit", limit.min(500).to_string())])
            .send()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;
        let parsed: Vec<ExternalEvent> = resp.json().await.map_err(|e| AppError::Upstream(e.to_string()))?;
        Ok(parsed.into_iter().map(|e| e.into_event(system_id)).collect())
    }

    async fn get_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<Event>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let resp = self
            .client
            .post(format!("{}/events/by-ids", self.base_url))
            .json(&serde_json::json!({ "ids": ids }))
            .send()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;
        let parsed: Vec<ExternalEvent> = resp.json().await.map_err(|e| AppError::Upstream(e.to_string()))?;
        // system_id is recovered from each record; external records always
        // carry it because the external engine is multi-tenant.
        Ok(parsed.into_iter().map(|e| {
            let sid = e.system_id.unwrap_or_default();
            e.into_event(sid)
        }).collect())
    }

    async fn search(&self, system_id: Uuid, q: Option<&str>, from: Option<chrono::DateTime<chrono::Utc>>, to: Option<chrono::DateTime<chrono::Utc>>, limit: i64, offset: i64) -> AppResult<Vec<Event>> {
        let resp = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("system_id", system_id.to_string()),
                ("q", q.unwrap_or_default().to_string()),
                ("from", from.map(|t| t.to_rfc3339()).unwrap_or_default()),
                ("to", to.map(|t| t.to_rfc3339()).unwrap_or_default()),
                ("limit", limit.min(500).to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;
        let parsed: Vec<ExternalEvent> = resp.json().await.map_err(|e| AppError::Upstream(e.to_string()))?;
        Ok(parsed.into_iter().map(|e| e.into_event(system_id)).collect())
    }

    async fn acknowledge(&self, system_id: Option<Uuid>, event_ids: Option<&[Uuid]>, up_to: Option<chrono::DateTime<chrono::Utc>>) -> AppResult<u64> {
        let resp = self
            .client
            .post(format!("{}/acknowledge", self.base_url))
            .json(&serde_json::json!({ "system_id": system_id, "event_ids": event_ids, "up_to": up_to }))
            .send()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;
        let parsed: serde_json::Value = resp.json().await.map_err(|e| AppError::Upstream(e.to_string()))?;
        Ok(parsed.get("acknowledged").and_then(|v| v.as_u64()).unwrap_or(0))
    }

    async fn delete_old_events(&self, _system_id: Uuid, _cutoff: chrono::DateTime<chrono::Utc>) -> AppResult<DeleteCounts> {
        Err(AppError::Validation("external event stores do not own retention".to_string()))
    }

    async fn bulk_delete(&self, _system_id: Option<Uuid>, _from: Option<chrono::DateTime<chrono::Utc>>, _to: Option<chrono::DateTime<chrono::Utc>>) -> AppResult<DeleteCounts> {
        Err(AppError::Validation("external event stores do not own bulk-delete".to_string()))
    }
}

#[derive(Debug, serde::Deserialize)]
struct ExternalEvent {
    id: Uuid,
    system_id: Option<Uuid>,
    timestamp: chrono::DateTime<chrono::Utc>,
    message: String,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    program: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    facility: Option<String>,
    #[serde(default)]
    source_ip: Option<String>,
    #[serde(default)]
    trace_id: Option<String>,
    #[serde(default)]
    span_id: Option<String>,
    #[serde(default)]
    external_id: Option<String>,
    #[serde(default)]
    raw: serde_json::Value,
}

impl ExternalEvent {
    fn into_event(self, system_id: Uuid) -> Event {
        Event {
            id: self.id,
            system_id,
            timestamp: self.timestamp,
            message: self.message,
            host: self.host,
            program: self.program,
            severity: self.severity,
            service: self.service,
            facility: self.facility,
            source_ip: self.source_ip,
            trace_id: self.trace_id,
            span_id: self.span_id,
            external_id: self.external_id,
            template_id: None,
            acknowledged_at: None,
            raw: self.raw,
        }
    }
}

/// Picks the implementation keyed on `MonitoredSystem.event_source`,
/// centralizing the primary-vs-external branch in one place.
pub struct EventStoreFactory {
    pub store: Store,
    pub http_client: reqwest::Client,
}

impl EventStoreFactory {
    pub fn for_system(&self, event_source: &str, external_endpoint: Option<&str>) -> AppResult<Box<dyn EventStore>> {
        match event_source {
            "external" => {
                let base_url = external_endpoint
                    .ok_or_else(|| AppError::Validation("external event_source requires external_endpoint".to_string()))?
                    .to_string();
                Ok(Box::new(ExternalEventStore { client: self.http_client.clone(), base_url }))
            }
            _ => Ok(Box::new(PgEventStore { store: self.store.clone() })),
        }
    }
}
