use chrono::Datelike;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::backup::run_backup;
use crate::config::AppConfig;
use crate::config_resolver::ConfigResolver;
use crate::db::Store;
use crate::models::usage::MaintenanceRunResult;

/// Hot tables/indexes maintained every tick. A fixed const list rather
/// than an operator-tunable one.
const VACUUM_TABLES: &[&str] = &["events", "event_scores", "message_templates", "findings"];
const REINDEX_INDEXES: &[&str] = &[
    "events_system_ts_idx",
    "event_scores_event_idx",
    "findings_open_fingerprint_uidx",
];

/// Drives partition management, per-system retention, orphan cleanup,
/// VACUUM, REINDEX, and backup on a background interval loop, with
/// per-rule failure isolation and `dry_run` support via `execute_or_log`.
pub struct MaintenanceScheduler {
    pub store: Store,
    running: AtomicBool,
}

impl MaintenanceScheduler {
    pub fn new(store: Store) -> Self {
        Self { store, running: AtomicBool::new(false) }
    }
}

pub fn spawn_maintenance_scheduler(scheduler: Arc<MaintenanceScheduler>, config: Arc<ConfigResolver>) {
    tokio::spawn(async move {
        loop {
            let cfg = config.get().await;
            tokio::time::sleep(std::time::Duration::from_secs(cfg.maintenance.interval_hours * 3600)).await;
            let cfg = config.get().await;
            if let Err(e) = run_maintenance_tick(&scheduler, &cfg).await {
                tracing::error!("maintenance tick error: {e:#}");
            }
        }
    });
}

/// A mutex (here, an atomic flag) prevents overlapping runs: if a tick
/// fires while the previous is active, it is skipped rather than queued.
pub async fn run_maintenance_tick(scheduler: &MaintenanceScheduler, config: &AppConfig) -> anyhow::Result<MaintenanceRunResult> {
    if scheduler.running.swap(true, Ordering::SeqCst) {
        tracing::warn!("maintenance tick skipped: previous run still active");
        return Ok(MaintenanceRunResult::default());
    }
    let result = run_maintenance(&scheduler.store, config).await;
    scheduler.running.store(false, Ordering::SeqCst);
    result
}

async fn run_maintenance(store: &Store, config: &AppConfig) -> anyhow::Result<MaintenanceRunResult> {
    let started_at = chrono::Utc::now();
    let mut result = MaintenanceRunResult::default();

    // 1. Partition management.
    let retention_cutoff = chrono::Utc::now() - chrono::Duration::days(config.retention.default_retention_days);
    result.partitions_created = ensure_partitions(store, config.maintenance.partition_lookahead_months).await?;
    result.partitions_dropped = drop_old_partitions(store, retention_cutoff).await?;

    // 2. Per-system retention (isolated per system; one failure must not
    // block the others).
    let systems: Vec<(Uuid, Option<i64>)> = sqlx::query_as("SELECT id, retention_days FROM monitored_systems")
        .fetch_all(&store.pool)
        .await?;
    for (system_id, retention_days) in systems {
        let days = retention_days.unwrap_or(config.retention.default_retention_days);
        let cutoff = chrono::Utc::now() - chrono::Duration::days(days);
        match delete_events_older_than(store, system_id, cutoff).await {
            Ok((events, scores)) => {
                result.events_deleted += events;
                result.scores_deleted += scores;
            }
            Err(e) => {
                tracing::error!("retention failed for system {system_id}: {e:#}");
                result.errors.push(format!("retention system {system_id}: {e}"));
            }
        }
    }

    // 3. Orphan cleanup.
    result.windows_deleted = delete_orphan_windows(store).await.unwrap_or_else(|e| {
        result_error(&mut result, format!("orphan windows: {e}"));
        0
    });
    result.templates_deleted = delete_orphan_templates(store).await.unwrap_or_else(|e| {
        result_error(&mut result, format!("orphan templates: {e}"));
        0
    });

    // 4. VACUUM ANALYZE hot tables; failures logged, not fatal.
    for table in VACUUM_TABLES {
        if let Err(e) = sqlx::query(&format!("VACUUM ANALYZE {table}")).execute(&store.pool).await {
            result.vacuum_errors.push(format!("{table}: {e}"));
        }
    }

    // 5. REINDEX CONCURRENTLY hot indexes; fall back to blocking REINDEX.
    for index in REINDEX_INDEXES {
        if let Err(e) = sqlx::query(&format!("REINDEX INDEX CONCURRENTLY {index}")).execute(&store.pool).await {
            tracing::warn!("REINDEX CONCURRENTLY failed for {index}, falling back to blocking reindex: {e}");
            if let Err(e2) = sqlx::query(&format!("REINDEX INDEX {index}")).execute(&store.pool).await {
                result.reindex_errors.push(format!("{index}: {e2}"));
            }
        }
    }

    // 6. Backup.
    if config.backup.enabled {
        let elapsed_since_last = last_backup_age(store).await?;
        let due = elapsed_since_last.map(|age| age.num_hours() >= config.backup.interval_hours as i64).unwrap_or(true);
        if due {
            result.backup = Some(run_backup(&config.backup).await);
        }
    }

    // 7. Persist MaintenanceLog.
    let finished_at = chrono::Utc::now();
    let result_json = serde_json::to_value(&result).unwrap_or(serde_json::json!({}));
    sqlx::query("INSERT INTO maintenance_log (id, started_at, finished_at, result) VALUES ($1,$2,$3,$4)")
        .bind(Uuid::new_v4())
        .bind(started_at)
        .bind(finished_at)
        .bind(&result_json)
        .execute(&store.pool)
        .await?;

    Ok(result)
}

fn result_error(result: &mut MaintenanceRunResult, msg: String) {
    result.errors.push(msg);
}

fn partition_name(year: i32, month: u32) -> String {
    format!("events_y{year}m{month:02}")
}

fn month_bounds(year: i32, month: u32) -> (chrono::NaiveDate, chrono::NaiveDate) {
    let start = chrono::NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let end = chrono::NaiveDate::from_ymd_opt(next_year, next_month, 1).unwrap();
    (start, end)
}

/// Ensure partitions exist for the current and next N months. Creation is
/// a plain `CREATE TABLE IF NOT EXISTS ... PARTITION OF`, metadata-only and
/// idempotent.
async fn ensure_partitions(store: &Store, lookahead_months: i64) -> anyhow::Result<i64> {
    let now = chrono::Utc::now();
    let mut created = 0i64;
    for i in 0..=lookahead_months {
        let target = shift_months(now.date_naive(), i as i32);
        let (start, end) = month_bounds(target.year(), target.month());
        let name = partition_name(target.year(), target.month());
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {name} PARTITION OF events FOR VALUES FROM ('{start}') TO ('{end}')"
        );
        let res = sqlx::query(&sql).execute(&store.pool).await;
        match res {
            Ok(outcome) if outcome.rows_affected() == 0 => {
                // CREATE TABLE doesn't report affected rows meaningfully;
                // treat a successful statement as a (possibly no-op) creation.
                created += 1;
            }
            Ok(_) => created += 1,
            Err(e) => tracing::error!("failed to ensure partition {name}: {e}"),
        }
    }
    Ok(created)
}

fn shift_months(date: chrono::NaiveDate, months: i32) -> chrono::NaiveDate {
    let total = date.year() * 12 + (date.month() as i32 - 1) + months;
    let year = total.div_euclid(12);
    let month = (total.rem_euclid(12) + 1) as u32;
    chrono::NaiveDate::from_ymd_opt(year, month, 1).unwrap()
}

/// Drop partitions whose end-date is <= the global retention cutoff.
/// `DROP TABLE` on a partition is metadata-only, avoiding a full row scan.
async fn drop_old_partitions(store: &Store, cutoff: chrono::DateTime<chrono::Utc>) -> anyhow::Result<i64> {
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT c.relname FROM pg_inherits i \
         JOIN pg_class c ON c.oid = i.inhrelid \
         JOIN pg_class p ON p.oid = i.inhparent \
         WHERE p.relname = 'events' AND c.relname LIKE 'events_y%'",
    )
    .fetch_all(&store.pool)
    .await
    .unwrap_or_default();

    let mut dropped = 0i64;
    for name in rows {
        if let Some((year, month)) = parse_partition_name(&name) {
            let (_, end) = month_bounds(year, month);
            let end_utc = end.and_hms_opt(0, 0, 0).unwrap().and_utc();
            if end_utc <= cutoff {
                if let Err(e) = sqlx::query(&format!("DROP TABLE IF EXISTS {name}")).execute(&store.pool).await {
                    tracing::error!("failed to drop partition {name}: {e}");
                } else {
                    dropped += 1;
                }
            }
        }
    }
    Ok(dropped)
}

fn parse_partition_name(name: &str) -> Option<(i32, u32)> {
    let rest = name.strip_prefix("events_y")?;
    let (year_str, month_str) = rest.split_once('m')?;
    Some((year_str.parse().ok()?, month_str.parse().ok()?))
}

async fn delete_events_older_than(store: &Store, system_id: Uuid, cutoff: chrono::DateTime<chrono::Utc>) -> anyhow::Result<(i64, i64)> {
    let mut total_events = 0i64;
    let mut total_scores = 0i64;
    loop {
        let mut tx = store.pool.begin().await?;
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM events WHERE system_id = $1 AND timestamp < $2 LIMIT 500")
            .bind(system_id)
            .bind(cutoff)
            .fetch_all(&mut *tx)
            .await?;
        if ids.is_empty() {
            tx.commit().await?;
            break;
        }
        let scores = sqlx::query("DELETE FROM event_scores WHERE event_id = ANY($1)").bind(&ids).execute(&mut *tx).await?.rows_affected();
        let events = sqlx::query("DELETE FROM events WHERE id = ANY($1)").bind(&ids).execute(&mut *tx).await?.rows_affected();
        tx.commit().await?;
        total_events += events as i64;
        total_scores += scores as i64;
        if ids.len() < 500 {
            break;
        }
    }
    Ok((total_events, total_scores))
}

async fn delete_orphan_windows(store: &Store) -> anyhow::Result<i64> {
    let orphaned: Vec<Uuid> = sqlx::query_scalar(
        "SELECT w.id FROM windows w WHERE NOT EXISTS \
         (SELECT 1 FROM events e WHERE e.system_id = w.system_id AND e.timestamp >= w.from_ts AND e.timestamp < w.to_ts)",
    )
    .fetch_all(&store.pool)
    .await?;

    if orphaned.is_empty() {
        return Ok(0);
    }

    let mut tx = store.pool.begin().await?;
    sqlx::query("DELETE FROM effective_scores WHERE window_id = ANY($1)").bind(&orphaned).execute(&mut *tx).await?;
    sqlx::query("DELETE FROM meta_results WHERE window_id = ANY($1)").bind(&orphaned).execute(&mut *tx).await?;
    let deleted = sqlx::query("DELETE FROM windows WHERE id = ANY($1)").bind(&orphaned).execute(&mut *tx).await?.rows_affected();
    tx.commit().await?;
    Ok(deleted as i64)
}

async fn delete_orphan_templates(store: &Store) -> anyhow::Result<i64> {
    let result = sqlx::query(
        "DELETE FROM message_templates t WHERE NOT EXISTS (SELECT 1 FROM events e WHERE e.template_id = t.id)",
    )
    .execute(&store.pool)
    .await?;
    Ok(result.rows_affected() as i64)
}

async fn last_backup_age(store: &Store) -> anyhow::Result<Option<chrono::Duration>> {
    let last: Option<chrono::DateTime<chrono::Utc>> = sqlx::query_scalar(
        "SELECT MAX(started_at) FROM maintenance_log WHERE result -> 'backup' -> 'success' = 'true'",
    )
    .fetch_one(&store.pool)
    .await
    .unwrap_or(None);
    Ok(last.map(|t| chrono::Utc::now().signed_duration_since(t)))
}
