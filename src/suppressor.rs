use regex::Regex;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::db::Store;
use crate::error::AppResult;
use crate::models::event::Event;
use crate::models::suppressor::NormalBehaviorTemplate;

struct CompiledTemplate {
    msg_re: Regex,
    host_re: Option<Regex>,
    program_re: Option<Regex>,
}

/// In-memory index of compiled regex tuples per system, rebuilt on
/// template add/delete/toggle. Readers take a lock-free copy-on-write
/// snapshot (an `Arc` clone of the per-system `Vec`); writes replace the
/// whole per-system entry under a short-lived write lock.
pub struct Suppressor {
    store: Store,
    index: RwLock<HashMap<Uuid, std::sync::Arc<Vec<CompiledTemplate>>>>,
}

impl Suppressor {
    pub fn new(store: Store) -> Self {
        Self { store, index: RwLock::new(HashMap::new()) }
    }

    /// Rebuild the compiled index for one system from its enabled templates.
    pub async fn rebuild(&self, system_id: Uuid) -> AppResult<()> {
        let rows = sqlx::query_as::<_, NormalBehaviorTemplate>(
            "SELECT id, system_id, pattern_regex, host_pattern, program_pattern, enabled, created_at \
             FROM normal_behavior_templates WHERE system_id = $1 AND enabled = true",
        )
        .bind(system_id)
        .fetch_all(&self.store.pool)
        .await?;

        let compiled: Vec<CompiledTemplate> = rows
            .into_iter()
            .filter_map(|t| {
                let msg_re = Regex::new(&t.pattern_regex).ok()?;
                let host_re = t.host_pattern.as_deref().and_then(|p| Regex::new(p).ok());
                let program_re = t.program_pattern.as_deref().and_then(|p| Regex::new(p).ok());
                Some(CompiledTemplate { msg_re, host_re, program_re })
            })
            .collect();

        self.index.write().unwrap().insert(system_id, std::sync::Arc::new(compiled));
        Ok(())
    }

    async fn snapshot(&self, system_id: Uuid) -> AppResult<std::sync::Arc<Vec<CompiledTemplate>>> {
        if let Some(snap) = self.index.read().unwrap().get(&system_id).cloned() {
            return Ok(snap);
        }
        self.rebuild(system_id).await?;
        Ok(self.index.read().unwrap().get(&system_id).cloned().unwrap_or_default())
    }

    /// An event matches iff the message regex matches AND (host regex unset
    /// or matches) AND (program regex unset or matches).
    pub async fn matches(&self, event: &Event) -> AppResult<bool> {
        let snap = self.snapshot(event.system_id).await?;
        Ok(snap.iter().any(|t| {
            t.msg_re.is_match(&event.message)
                && t.host_re.as_ref().is_none_or(|re| event.host.as_deref().is_some_and(|h| re.is_match(h)))
                && t.program_re.as_ref().is_none_or(|re| event.program.as_deref().is_some_and(|p| re.is_match(p)))
        }))
    }

    /// Retroactive bulk update executed on template creation: zero every
    /// EventScore for matching events of this system within the last
    /// `lookback_days`, in chunks, then invalidate affected template cache
    /// entries (the caller flushes the template cache after this returns).
    pub async fn apply_retroactive(&self, system_id: Uuid, lookback_days: i64) -> AppResult<u64> {
        self.rebuild(system_id).await?;
        let cutoff = chrono::Utc::now() - chrono::Duration::days(lookback_days);
        let mut total = 0u64;
        // Cursor on (timestamp, id), ascending: every page advances past the
        // last row it looked at regardless of how many events in it matched,
        // so a long run of non-matching events can't stall the loop.
        let mut cursor: Option<(chrono::DateTime<chrono::Utc>, Uuid)> = None;

        loop {
            let (cursor_ts, cursor_id) = cursor.unzip();
            let events: Vec<Event> = sqlx::query_as::<_, Event>(
                "SELECT id, system_id, timestamp, message, host, program, severity, service, \
                 facility, source_ip, trace_id, span_id, external_id, template_id, acknowledged_at, raw \
                 FROM events e WHERE e.system_id = $1 AND e.timestamp >= $2 \
                 AND EXISTS (SELECT 1 FROM event_scores es WHERE es.event_id = e.id AND es.score <> 0) \
                 AND ($3::timestamptz IS NULL OR (e.timestamp, e.id) > ($3, $4)) \
                 ORDER BY e.timestamp ASC, e.id ASC \
                 LIMIT 500",
            )
            .bind(system_id)
            .bind(cutoff)
            .bind(cursor_ts)
            .bind(cursor_id)
            .fetch_all(&self.store.pool)
            .await?;

            if events.is_empty() {
                break;
            }

            let page_len = events.len();
            let mut matched_ids = Vec::new();
            for e in &events {
                if self.matches(e).await? {
                    matched_ids.push(e.id);
                }
            }
            cursor = events.last().map(|e| (e.timestamp, e.id));

            if !matched_ids.is_empty() {
                let updated = sqlx::query("UPDATE event_scores SET score = 0 WHERE event_id = ANY($1)")
                    .bind(&matched_ids)
                    .execute(&self.store.pool)
                    .await?
                    .rows_affected();
                total += updated;
            }

            if page_len < 500 {
                break;
            }
        }

        Ok(total)
    }
}
