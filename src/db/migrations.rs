use sqlx::PgPool;

/// Idempotent schema setup: one ordered list of `CREATE ... IF NOT EXISTS`
/// statements run every startup, targeting Postgres DDL so the storage
/// layout gets native partitioning, VACUUM, and REINDEX CONCURRENTLY
/// support.
const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS monitored_systems (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        event_source TEXT NOT NULL DEFAULT 'primary',
        retention_days BIGINT,
        external_endpoint TEXT,
        active BOOLEAN NOT NULL DEFAULT true,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    // Events is range-partitioned by timestamp, monthly. The parent table
    // carries no rows directly; `maintenance.rs` creates/drops the monthly
    // child partitions (`events_yYYYYmMM`).
    r#"CREATE TABLE IF NOT EXISTS events (
        id UUID NOT NULL,
        system_id UUID NOT NULL REFERENCES monitored_systems(id),
        timestamp TIMESTAMPTZ NOT NULL,
        message TEXT NOT NULL,
        host TEXT,
        program TEXT,
        severity TEXT,
        service TEXT,
        facility TEXT,
        source_ip TEXT,
        trace_id TEXT,
        span_id TEXT,
        external_id TEXT,
        template_id UUID,
        acknowledged_at TIMESTAMPTZ,
        raw JSONB NOT NULL DEFAULT '{}',
        PRIMARY KEY (id, timestamp)
    ) PARTITION BY RANGE (timestamp)"#,
    r#"CREATE TABLE IF NOT EXISTS events_default PARTITION OF events DEFAULT"#,
    // Postgres requires every unique index on a partitioned table to carry
    // the partition key, so `timestamp` rides along even though the logical
    // dedup key is just (system_id, external_id); ingest binds the event's
    // own timestamp into the ON CONFLICT target to match.
    r#"CREATE UNIQUE INDEX IF NOT EXISTS events_system_external_uidx
        ON events (system_id, external_id, timestamp) WHERE external_id IS NOT NULL"#,
    r#"CREATE INDEX IF NOT EXISTS events_system_ts_idx ON events (system_id, timestamp DESC)"#,
    r#"CREATE INDEX IF NOT EXISTS events_template_idx ON events (template_id)"#,
    r#"CREATE TABLE IF NOT EXISTS message_templates (
        id UUID PRIMARY KEY,
        system_id UUID NOT NULL REFERENCES monitored_systems(id),
        fingerprint TEXT NOT NULL,
        pattern TEXT NOT NULL,
        cached_scores JSONB,
        last_scored_at TIMESTAMPTZ,
        avg_max_score DOUBLE PRECISION,
        scoring_count BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (system_id, fingerprint)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS event_scores (
        id UUID PRIMARY KEY,
        event_id UUID NOT NULL,
        system_id UUID NOT NULL,
        criterion_slug TEXT NOT NULL,
        score DOUBLE PRECISION NOT NULL,
        score_type TEXT NOT NULL,
        severity_label TEXT NOT NULL,
        reason_codes JSONB NOT NULL DEFAULT '[]',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (event_id, criterion_slug)
    )"#,
    r#"CREATE INDEX IF NOT EXISTS event_scores_event_idx ON event_scores (event_id)"#,
    r#"CREATE INDEX IF NOT EXISTS event_scores_system_idx ON event_scores (system_id)"#,
    r#"CREATE TABLE IF NOT EXISTS windows (
        id UUID PRIMARY KEY,
        system_id UUID NOT NULL REFERENCES monitored_systems(id),
        from_ts TIMESTAMPTZ NOT NULL,
        to_ts TIMESTAMPTZ NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE INDEX IF NOT EXISTS windows_system_idx ON windows (system_id, to_ts DESC)"#,
    r#"CREATE TABLE IF NOT EXISTS meta_results (
        id UUID PRIMARY KEY,
        window_id UUID NOT NULL UNIQUE REFERENCES windows(id),
        system_id UUID NOT NULL REFERENCES monitored_systems(id),
        summary TEXT NOT NULL,
        meta_scores JSONB NOT NULL DEFAULT '{}',
        findings JSONB NOT NULL DEFAULT '[]',
        recommended_action TEXT,
        key_event_ids JSONB NOT NULL DEFAULT '[]',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS effective_scores (
        id UUID PRIMARY KEY,
        system_id UUID NOT NULL REFERENCES monitored_systems(id),
        window_id UUID NOT NULL REFERENCES windows(id),
        criterion_slug TEXT NOT NULL,
        effective_value DOUBLE PRECISION NOT NULL,
        meta_score DOUBLE PRECISION NOT NULL,
        max_event_score DOUBLE PRECISION NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (window_id, criterion_slug)
    )"#,
    r#"CREATE INDEX IF NOT EXISTS effective_scores_system_idx ON effective_scores (system_id, created_at DESC)"#,
    r#"CREATE TABLE IF NOT EXISTS findings (
        id UUID PRIMARY KEY,
        system_id UUID NOT NULL REFERENCES monitored_systems(id),
        fingerprint TEXT NOT NULL,
        text TEXT NOT NULL,
        criterion_slug TEXT,
        severity TEXT NOT NULL,
        original_severity TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'open',
        occurrence_count BIGINT NOT NULL DEFAULT 1,
        consecutive_misses BIGINT NOT NULL DEFAULT 0,
        first_seen_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_seen_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        acknowledged_at TIMESTAMPTZ,
        resolved_at TIMESTAMPTZ,
        resolution_evidence JSONB,
        key_event_ids JSONB NOT NULL DEFAULT '[]'
    )"#,
    r#"CREATE INDEX IF NOT EXISTS findings_system_status_idx ON findings (system_id, status)"#,
    // Partial unique index backing "exactly one open Finding per
    // (system_id, fingerprint)": resolved findings are excluded so a new
    // recurring finding can be created after resolution.
    r#"CREATE UNIQUE INDEX IF NOT EXISTS findings_open_fingerprint_uidx
        ON findings (system_id, fingerprint) WHERE status IN ('open', 'acknowledged')"#,
    r#"CREATE TABLE IF NOT EXISTS normal_behavior_templates (
        id UUID PRIMARY KEY,
        system_id UUID NOT NULL REFERENCES monitored_systems(id),
        pattern_regex TEXT NOT NULL,
        host_pattern TEXT,
        program_pattern TEXT,
        enabled BOOLEAN NOT NULL DEFAULT true,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE INDEX IF NOT EXISTS nbt_system_idx ON normal_behavior_templates (system_id)"#,
    r#"CREATE TABLE IF NOT EXISTS llm_usage (
        id UUID PRIMARY KEY,
        system_id UUID,
        run_type TEXT NOT NULL,
        model TEXT NOT NULL,
        token_input BIGINT NOT NULL DEFAULT 0,
        token_output BIGINT NOT NULL DEFAULT 0,
        request_count BIGINT NOT NULL DEFAULT 0,
        event_count BIGINT NOT NULL DEFAULT 0,
        cost_estimate DOUBLE PRECISION NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS app_config (
        key TEXT PRIMARY KEY,
        value JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS maintenance_log (
        id UUID PRIMARY KEY,
        started_at TIMESTAMPTZ NOT NULL,
        finished_at TIMESTAMPTZ,
        result JSONB NOT NULL DEFAULT '{}'
    )"#,
    // Out-of-scope RAG generation feature has no reader of this table in
    // this crate; it exists as a passive sink per the persistent-state
    // layout, not as a pipeline dependency.
    r#"CREATE TABLE IF NOT EXISTS rag_history (
        id UUID PRIMARY KEY,
        system_id UUID,
        question TEXT NOT NULL,
        answer TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS audit_log (
        id UUID PRIMARY KEY,
        actor TEXT NOT NULL,
        action TEXT NOT NULL,
        target TEXT,
        detail JSONB NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
];

pub async fn run(pool: &PgPool) -> anyhow::Result<()> {
    for stmt in STATEMENTS {
        sqlx::query(stmt).execute(pool).await?;
    }
    tracing::info!("migrations applied ({} statements)", STATEMENTS.len());
    Ok(())
}
