pub mod migrations;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Thin wrapper around the shared connection pool. sqlx's pool is already
/// safe to share and clone cheaply, so `Store` just holds it.
#[derive(Clone)]
pub struct Store {
    pub pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        migrations::run(&self.pool).await
    }

    /// One row per destructive/state-mutating admin action. Called from the
    /// handler layer on the success path only — a failed mutation has
    /// nothing to audit.
    pub async fn write_audit(&self, actor: &str, action: &str, target: Option<&str>, detail: serde_json::Value) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO audit_log (id, actor, action, target, detail) VALUES ($1,$2,$3,$4,$5)")
            .bind(uuid::Uuid::new_v4())
            .bind(actor)
            .bind(action)
            .bind(target)
            .bind(detail)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
