use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::config::AppConfig;
use crate::db::Store;
use crate::error::AppResult;

const TTL: Duration = Duration::from_secs(60);

/// Runtime-mutable config sections (AI config, privacy filter, prompts,
/// pipeline tuning) live in the `app_config` key/value table and are laid
/// over the file-loaded `AppConfig` defaults. Reads are TTL-cached so every
/// pipeline tick and every HTTP request doesn't round-trip to Postgres;
/// `invalidate()` lets a config-mutation handler force the next read to see
/// its write immediately rather than waiting out the TTL.
pub struct ConfigResolver {
    store: Store,
    base: AppConfig,
    cache: RwLock<Option<(AppConfig, Instant)>>,
}

impl ConfigResolver {
    pub fn new(store: Store, base: AppConfig) -> Self {
        Self { store, base, cache: RwLock::new(None) }
    }

    pub async fn get(&self) -> AppConfig {
        if let Some((cfg, at)) = &*self.cache.read().await {
            if at.elapsed() < TTL {
                return cfg.clone();
            }
        }
        self.reload().await
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn reload(&self) -> AppConfig {
        let mut cfg = self.base.clone();
        cfg.pipeline = self.load_section("pipeline", cfg.pipeline).await;
        cfg.scoring = self.load_section("scoring", cfg.scoring).await;
        cfg.meta = self.load_section("meta", cfg.meta).await;
        cfg.findings = self.load_section("findings", cfg.findings).await;
        cfg.effective_score = self.load_section("effective_score", cfg.effective_score).await;
        cfg.retention = self.load_section("retention", cfg.retention).await;
        cfg.maintenance = self.load_section("maintenance", cfg.maintenance).await;
        cfg.backup = self.load_section("backup", cfg.backup).await;
        cfg.llm = self.load_section("llm", cfg.llm).await;
        cfg.privacy = self.load_section("privacy", cfg.privacy).await;
        cfg.prompts = self.load_section("prompts", cfg.prompts).await;

        *self.cache.write().await = Some((cfg.clone(), Instant::now()));
        cfg
    }

    async fn load_section<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        let row: Option<serde_json::Value> = sqlx::query_scalar("SELECT value FROM app_config WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.store.pool)
            .await
            .unwrap_or(None);
        match row {
            Some(value) => serde_json::from_value(value).unwrap_or(fallback),
            None => fallback,
        }
    }

    /// Persist a section override and invalidate the cache so the next
    /// `get()` observes it.
    pub async fn set_section<T: Serialize>(&self, key: &str, value: &T) -> AppResult<()> {
        let json = serde_json::to_value(value).map_err(|e| anyhow::anyhow!(e))?;
        sqlx::query(
            "INSERT INTO app_config (key, value, updated_at) VALUES ($1, $2, now()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
        )
        .bind(key)
        .bind(&json)
        .execute(&self.store.pool)
        .await?;
        self.invalidate().await;
        Ok(())
    }

    pub async fn get_section_raw(&self, key: &str) -> AppResult<Option<serde_json::Value>> {
        let row: Option<serde_json::Value> = sqlx::query_scalar("SELECT value FROM app_config WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.store.pool)
            .await?;
        Ok(row)
    }
}
