use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::config_resolver::ConfigResolver;
use crate::db::Store;
use crate::effective_score::EffectiveScoreAggregator;
use crate::finding_engine::FindingEngine;
use crate::meta_analyzer::MetaAnalyzer;
use crate::scoring_loop::ScoringLoop;

/// Drives the Scoring Loop and Meta Analyzer at `pipeline_interval_minutes`,
/// one background task built on the standard `tokio::spawn` +
/// `tokio::time::interval` shape. Per-system work runs through a semaphore
/// sized by `max_parallel_systems` — N independent units of work, bounded
/// concurrency.
pub struct PipelineScheduler {
    pub store: Store,
    pub scoring_loop: Arc<ScoringLoop>,
    pub meta_analyzer: Arc<MetaAnalyzer>,
    pub finding_engine: Arc<FindingEngine>,
    pub effective_score: Arc<EffectiveScoreAggregator>,
}

pub fn spawn_pipeline_scheduler(scheduler: Arc<PipelineScheduler>, config: Arc<ConfigResolver>) {
    tokio::spawn(async move {
        loop {
            let cfg = config.get().await;
            tokio::time::sleep(std::time::Duration::from_secs(cfg.pipeline.interval_minutes * 60)).await;
            let cfg = config.get().await;
            if let Err(e) = scheduler.run_tick(&cfg).await {
                tracing::error!("pipeline tick error: {e:#}");
            }
        }
    });
}

impl PipelineScheduler {
    pub async fn run_tick(&self, config: &AppConfig) -> anyhow::Result<()> {
        let systems: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM monitored_systems WHERE active = true")
            .fetch_all(&self.store.pool)
            .await?;

        let semaphore = Arc::new(tokio::sync::Semaphore::new(config.pipeline.max_parallel_systems.max(1)));
        let mut handles = Vec::new();

        for system_id in systems {
            let semaphore = semaphore.clone();
            let scoring_loop = self.scoring_loop.clone();
            let meta_analyzer = self.meta_analyzer.clone();
            let finding_engine = self.finding_engine.clone();
            let effective_score = self.effective_score.clone();
            let config = config.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await;
                // Scoring precedes meta-analysis for the same system (sequential).
                if let Err(e) = scoring_loop.run_for_system(system_id, &config.scoring).await {
                    tracing::error!("scoring loop failed for system {system_id}: {e:#}");
                    return;
                }
                match meta_analyzer.run_for_system(system_id, &config.meta).await {
                    Ok(Some((window, meta_result))) => {
                        if let Err(e) = effective_score.persist_for_window(window.id, &meta_result, &config.effective_score).await {
                            tracing::error!("effective score aggregation failed for window {}: {e:#}", window.id);
                        }
                        let emitted = meta_result.findings_vec();
                        if let Err(e) = finding_engine.reconcile(system_id, window.id, &emitted, &config.findings).await {
                            tracing::error!("finding engine reconcile failed for window {}: {e:#}", window.id);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::error!("meta analyzer failed for system {system_id}: {e:#}"),
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }
}
