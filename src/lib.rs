pub mod backup;
pub mod config;
pub mod config_resolver;
pub mod db;
pub mod effective_score;
pub mod error;
pub mod event_store;
pub mod finding_engine;
pub mod handlers;
pub mod jobs;
pub mod llm_adapter;
pub mod maintenance;
pub mod meta_analyzer;
pub mod models;
pub mod pipeline;
pub mod privacy_filter;
pub mod scoring_loop;
pub mod suppressor;
pub mod template_cache;

use std::sync::Arc;

use config_resolver::ConfigResolver;
use db::Store;
use effective_score::EffectiveScoreAggregator;
use event_store::EventStoreFactory;
use finding_engine::FindingEngine;
use jobs::JobRegistry;
use llm_adapter::LlmAdapter;
use maintenance::MaintenanceScheduler;
use meta_analyzer::MetaAnalyzer;
use privacy_filter::PrivacyFilterHandle;
use scoring_loop::ScoringLoop;
use suppressor::Suppressor;
use template_cache::TemplateCache;

/// Everything a handler needs, cloned cheaply per-request via the `Arc`s
/// and pool handles inside.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<ConfigResolver>,
    pub template_cache: Arc<TemplateCache>,
    pub suppressor: Arc<Suppressor>,
    pub llm: Arc<LlmAdapter>,
    pub privacy: Arc<PrivacyFilterHandle>,
    pub event_stores: Arc<EventStoreFactory>,
    pub scoring_loop: Arc<ScoringLoop>,
    pub meta_analyzer: Arc<MetaAnalyzer>,
    pub finding_engine: Arc<FindingEngine>,
    pub effective_score: Arc<EffectiveScoreAggregator>,
    pub jobs: Arc<JobRegistry>,
    pub maintenance: Arc<MaintenanceScheduler>,
}
