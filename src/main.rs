use axum::routing::{delete, get, post, put};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use log_sentinel::config::AppConfig;
use log_sentinel::config_resolver::ConfigResolver;
use log_sentinel::db::Store;
use log_sentinel::effective_score::EffectiveScoreAggregator;
use log_sentinel::event_store::EventStoreFactory;
use log_sentinel::finding_engine::FindingEngine;
use log_sentinel::handlers;
use log_sentinel::jobs::JobRegistry;
use log_sentinel::llm_adapter::LlmAdapter;
use log_sentinel::maintenance::{spawn_maintenance_scheduler, MaintenanceScheduler};
use log_sentinel::meta_analyzer::MetaAnalyzer;
use log_sentinel::pipeline::{spawn_pipeline_scheduler, PipelineScheduler};
use log_sentinel::privacy_filter::{PrivacyFilter, PrivacyFilterHandle};
use log_sentinel::scoring_loop::ScoringLoop;
use log_sentinel::suppressor::Suppressor;
use log_sentinel::template_cache::TemplateCache;
use log_sentinel::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("log_sentinel=debug,tower_http=debug")))
        .init();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/log_sentinel".to_string());
    let config_path = std::env::var("SENTINEL_CONFIG").unwrap_or_else(|_| "./sentinel.toml".to_string());
    let llm_api_key = std::env::var("LLM_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY")).unwrap_or_default();

    let base_config = AppConfig::load(&config_path)?;
    let store = Store::connect(&database_url).await?;
    store.run_migrations().await?;
    tracing::info!("connected to postgres and ran migrations");

    let config = Arc::new(ConfigResolver::new(store.clone(), base_config.clone()));
    let http_client = reqwest::Client::new();

    let template_cache = Arc::new(TemplateCache { store: store.clone() });
    let suppressor = Arc::new(Suppressor::new(store.clone()));
    let llm = Arc::new(LlmAdapter {
        client: http_client.clone(),
        config: base_config.llm.clone(),
        api_key: llm_api_key,
        store: store.clone(),
    });
    let privacy = Arc::new(PrivacyFilterHandle::new(PrivacyFilter::new(&base_config.privacy)));
    let event_stores = Arc::new(EventStoreFactory { store: store.clone(), http_client: http_client.clone() });
    let finding_engine = Arc::new(FindingEngine { store: store.clone() });
    let effective_score = Arc::new(EffectiveScoreAggregator { store: store.clone() });
    let jobs = Arc::new(JobRegistry::new());

    let scoring_loop = Arc::new(ScoringLoop {
        store: store.clone(),
        template_cache: template_cache.clone(),
        suppressor: suppressor.clone(),
        llm: llm.clone(),
        privacy: privacy.clone(),
    });
    let meta_analyzer = Arc::new(MetaAnalyzer {
        store: store.clone(),
        suppressor: suppressor.clone(),
        llm: llm.clone(),
        privacy: privacy.clone(),
    });

    let pipeline_scheduler = Arc::new(PipelineScheduler {
        store: store.clone(),
        scoring_loop: scoring_loop.clone(),
        meta_analyzer: meta_analyzer.clone(),
        finding_engine: finding_engine.clone(),
        effective_score: effective_score.clone(),
    });
    spawn_pipeline_scheduler(pipeline_scheduler, config.clone());

    let maintenance = Arc::new(MaintenanceScheduler::new(store.clone()));
    spawn_maintenance_scheduler(maintenance.clone(), config.clone());

    let state = AppState {
        store,
        config,
        template_cache,
        suppressor,
        llm,
        privacy,
        event_stores,
        scoring_loop,
        meta_analyzer,
        finding_engine,
        effective_score,
        jobs,
        maintenance,
    };

    let app = Router::new()
        .route("/api/v1/systems", get(handlers::systems::list_systems).post(handlers::systems::create_system))
        .route(
            "/api/v1/systems/{id}",
            get(handlers::systems::get_system).put(handlers::systems::update_system).delete(handlers::systems::delete_system),
        )
        .route("/api/v1/systems/{id}/events", post(handlers::events::ingest_events))
        .route("/api/v1/systems/{id}/events/search", get(handlers::events::search_events))
        .route("/api/v1/systems/{id}/event-scores/grouped", get(handlers::events::list_grouped_event_scores))
        .route(
            "/api/v1/systems/{id}/event-scores/grouped/{group_key}/events",
            get(handlers::events::list_grouped_group_events),
        )
        .route("/api/v1/events/bulk-delete", post(handlers::events::bulk_delete_events))
        .route("/api/v1/events/acknowledge", post(handlers::events::acknowledge_events))
        .route("/api/v1/scores/systems", get(handlers::scores::list_system_scores))
        .route("/api/v1/windows/{id}/meta", get(handlers::windows::get_window_meta))
        .route("/api/v1/systems/{id}/findings", get(handlers::findings::list_findings))
        .route("/api/v1/findings/{id}/acknowledge", post(handlers::findings::acknowledge_finding))
        .route("/api/v1/findings/{id}/reopen", post(handlers::findings::reopen_finding))
        .route(
            "/api/v1/systems/{id}/normal-behavior-templates",
            get(handlers::templates::list_templates).post(handlers::templates::create_template),
        )
        .route(
            "/api/v1/systems/{id}/normal-behavior-templates/{template_id}/enabled",
            put(handlers::templates::toggle_template),
        )
        .route(
            "/api/v1/systems/{id}/normal-behavior-templates/{template_id}",
            delete(handlers::templates::delete_template),
        )
        .route("/api/v1/systems/{id}/re-evaluate", post(handlers::reevaluate::start_reevaluate))
        .route("/api/v1/systems/{id}/re-evaluate/{job_id}", get(handlers::reevaluate::get_reevaluate_job))
        .route("/api/v1/maintenance/run", post(handlers::maintenance::run_maintenance_now))
        .route(
            "/api/v1/maintenance/backup/config",
            get(handlers::maintenance::get_backup_config).put(handlers::maintenance::put_backup_config),
        )
        .route("/api/v1/maintenance/backup/trigger", post(handlers::maintenance::trigger_backup))
        .route("/api/v1/maintenance/backup/list", get(handlers::maintenance::list_backups))
        .route("/api/v1/maintenance/backup/download/{file}", get(handlers::maintenance::download_backup))
        .route("/api/v1/maintenance/backup/{file}", delete(handlers::maintenance::delete_backup))
        .route("/api/v1/ai-config", get(handlers::config::get_ai_config).put(handlers::config::put_ai_config))
        .route("/api/v1/ai-prompts", get(handlers::config::get_ai_prompts).put(handlers::config::put_ai_prompts))
        .route(
            "/api/v1/ai-prompts/criterion-guidelines",
            get(handlers::config::get_criterion_guidelines).put(handlers::config::put_criterion_guidelines),
        )
        .route(
            "/api/v1/token-optimization",
            get(handlers::config::get_token_optimization).put(handlers::config::put_token_optimization),
        )
        .route(
            "/api/v1/meta-analysis-config",
            get(handlers::config::get_meta_analysis_config).put(handlers::config::put_meta_analysis_config),
        )
        .route(
            "/api/v1/dashboard-config",
            get(handlers::config::get_dashboard_config).put(handlers::config::put_dashboard_config),
        )
        .route("/api/v1/pipeline-config", get(handlers::config::get_pipeline_config).put(handlers::config::put_pipeline_config))
        .route(
            "/api/v1/task-model-config",
            get(handlers::config::get_task_model_config).put(handlers::config::put_task_model_config),
        )
        .route("/api/v1/privacy-config", get(handlers::config::get_privacy_config).put(handlers::config::put_privacy_config))
        .route("/healthz", get(handlers::health::healthz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!("log-sentinel listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
