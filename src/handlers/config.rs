use axum::extract::State;
use axum::Json;

use crate::config::{
    EffectiveScoreConfig, LlmConfig, MetaConfig, PipelineConfig, PromptsConfig, ScoringConfig,
};
use crate::error::AppResult;
use crate::privacy_filter::PrivacyFilter;
use crate::AppState;

macro_rules! config_section {
    ($get_name:ident, $put_name:ident, $ty:ty, $key:literal, $field:ident) => {
        pub async fn $get_name(State(state): State<AppState>) -> AppResult<Json<$ty>> {
            Ok(Json(state.config.get().await.$field))
        }

        pub async fn $put_name(State(state): State<AppState>, Json(req): Json<$ty>) -> AppResult<Json<$ty>> {
            state.config.set_section($key, &req).await?;
            Ok(Json(req))
        }
    };
}

config_section!(get_ai_config, put_ai_config, LlmConfig, "llm", llm);
config_section!(get_task_model_config, put_task_model_config, LlmConfig, "llm", llm);
config_section!(get_token_optimization, put_token_optimization, ScoringConfig, "scoring", scoring);
config_section!(get_meta_analysis_config, put_meta_analysis_config, MetaConfig, "meta", meta);
config_section!(get_dashboard_config, put_dashboard_config, EffectiveScoreConfig, "effective_score", effective_score);
config_section!(get_pipeline_config, put_pipeline_config, PipelineConfig, "pipeline", pipeline);
config_section!(get_ai_prompts, put_ai_prompts, PromptsConfig, "prompts", prompts);

pub async fn get_criterion_guidelines(State(state): State<AppState>) -> AppResult<Json<std::collections::HashMap<String, String>>> {
    Ok(Json(state.config.get().await.prompts.criterion_guidelines))
}

pub async fn put_criterion_guidelines(
    State(state): State<AppState>,
    Json(guidelines): Json<std::collections::HashMap<String, String>>,
) -> AppResult<Json<std::collections::HashMap<String, String>>> {
    let mut prompts = state.config.get().await.prompts;
    prompts.criterion_guidelines = guidelines.clone();
    state.config.set_section("prompts", &prompts).await?;
    Ok(Json(guidelines))
}

pub async fn get_privacy_config(State(state): State<AppState>) -> AppResult<Json<crate::config::PrivacyConfig>> {
    Ok(Json(state.config.get().await.privacy))
}

/// Applies the new redaction rules to the live `PrivacyFilterHandle`
/// immediately, rather than waiting for the next TTL-cache reload.
pub async fn put_privacy_config(
    State(state): State<AppState>,
    Json(req): Json<crate::config::PrivacyConfig>,
) -> AppResult<Json<crate::config::PrivacyConfig>> {
    state.config.set_section("privacy", &req).await?;
    state.privacy.swap(PrivacyFilter::new(&req));
    Ok(Json(req))
}
