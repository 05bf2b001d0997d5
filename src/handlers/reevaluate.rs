use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::jobs::JobSnapshot;
use crate::AppState;

/// `POST /systems/{id}/re-evaluate` runs the same per-system sequence as one
/// `PipelineScheduler` tick (scoring, then meta-analysis, then effective
/// score and finding reconciliation) but outside the scheduled interval, as
/// a background job so the request returns immediately.
pub async fn start_reevaluate(State(state): State<AppState>, Path(system_id): Path<Uuid>) -> AppResult<Json<serde_json::Value>> {
    let job_id = state.jobs.start();
    let jobs = state.jobs.clone();
    let scoring_loop = state.scoring_loop.clone();
    let meta_analyzer = state.meta_analyzer.clone();
    let finding_engine = state.finding_engine.clone();
    let effective_score = state.effective_score.clone();
    let config = state.config.get().await;

    tokio::spawn(async move {
        let outcome: anyhow::Result<String> = async {
            let scored = scoring_loop.run_for_system(system_id, &config.scoring).await?;
            match meta_analyzer.run_for_system(system_id, &config.meta).await? {
                Some((window, meta_result)) => {
                    effective_score.persist_for_window(window.id, &meta_result, &config.effective_score).await?;
                    let emitted = meta_result.findings_vec();
                    finding_engine.reconcile(system_id, window.id, &emitted, &config.findings).await?;
                    Ok(format!("scored {scored} events, produced window {}", window.id))
                }
                None => Ok(format!("scored {scored} events, no new window")),
            }
        }
        .await;

        match outcome {
            Ok(message) => jobs.complete(job_id, message),
            Err(e) => jobs.fail(job_id, e.to_string()),
        }
    });

    Ok(Json(serde_json::json!({ "jobId": job_id })))
}

pub async fn get_reevaluate_job(
    State(state): State<AppState>,
    Path((_system_id, job_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<JobSnapshot>> {
    state
        .jobs
        .get(job_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))
}
