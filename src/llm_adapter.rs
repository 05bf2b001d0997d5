use std::collections::HashMap;
use uuid::Uuid;

use crate::config::LlmConfig;
use crate::db::Store;
use crate::error::{AppError, AppResult};
use crate::models::criterion::Criterion;
use crate::models::event::Event;
use crate::models::score::ScoreVectorEntry;
use crate::models::window::MetaAnalysisOutcome;
use crate::privacy_filter::PrivacyFilter;

/// Static per-1k-token USD price table, keyed by model name. Unknown models
/// fall back to `DEFAULT_RATE` — the exact price list is an operational
/// detail, not something that changes scoring outcomes.
const DEFAULT_RATE: (f64, f64) = (0.001, 0.002);

fn price_for(model: &str) -> (f64, f64) {
    let table: &[(&str, (f64, f64))] = &[
        ("gpt-5", (0.005, 0.015)),
        ("gpt-5-mini", (0.001, 0.003)),
        ("gpt-4o", (0.0025, 0.01)),
        ("gpt-4o-mini", (0.00015, 0.0006)),
    ];
    table.iter().find(|(name, _)| *name == model).map(|(_, p)| *p).unwrap_or(DEFAULT_RATE)
}

fn estimate_cost(model: &str, token_input: i64, token_output: i64) -> f64 {
    let (in_rate, out_rate) = price_for(model);
    (token_input as f64 / 1000.0) * in_rate + (token_output as f64 / 1000.0) * out_rate
}

/// OpenAI-compatible chat-completions response shape: a bare `reqwest`
/// POST, tolerant `choices[0].message.content` extraction.
#[derive(Debug, serde::Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, serde::Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, serde::Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    output: Option<String>,
}

#[derive(Debug, serde::Deserialize, Default, Clone, Copy)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
}

pub struct LlmAdapter {
    pub client: reqwest::Client,
    pub config: LlmConfig,
    pub api_key: String,
    pub store: Store,
}

impl LlmAdapter {
    async fn call_chat(&self, model: &str, system_prompt: &str, user_msg: &str) -> AppResult<(String, ChatUsage)> {
        let body = serde_json::json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_msg },
            ],
            "response_format": { "type": "json_object" },
            "max_completion_tokens": 16384,
        });

        let mut attempt = 0u32;
        loop {
            let result = self
                .client
                .post(format!("{}/v1/chat/completions", self.config.base_url))
                .bearer_auth(&self.api_key)
                .timeout(std::time::Duration::from_secs(self.config.timeout_secs))
                .json(&body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: ChatCompletionResponse = resp.json().await.map_err(|e| AppError::Upstream(e.to_string()))?;
                    let content = parsed
                        .choices
                        .first()
                        .and_then(|c| c.message.content.clone().or_else(|| c.message.output.clone()))
                        .ok_or_else(|| AppError::Upstream("empty LLM response".to_string()))?;
                    return Ok((content, parsed.usage.unwrap_or_default()));
                }
                Ok(resp) if resp.status().is_server_error() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let backoff = self.config.retry_base_ms * 2u64.pow(attempt - 1);
                    tracing::warn!("llm call failed with {}, retrying in {backoff}ms", resp.status());
                    tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    return Err(AppError::Upstream(format!("llm call failed: {status} {text}")));
                }
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    let backoff = self.config.retry_base_ms * 2u64.pow(attempt - 1);
                    tracing::warn!("llm transport error: {e}, retrying in {backoff}ms");
                    tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(AppError::Upstream(e.to_string())),
            }
        }
    }

    async fn persist_usage(&self, system_id: Option<Uuid>, run_type: &str, model: &str, usage: ChatUsage, request_count: i64, event_count: i64) -> AppResult<()> {
        let cost = estimate_cost(model, usage.prompt_tokens, usage.completion_tokens);
        sqlx::query(
            "INSERT INTO llm_usage (id, system_id, run_type, model, token_input, token_output, \
             request_count, event_count, cost_estimate) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(Uuid::new_v4())
        .bind(system_id)
        .bind(run_type)
        .bind(model)
        .bind(usage.prompt_tokens)
        .bind(usage.completion_tokens)
        .bind(request_count)
        .bind(event_count)
        .bind(cost)
        .execute(&self.store.pool)
        .await?;
        Ok(())
    }

    /// Returns one score vector per input event, order-preserved.
    pub async fn score_batch(&self, system_id: Uuid, privacy: &PrivacyFilter, batch: &[Event]) -> AppResult<Vec<ScoreVectorEntry>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let redacted: Vec<_> = batch.iter().map(|e| privacy.redact_event(e)).collect();
        let criteria_desc: Vec<String> = Criterion::ALL.iter().map(|c| format!("{}: {}", c.slug(), c.name())).collect();

        let system_prompt = format!(
            "You are a log-risk scoring engine. Score each event against these criteria: {}. \
             Respond as JSON: {{\"scores\": [{{\"criterion_scores\": {{slug: float 0..1}}, \
             \"severity_label\": string, \"reason_codes\": [string]}}, ...]}} with one entry per \
             input event, in the same order.",
            criteria_desc.join(", "),
        );
        let user_msg = serde_json::to_string(&redacted).unwrap_or_default();

        let (content, usage) = self.call_chat(&self.config.scoring_model, &system_prompt, &user_msg).await?;
        self.persist_usage(Some(system_id), "scoring", &self.config.scoring_model, usage, 1, batch.len() as i64).await?;

        #[derive(serde::Deserialize)]
        struct Wrapper {
            scores: Vec<ScoreVectorEntry>,
        }
        let parsed: Wrapper = serde_json::from_str(&content)
            .map_err(|e| AppError::Upstream(format!("could not parse scoreBatch response: {e}")))?;

        if parsed.scores.len() != batch.len() {
            return Err(AppError::Upstream("scoreBatch response length mismatch".to_string()));
        }
        Ok(parsed.scores)
    }

    /// `metaAnalyze(systemId, windowEvents, priorSummaries, maxContext)`.
    pub async fn meta_analyze(
        &self,
        system_id: Uuid,
        privacy: &PrivacyFilter,
        window_events: &[Event],
        prior_summaries: &[String],
    ) -> AppResult<MetaAnalysisOutcome> {
        let redacted: Vec<_> = window_events.iter().map(|e| privacy.redact_event(e)).collect();
        let criteria_slugs: Vec<&str> = Criterion::ALL.iter().map(|c| c.slug()).collect();

        let system_prompt = format!(
            "You are a log meta-analysis engine. Given a window of events and prior window \
             summaries, produce a JSON object: {{\"summary\": string, \"meta_scores\": \
             {{criterion: float 0..1}} for criteria [{}], \"findings\": [{{\"text\": string, \
             \"severity\": one of critical/high/medium/low/info, \"criterion_slug\": string|null, \
             \"key_event_ids\": [uuid]}}], \"recommended_action\": string|null}}.",
            criteria_slugs.join(", "),
        );
        let user_msg = serde_json::json!({
            "events": redacted,
            "prior_summaries": prior_summaries,
        })
        .to_string();

        let (content, usage) = self.call_chat(&self.config.meta_model, &system_prompt, &user_msg).await?;
        self.persist_usage(Some(system_id), "meta", &self.config.meta_model, usage, 1, window_events.len() as i64).await?;

        serde_json::from_str(&content).map_err(|e| AppError::Upstream(format!("could not parse metaAnalyze response: {e}")))
    }
}

pub fn empty_criterion_map() -> HashMap<String, f64> {
    Criterion::ALL.iter().map(|c| (c.slug().to_string(), 0.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_uses_its_own_rate() {
        let cost = estimate_cost("gpt-4o-mini", 1000, 1000);
        assert!((cost - (0.00015 + 0.0006)).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_falls_back_to_default_rate() {
        let cost = estimate_cost("some-future-model", 1000, 1000);
        assert!((cost - (DEFAULT_RATE.0 + DEFAULT_RATE.1)).abs() < 1e-9);
    }

    #[test]
    fn zero_tokens_cost_nothing() {
        assert_eq!(estimate_cost("gpt-5", 0, 0), 0.0);
    }

    #[test]
    fn empty_criterion_map_covers_every_criterion() {
        let map = empty_criterion_map();
        assert_eq!(map.len(), Criterion::ALL.len());
        assert!(map.values().all(|v| *v == 0.0));
    }
}
