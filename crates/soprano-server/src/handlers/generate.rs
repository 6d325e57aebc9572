use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use soprano_core::{PromptResult, Turn};
use soprano_llm::{GenerationParams, TextGenerator};
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;

use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Prior turns, oldest first
    #[serde(default)]
    pub history: Vec<Turn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    pub prompt_tokens: u32,
    pub history_turns: usize,
    pub approximate: bool,
}

/// Everything a handler needs to run one generation.
///
/// Holding `permit` keeps one generation slot busy until this is dropped.
pub(crate) struct PreparedGeneration {
    pub request_id: String,
    pub generator: Arc<dyn TextGenerator>,
    pub prompt: PromptResult,
    pub params: GenerationParams,
    pub permit: OwnedSemaphorePermit,
}

/// Validate the request, claim a generation slot and assemble the prompt.
pub(crate) async fn prepare(state: &AppState, request: GenerateRequest) -> Result<PreparedGeneration> {
    let request_id = uuid::Uuid::new_v4().to_string();

    if request.prompt.trim().is_empty() {
        log::warn!("[{}] Rejected request with empty prompt", request_id);
        return Err(AppError::InvalidRequest("prompt must not be empty".to_string()));
    }

    let generator = match state.model.generator().await {
        Some(generator) => generator,
        None => {
            let status = state.model.status().await;
            log::warn!("[{}] Model not ready ({})", request_id, status);
            return Err(AppError::ModelNotReady(status));
        }
    };

    let permit = state
        .generation_slots
        .clone()
        .try_acquire_owned()
        .map_err(|_| {
            log::warn!("[{}] All generation slots busy", request_id);
            AppError::Busy
        })?;

    let prompt = state
        .budgeter
        .build_prompt(&state.config.persona, &request.history, &request.prompt);

    log::info!(
        "[{}] Prompt: {} tokens, {} history turns kept, {} dropped",
        request_id,
        prompt.token_count,
        prompt.turns_admitted,
        prompt.turns_dropped
    );
    for warning in &prompt.warnings {
        log::debug!("[{}] Budget warning: {}", request_id, warning);
    }

    Ok(PreparedGeneration {
        request_id,
        generator,
        prompt,
        params: state.generation_params(),
        permit,
    })
}

pub async fn handler(
    state: web::Data<AppState>,
    request: web::Json<GenerateRequest>,
) -> Result<HttpResponse> {
    let prepared = prepare(&state, request.into_inner()).await?;

    let text = prepared
        .generator
        .complete(&prepared.prompt.text, &prepared.params)
        .await
        .map_err(|e| {
            log::error!("[{}] Generation failed: {}", prepared.request_id, e);
            AppError::Generation(e)
        })?;
    drop(prepared.permit);

    let response = text.trim().to_string();
    log::info!(
        "[{}] Generated {} chars",
        prepared.request_id,
        response.len()
    );

    Ok(HttpResponse::Ok().json(GenerateResponse {
        response,
        prompt_tokens: prepared.prompt.token_count,
        history_turns: prepared.prompt.turns_admitted,
        approximate: prepared.prompt.approximate,
    }))
}
