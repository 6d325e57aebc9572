use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::state::{AppState, ModelStatus};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub message: String,
    pub template: String,
    pub counter: String,
}

/// 200 once the model is ready, 503 in every other state.
pub async fn handler(state: web::Data<AppState>) -> HttpResponse {
    let status = state.model.status().await;
    let message = match status {
        ModelStatus::Ready => "Model is loaded and ready".to_string(),
        ModelStatus::Loading => "Model is still loading".to_string(),
        ModelStatus::Failed => format!(
            "Model failed to load: {}",
            state.model.failure().await.unwrap_or_default()
        ),
        ModelStatus::ShutDown => "Model has been shut down".to_string(),
    };

    let body = HealthResponse {
        status: status.to_string(),
        model: state.model.model_name().to_string(),
        message,
        template: state.budgeter.template().version().to_string(),
        counter: state.budgeter.counter_name().to_string(),
    };

    match status {
        ModelStatus::Ready => HttpResponse::Ok().json(body),
        _ => HttpResponse::ServiceUnavailable().json(body),
    }
}
