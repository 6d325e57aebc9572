use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use soprano_llm::LLMError;
use thiserror::Error;

use crate::state::ModelStatus;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Model is not ready (status: {0})")]
    ModelNotReady(ModelStatus),

    #[error("Server is busy, too many generations in flight")]
    Busy,

    #[error("Generation failed: {0}")]
    Generation(#[from] LLMError),
}

impl AppError {
    fn error_type(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "invalid_request_error",
            AppError::ModelNotReady(_) => "model_not_ready",
            AppError::Busy => "server_busy",
            AppError::Generation(LLMError::NotReady(_)) => "model_not_ready",
            AppError::Generation(_) => "generation_error",
        }
    }
}

#[derive(Serialize)]
struct JsonError {
    message: String,
    r#type: String,
}

#[derive(Serialize)]
struct JsonErrorWrapper {
    error: JsonError,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ModelNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Busy => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Generation(LLMError::NotReady(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Generation(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error_response = JsonErrorWrapper {
            error: JsonError {
                message: self.to_string(),
                r#type: self.error_type().to_string(),
            },
        };
        HttpResponse::build(self.status_code()).json(error_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_failure_kind() {
        assert_eq!(
            AppError::InvalidRequest("empty".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::ModelNotReady(ModelStatus::Loading).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(AppError::Busy.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            AppError::Generation(LLMError::Api("boom".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::Generation(LLMError::NotReady("Loading model".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn not_ready_message_names_the_status() {
        let err = AppError::ModelNotReady(ModelStatus::ShutDown);
        assert_eq!(err.to_string(), "Model is not ready (status: shut_down)");
    }
}
