use actix_web::{http::StatusCode, test, web, App};
use async_trait::async_trait;
use futures::stream;
use serde_json::{json, Value};
use soprano_core::CountingStrategy;
use soprano_llm::{GenerationParams, LLMError, Result as LlmResult, TextChunk, TextGenerator, TextStream};
use soprano_server::{app_config, AppState, ServerConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays fixed tokens and records the last prompt it saw.
struct ScriptedGenerator {
    tokens: Vec<&'static str>,
    fail_mid_stream: bool,
    last_prompt: Mutex<Option<String>>,
}

impl ScriptedGenerator {
    fn new(tokens: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            tokens,
            fail_mid_stream: false,
            last_prompt: Mutex::new(None),
        })
    }

    fn failing_after(tokens: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            tokens,
            fail_mid_stream: true,
            last_prompt: Mutex::new(None),
        })
    }

    fn last_prompt(&self) -> String {
        self.last_prompt.lock().unwrap().clone().unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete_stream(&self, prompt: &str, _params: &GenerationParams) -> LlmResult<TextStream> {
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());

        let mut items: Vec<LlmResult<TextChunk>> = self
            .tokens
            .iter()
            .map(|t| Ok(TextChunk::Token((*t).to_string())))
            .collect();
        if self.fail_mid_stream {
            items.push(Err(LLMError::Stream("connection reset".to_string())));
        } else {
            items.push(Ok(TextChunk::Done));
        }
        Ok(Box::pin(stream::iter(items)))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct BrokenBackend;

#[async_trait]
impl TextGenerator for BrokenBackend {
    async fn complete_stream(&self, _prompt: &str, _params: &GenerationParams) -> LlmResult<TextStream> {
        Err(LLMError::Api("HTTP 500: kaboom".to_string()))
    }

    fn model_name(&self) -> &str {
        "broken"
    }
}

fn test_config() -> ServerConfig {
    ServerConfig {
        counting: CountingStrategy::Heuristic,
        max_concurrency: 2,
        ..ServerConfig::default()
    }
}

async fn ready_state(config: ServerConfig, generator: Arc<dyn TextGenerator>) -> AppState {
    let state = AppState::new(config);
    state
        .model
        .initialize(generator, Duration::from_secs(1), Duration::from_millis(1))
        .await
        .unwrap();
    state
}

macro_rules! init_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(app_config),
        )
        .await
    };
}

#[actix_web::test]
async fn root_returns_greeting() {
    let state = AppState::new(test_config());
    let app = init_app!(state);

    let req = test::TestRequest::get().uri("/").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["message"], "Ay-oh! The API is runnin'. Whaddaya want?");
}

#[actix_web::test]
async fn health_reports_loading_then_ready_then_shut_down() {
    let state = AppState::new(test_config());
    let app = init_app!(state);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "loading");

    state
        .model
        .initialize(ScriptedGenerator::new(vec![]), Duration::from_secs(1), Duration::from_millis(1))
        .await
        .unwrap();

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["model"], "tony.gguf");
    assert_eq!(body["counter"], "heuristic");
    assert_eq!(body["template"], "phi3-v1");

    state.model.teardown().await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "shut_down");
}

#[actix_web::test]
async fn generate_returns_trimmed_reply_and_budget_stats() {
    let generator = ScriptedGenerator::new(vec!["  Ay, ", "what are you, ", "a wise guy?\n"]);
    let state = ready_state(test_config(), generator.clone()).await;
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/generate")
        .set_json(json!({
            "prompt": "Where's my gabagool?",
            "history": [
                { "role": "user", "content": "Hey Tony." },
                { "role": "assistant", "content": "What?" }
            ]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;

    assert_eq!(body["response"], "Ay, what are you, a wise guy?");
    assert_eq!(body["history_turns"], 2);
    assert_eq!(body["approximate"], true);
    assert!(body["prompt_tokens"].as_u64().unwrap() > 0);

    let prompt = generator.last_prompt();
    assert!(prompt.starts_with("<|system|>\nRespond like Tony Soprano would."));
    assert!(prompt.contains("<|user|>\nHey Tony.<|end|>\n<|assistant|>\nWhat?<|end|>\n"));
    assert!(prompt.ends_with("<|user|>\nWhere's my gabagool?<|end|>\n<|assistant|>\n"));
}

#[actix_web::test]
async fn generate_drops_oldest_history_when_over_budget() {
    let mut config = test_config();
    config.budget.max_context_tokens = 400;
    config.budget.response_reserve = 64;
    config.budget.safety_margin = 16;
    let generator = ScriptedGenerator::new(vec!["Fuggedaboutit."]);
    let state = ready_state(config, generator.clone()).await;
    let app = init_app!(state);

    let history: Vec<Value> = (0..20)
        .flat_map(|i| {
            vec![
                json!({ "role": "user", "content": format!("question number {i} about the waste management business") }),
                json!({ "role": "assistant", "content": format!("answer number {i}, none of your business") }),
            ]
        })
        .collect();

    let req = test::TestRequest::post()
        .uri("/generate")
        .set_json(json!({ "prompt": "Last one.", "history": history }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    let kept = body["history_turns"].as_u64().unwrap();
    assert!(kept > 0 && kept < 40);
    assert_eq!(kept % 2, 0);
    assert!(body["prompt_tokens"].as_u64().unwrap() <= 400 - 64);

    let prompt = generator.last_prompt();
    assert!(prompt.contains("answer number 19, none of your business"));
    assert!(!prompt.contains("question number 0 about"));
    assert!(prompt.contains("Last one."));
}

#[actix_web::test]
async fn empty_prompt_is_rejected() {
    let state = ready_state(test_config(), ScriptedGenerator::new(vec!["x"])).await;
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/generate")
        .set_json(json!({ "prompt": "   " }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[actix_web::test]
async fn malformed_json_is_rejected_with_json_error() {
    let state = ready_state(test_config(), ScriptedGenerator::new(vec!["x"])).await;
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/generate")
        .insert_header(("content-type", "application/json"))
        .set_payload("{\"history\": []}")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[actix_web::test]
async fn generate_while_loading_is_unavailable() {
    let state = AppState::new(test_config());
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/generate")
        .set_json(json!({ "prompt": "Hey" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "model_not_ready");
}

#[actix_web::test]
async fn generate_when_all_slots_busy_is_unavailable() {
    let mut config = test_config();
    config.max_concurrency = 1;
    let state = ready_state(config, ScriptedGenerator::new(vec!["x"])).await;
    let app = init_app!(state);

    let _held = state.generation_slots.clone().try_acquire_owned().unwrap();

    let req = test::TestRequest::post()
        .uri("/generate")
        .set_json(json!({ "prompt": "Hey" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "server_busy");
}

#[actix_web::test]
async fn backend_failure_is_bad_gateway() {
    let state = ready_state(test_config(), Arc::new(BrokenBackend)).await;
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/generate")
        .set_json(json!({ "prompt": "Hey" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(state.generation_slots.available_permits(), 2);
}

#[actix_web::test]
async fn stream_emits_token_frames_then_done() {
    let generator = ScriptedGenerator::new(vec![" ", " Ey", " oh!"]);
    let state = ready_state(test_config(), generator).await;
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/generate/stream")
        .set_json(json!({ "prompt": "Hey Tony" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let body = test::read_body(resp).await;
    let text = std::str::from_utf8(&body).unwrap();

    assert_eq!(
        text,
        "data: {\"token\":\"Ey\"}\n\ndata: {\"token\":\" oh!\"}\n\ndata: [DONE]\n\n"
    );
}

#[actix_web::test]
async fn stream_reports_backend_error_before_done() {
    let generator = ScriptedGenerator::failing_after(vec!["Ey"]);
    let state = ready_state(test_config(), generator).await;
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/generate/stream")
        .set_json(json!({ "prompt": "Hey Tony" }))
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    let frames: Vec<&str> = std::str::from_utf8(&body)
        .unwrap()
        .split("\n\n")
        .filter(|f| !f.is_empty())
        .collect();

    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0], "data: {\"token\":\"Ey\"}");
    assert!(frames[1].starts_with("data: {\"error\":"));
    assert!(frames[1].contains("connection reset"));
    assert_eq!(frames[2], "data: [DONE]");
}

#[actix_web::test]
async fn stream_start_failure_is_bad_gateway() {
    let state = ready_state(test_config(), Arc::new(BrokenBackend)).await;
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/generate/stream")
        .set_json(json!({ "prompt": "Hey" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}
