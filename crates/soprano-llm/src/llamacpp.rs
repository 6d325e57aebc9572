use crate::provider::{GenerationParams, LLMError, Result, TextChunk, TextGenerator, TextStream};
use crate::sse::text_stream_from_sse;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// Client for a llama.cpp HTTP server hosting the persona GGUF.
pub struct LlamaCppProvider {
    client: Client,
    base_url: String,
    model: String,
}

impl LlamaCppProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: "tony.gguf".to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_request_body<'a>(
        &self,
        prompt: &'a str,
        params: &'a GenerationParams,
        stream: bool,
    ) -> CompletionRequest<'a> {
        CompletionRequest {
            prompt,
            n_predict: params.max_new_tokens,
            stop: &params.stop,
            temperature: params.temperature,
            stream,
            cache_prompt: true,
        }
    }

    async fn post_completion(
        &self,
        prompt: &str,
        params: &GenerationParams,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let body = self.build_request_body(prompt, params, stream);
        log::debug!(
            "POST {}/completion (prompt {} chars, n_predict {}, stream {})",
            self.base_url,
            prompt.len(),
            params.max_new_tokens,
            stream
        );

        let response = self
            .client
            .post(format!("{}/completion", self.base_url))
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            let text = response.text().await?;
            return Err(LLMError::NotReady(error_message(&text)));
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(LLMError::Api(format!("HTTP {}: {}", status, error_message(&text))));
        }

        Ok(response)
    }
}

#[async_trait]
impl TextGenerator for LlamaCppProvider {
    async fn complete_stream(&self, prompt: &str, params: &GenerationParams) -> Result<TextStream> {
        let response = self.post_completion(prompt, params, true).await?;

        let stream = text_stream_from_sse(response, |_event, data| {
            if data.trim().is_empty() {
                return Ok(None);
            }

            let chunk: CompletionChunk = serde_json::from_str(data)?;
            if chunk.stop {
                return Ok(Some(TextChunk::Done));
            }
            if chunk.content.is_empty() {
                return Ok(None);
            }
            Ok(Some(TextChunk::Token(chunk.content)))
        });

        Ok(stream)
    }

    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let response = self.post_completion(prompt, params, false).await?;
        let completion: CompletionChunk = response.json().await?;
        Ok(completion.content)
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::SERVICE_UNAVAILABLE => {
                let text = response.text().await?;
                Err(LLMError::NotReady(error_message(&text)))
            }
            status => {
                let text = response.text().await?;
                Err(LLMError::Api(format!("HTTP {}: {}", status, error_message(&text))))
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    #[serde(skip_serializing_if = "no_stop_sequences")]
    stop: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    cache_prompt: bool,
}

fn no_stop_sequences(stop: &&[String]) -> bool {
    stop.is_empty()
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    content: String,
    #[serde(default)]
    stop: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Pull `error.message` out of a llama.cpp error body, or return the body as-is.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}
