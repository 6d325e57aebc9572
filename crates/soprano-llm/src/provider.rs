use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Model not ready: {0}")]
    NotReady(String),
}

pub type Result<T> = std::result::Result<T, LLMError>;

/// One item of a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextChunk {
    /// Generated text fragment
    Token(String),
    /// Explicit end of generation
    Done,
}

pub type TextStream = Pin<Box<dyn Stream<Item = Result<TextChunk>> + Send>>;

/// Sampling parameters for one completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Upper bound on generated tokens
    pub max_new_tokens: u32,
    /// Generation halts as soon as any of these is produced
    #[serde(default)]
    pub stop: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl GenerationParams {
    pub fn new(max_new_tokens: u32) -> Self {
        Self {
            max_new_tokens,
            stop: Vec::new(),
            temperature: None,
        }
    }

    pub fn with_stop<I, S>(mut self, stop: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop = stop.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Text-completion capability of the served model.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Stream a completion of `prompt`.
    ///
    /// The stream yields [`TextChunk::Token`] fragments and ends with a single
    /// [`TextChunk::Done`].
    async fn complete_stream(&self, prompt: &str, params: &GenerationParams) -> Result<TextStream>;

    /// Complete `prompt` and return the whole generated text.
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let mut stream = self.complete_stream(prompt, params).await?;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk? {
                TextChunk::Token(token) => text.push_str(&token),
                TextChunk::Done => break,
            }
        }
        Ok(text)
    }

    /// Probe whether the model is loaded and can serve requests.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    /// Name of the loaded model, for logs and health output.
    fn model_name(&self) -> &str;
}
