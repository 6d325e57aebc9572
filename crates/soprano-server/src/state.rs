use serde::Serialize;
use soprano_core::{select_counter, PromptBudgeter, SharedTokenCounter};
use soprano_llm::{GenerationParams, LLMError, TextGenerator};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tokio::time::Instant;

use crate::config::ServerConfig;

/// Lifecycle of the served model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Loading,
    Ready,
    Failed,
    ShutDown,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Loading => "loading",
            ModelStatus::Ready => "ready",
            ModelStatus::Failed => "failed",
            ModelStatus::ShutDown => "shut_down",
        }
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum ModelSlot {
    Loading,
    Ready(Arc<dyn TextGenerator>),
    Failed(String),
    ShutDown,
}

/// Process-wide handle on the model, readable by every request.
///
/// Requests only ever see a generator once the slot is `Ready`; the slot
/// moves `Loading -> Ready | Failed` once and ends at `ShutDown`.
pub struct ModelHandle {
    slot: RwLock<ModelSlot>,
    model_name: String,
}

impl ModelHandle {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            slot: RwLock::new(ModelSlot::Loading),
            model_name: model_name.into(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub async fn status(&self) -> ModelStatus {
        match &*self.slot.read().await {
            ModelSlot::Loading => ModelStatus::Loading,
            ModelSlot::Ready(_) => ModelStatus::Ready,
            ModelSlot::Failed(_) => ModelStatus::Failed,
            ModelSlot::ShutDown => ModelStatus::ShutDown,
        }
    }

    /// Reason the model failed to come up, if it did.
    pub async fn failure(&self) -> Option<String> {
        match &*self.slot.read().await {
            ModelSlot::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// The generator, only while the model is ready.
    pub async fn generator(&self) -> Option<Arc<dyn TextGenerator>> {
        match &*self.slot.read().await {
            ModelSlot::Ready(generator) => Some(generator.clone()),
            _ => None,
        }
    }

    /// Poll `generator` until its health check passes or `timeout` elapses.
    pub async fn initialize(
        &self,
        generator: Arc<dyn TextGenerator>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<(), LLMError> {
        let started = Instant::now();
        log::info!(
            "Waiting for model '{}' to load (timeout {}s)",
            self.model_name,
            timeout.as_secs()
        );

        loop {
            // A backend that accepts the connection but never answers must not
            // outlive the startup timeout.
            let remaining = timeout.saturating_sub(started.elapsed());
            let probe = match tokio::time::timeout(remaining, generator.health_check()).await {
                Ok(result) => result,
                Err(_) => Err(LLMError::NotReady(format!(
                    "health check gave no answer within {}s",
                    timeout.as_secs_f32()
                ))),
            };

            match probe {
                Ok(()) => {
                    let mut slot = self.slot.write().await;
                    if matches!(*slot, ModelSlot::ShutDown) {
                        log::info!("Model '{}' became ready after shutdown", self.model_name);
                        return Ok(());
                    }
                    *slot = ModelSlot::Ready(generator);
                    log::info!(
                        "✓ Model '{}' ready after {:.1}s",
                        self.model_name,
                        started.elapsed().as_secs_f32()
                    );
                    return Ok(());
                }
                Err(e) if started.elapsed() >= timeout => {
                    log::error!("Model '{}' failed to load: {}", self.model_name, e);
                    let mut slot = self.slot.write().await;
                    if !matches!(*slot, ModelSlot::ShutDown) {
                        *slot = ModelSlot::Failed(e.to_string());
                    }
                    return Err(e);
                }
                Err(e) => {
                    log::debug!("Model '{}' not ready yet: {}", self.model_name, e);
                    if matches!(*self.slot.read().await, ModelSlot::ShutDown) {
                        return Ok(());
                    }
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }

    /// Release the generator; later requests see `ShutDown`.
    pub async fn teardown(&self) {
        let mut slot = self.slot.write().await;
        if let ModelSlot::Ready(_) = &*slot {
            log::info!("Releasing model '{}'", self.model_name);
        }
        *slot = ModelSlot::ShutDown;
    }
}

/// Shared state handed to every actix worker.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub model: Arc<ModelHandle>,
    pub budgeter: Arc<PromptBudgeter>,
    pub generation_slots: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let counter = select_counter(config.counting, &config.encoding);
        Self::with_counter(config, counter)
    }

    pub fn with_counter(config: ServerConfig, counter: SharedTokenCounter) -> Self {
        let budgeter = PromptBudgeter::new(config.template, config.budget, counter);
        let budget = budgeter.budget();
        log::info!(
            "Prompt budget: {} context tokens, {} reserved for the reply, {} margin ({} template, {} counter)",
            budget.max_context_tokens,
            budget.response_reserve,
            budget.safety_margin,
            budgeter.template().version(),
            budgeter.counter_name()
        );

        Self {
            model: Arc::new(ModelHandle::new(config.model_name.clone())),
            budgeter: Arc::new(budgeter),
            generation_slots: Arc::new(Semaphore::new(config.max_concurrency)),
            config: Arc::new(config),
        }
    }

    /// Sampling parameters for one request, with the template's stop markers.
    pub fn generation_params(&self) -> GenerationParams {
        let params = GenerationParams::new(self.config.max_new_tokens)
            .with_stop(self.config.template.stop_sequences().iter().copied());
        match self.config.temperature {
            Some(temperature) => params.with_temperature(temperature),
            None => params,
        }
    }
}
