use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use soprano_core::budget::DEFAULT_ENCODING;
use soprano_core::persona::TONY_SOPRANO_PREAMBLE;
use soprano_core::{ChatTemplate, CountingStrategy, TokenBudget};
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Runtime configuration of the persona server.
///
/// Resolution order: defaults, then the TOML file, then `SOPRANO_*`
/// environment variables, then command-line flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL of the llama.cpp server hosting the model
    pub backend_url: String,
    pub model_name: String,
    /// System preamble sent with every prompt
    pub persona: String,
    pub template: ChatTemplate,
    pub budget: TokenBudget,
    /// Generation cap per request, set independently of `budget.response_reserve`
    pub max_new_tokens: u32,
    pub temperature: Option<f32>,
    pub counting: CountingStrategy,
    /// tiktoken encoding used when `counting = "tokenizer"`
    pub encoding: String,
    /// Maximum generations in flight; excess requests get 503
    pub max_concurrency: usize,
    pub keep_alive_secs: u64,
    /// How long to wait for the backend to report ready
    pub startup_timeout_secs: u64,
    pub health_poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            backend_url: "http://127.0.0.1:8080".to_string(),
            model_name: "tony.gguf".to_string(),
            persona: TONY_SOPRANO_PREAMBLE.to_string(),
            template: ChatTemplate::default(),
            budget: TokenBudget::default(),
            max_new_tokens: 128,
            temperature: None,
            counting: CountingStrategy::default(),
            encoding: DEFAULT_ENCODING.to_string(),
            max_concurrency: 5,
            keep_alive_secs: 300,
            startup_timeout_secs: 300,
            health_poll_interval_ms: 1000,
        }
    }
}

fn soprano_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".soprano")
}

/// `~/.soprano/config.toml`
pub fn default_config_path() -> PathBuf {
    soprano_dir().join(CONFIG_FILE_NAME)
}

impl ServerConfig {
    /// Load configuration from `path`, or from the default location when it exists.
    ///
    /// An explicit path must exist and parse. A broken default file is
    /// reported and ignored.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    match Self::from_file(&default_path) {
                        Ok(config) => config,
                        Err(e) => {
                            log::warn!("Ignoring config at {:?}: {:#}", default_path, e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: ServerConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        log::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Apply `SOPRANO_*` overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SOPRANO_HOST") {
            self.host = host;
        }
        if let Some(url) = lookup("SOPRANO_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Some(model) = lookup("SOPRANO_MODEL") {
            self.model_name = model;
        }
        if let Some(persona) = lookup("SOPRANO_PERSONA") {
            self.persona = persona;
        }
        if let Some(encoding) = lookup("SOPRANO_ENCODING") {
            self.encoding = encoding;
        }

        override_parsed(&lookup, "SOPRANO_PORT", &mut self.port);
        override_parsed(&lookup, "SOPRANO_MAX_CONTEXT", &mut self.budget.max_context_tokens);
        override_parsed(&lookup, "SOPRANO_RESPONSE_RESERVE", &mut self.budget.response_reserve);
        override_parsed(&lookup, "SOPRANO_SAFETY_MARGIN", &mut self.budget.safety_margin);
        override_parsed(&lookup, "SOPRANO_MAX_NEW_TOKENS", &mut self.max_new_tokens);
        override_parsed(&lookup, "SOPRANO_MAX_CONCURRENCY", &mut self.max_concurrency);
        override_parsed(&lookup, "SOPRANO_TEMPLATE", &mut self.template);

        if let Some(temperature) = lookup("SOPRANO_TEMPERATURE") {
            match temperature.trim().parse::<f32>() {
                Ok(value) => self.temperature = Some(value),
                Err(_) => log::warn!("Ignoring invalid SOPRANO_TEMPERATURE={:?}", temperature),
            }
        }

        if let Some(counting) = lookup("SOPRANO_COUNTING") {
            match parse_counting(&counting) {
                Some(strategy) => self.counting = strategy,
                None => log::warn!("Ignoring invalid SOPRANO_COUNTING={:?}", counting),
            }
        }
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_new_tokens == 0 {
            bail!("max_new_tokens must be greater than zero");
        }
        if self.max_concurrency == 0 {
            bail!("max_concurrency must be at least 1");
        }
        if self.budget.response_reserve >= self.budget.max_context_tokens {
            bail!(
                "response_reserve ({}) must be smaller than max_context_tokens ({})",
                self.budget.response_reserve,
                self.budget.max_context_tokens
            );
        }
        if self.max_new_tokens > self.budget.response_reserve {
            log::warn!(
                "max_new_tokens ({}) exceeds response_reserve ({}); long replies may be cut by the context window",
                self.max_new_tokens,
                self.budget.response_reserve
            );
        }
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => log::warn!("Ignoring invalid {}={:?}", key, raw),
        }
    }
}

fn parse_counting(value: &str) -> Option<CountingStrategy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "tokenizer" | "tiktoken" => Some(CountingStrategy::Tokenizer),
        "heuristic" | "approximate" => Some(CountingStrategy::Heuristic),
        _ => None,
    }
}
