//! Token counting for budget management.
//!
//! Two strategies sit behind [`TokenCounter`]: BPE counting via
//! `tiktoken-rs`, and a character heuristic used when the tokenizer cannot
//! be initialised. The strategy is picked once by [`select_counter`].
//!
//! Neither matches the served GGUF's SentencePiece vocabulary, so both report
//! `is_exact() == false` and every prompt they budget is flagged approximate.
//! Size `safety_margin` for the gap.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::CoreBPE;

/// Encoding used when none is configured.
pub const DEFAULT_ENCODING: &str = "cl100k_base";

/// Trait for token counting implementations.
pub trait TokenCounter: Send + Sync {
    /// Count tokens in a plain text string.
    fn count_text(&self, text: &str) -> u32;

    /// Whether counts come from the served model's own tokenizer.
    fn is_exact(&self) -> bool {
        true
    }

    /// Short name used in logs and warnings.
    fn name(&self) -> &str;
}

/// Arc-wrapped token counter for easy sharing.
pub type SharedTokenCounter = Arc<dyn TokenCounter>;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("tokenizer '{encoding}' unavailable: {reason}")]
    TokenizerUnavailable { encoding: String, reason: String },
}

/// Which counting strategy to start with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountingStrategy {
    /// BPE tokenizer, falling back to the heuristic if it fails to load
    #[default]
    Tokenizer,
    /// Character heuristic only
    Heuristic,
}

/// Counter backed by a `tiktoken` BPE encoding.
///
/// Tracks the model's token counts far closer than the heuristic, but the
/// vocabulary differs from the model's, so counts stay approximate.
pub struct TiktokenCounter {
    bpe: CoreBPE,
    encoding: String,
}

impl TiktokenCounter {
    /// Load a named encoding (`cl100k_base`, `o200k_base`, `p50k_base`, `r50k_base`).
    pub fn new(encoding: &str) -> Result<Self, CounterError> {
        let loaded = match encoding {
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "o200k_base" => tiktoken_rs::o200k_base(),
            "p50k_base" => tiktoken_rs::p50k_base(),
            "r50k_base" => tiktoken_rs::r50k_base(),
            other => {
                return Err(CounterError::TokenizerUnavailable {
                    encoding: other.to_string(),
                    reason: "unknown encoding".to_string(),
                })
            }
        };

        let bpe = loaded.map_err(|e| CounterError::TokenizerUnavailable {
            encoding: encoding.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            bpe,
            encoding: encoding.to_string(),
        })
    }
}

impl fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiktokenCounter")
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl TokenCounter for TiktokenCounter {
    fn count_text(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        let tokens = self.bpe.encode_with_special_tokens(text).len();
        u32::try_from(tokens).unwrap_or(u32::MAX)
    }

    fn is_exact(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        &self.encoding
    }
}

/// Heuristic token counter using character-based estimation.
///
/// Uses the approximation: tokens ≈ characters / 4, with a 10% safety margin.
/// Deliberately conservative so the budget errs on the short side.
#[derive(Debug, Clone)]
pub struct HeuristicTokenCounter {
    /// Characters per token ratio (default: 4)
    chars_per_token: f64,
    /// Safety margin multiplier (default: 1.1 = 10% extra)
    safety_margin: f64,
}

impl HeuristicTokenCounter {
    pub fn new(chars_per_token: f64, safety_margin: f64) -> Self {
        Self {
            chars_per_token,
            safety_margin,
        }
    }

    /// chars/4 + 10% margin.
    pub fn with_defaults() -> Self {
        Self::new(4.0, 1.1)
    }
}

impl Default for HeuristicTokenCounter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TokenCounter for HeuristicTokenCounter {
    fn count_text(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }

        let char_count = text.chars().count() as f64;
        let base_tokens = char_count / self.chars_per_token;
        let adjusted_tokens = base_tokens * self.safety_margin;

        adjusted_tokens.ceil() as u32
    }

    fn is_exact(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Pick the counting strategy for the process.
///
/// Called once at start-up; a tokenizer that fails to load is reported with
/// a single warning and replaced by the heuristic.
pub fn select_counter(strategy: CountingStrategy, encoding: &str) -> SharedTokenCounter {
    match strategy {
        CountingStrategy::Heuristic => {
            tracing::info!("Using heuristic token counting (chars/4 + 10%)");
            Arc::new(HeuristicTokenCounter::default())
        }
        CountingStrategy::Tokenizer => match TiktokenCounter::new(encoding) {
            Ok(counter) => {
                tracing::info!(
                    "Using tokenizer '{}' as a proxy for the model vocabulary in prompt budgeting",
                    encoding
                );
                Arc::new(counter)
            }
            Err(e) => {
                tracing::warn!(
                    "{}; falling back to approximate counting, budget guarantees are best-effort",
                    e
                );
                Arc::new(HeuristicTokenCounter::default())
            }
        },
    }
}
