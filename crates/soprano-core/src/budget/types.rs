//! Core types for prompt budgeting.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Context window of the served GGUF build.
pub const DEFAULT_MAX_CONTEXT_TOKENS: u32 = 2048;
/// Tokens held back for the model's reply.
pub const DEFAULT_RESPONSE_RESERVE: u32 = 256;
/// Slack against tokenizer estimation error.
pub const DEFAULT_SAFETY_MARGIN: u32 = 64;

/// Token budget for a single prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenBudget {
    /// Maximum context window size for the model (input + output)
    pub max_context_tokens: u32,
    /// Tokens reserved for generation output
    pub response_reserve: u32,
    /// Safety margin for tokenizer estimation errors
    pub safety_margin: u32,
}

impl TokenBudget {
    pub fn new(max_context_tokens: u32, response_reserve: u32, safety_margin: u32) -> Self {
        Self {
            max_context_tokens,
            response_reserve,
            safety_margin,
        }
    }

    /// Hard ceiling for the assembled prompt (context window minus output reserve).
    pub fn prompt_ceiling(&self) -> u32 {
        self.max_context_tokens.saturating_sub(self.response_reserve)
    }

    /// Unclamped history allowance once the preamble and current input are paid for.
    ///
    /// Negative when the fixed parts alone overrun the budget.
    pub fn raw_history_allowance(&self, system_tokens: u32, current_tokens: u32) -> i64 {
        i64::from(self.max_context_tokens)
            - i64::from(system_tokens)
            - i64::from(current_tokens)
            - i64::from(self.response_reserve)
            - i64::from(self.safety_margin)
    }

    /// History allowance clamped at zero.
    pub fn available_for_history(&self, system_tokens: u32, current_tokens: u32) -> u32 {
        let raw = self.raw_history_allowance(system_tokens, current_tokens);
        raw.clamp(0, i64::from(u32::MAX)) as u32
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_CONTEXT_TOKENS,
            DEFAULT_RESPONSE_RESERVE,
            DEFAULT_SAFETY_MARGIN,
        )
    }
}

/// Detailed token usage of an assembled prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsageBreakdown {
    /// Tokens used by the formatted system preamble
    pub system_tokens: u32,
    /// Tokens used by the formatted current input and the assistant primer
    pub current_tokens: u32,
    /// Sum of admitted history unit costs
    pub history_tokens: u32,
    /// History allowance after clamping
    pub available_for_history: u32,
    /// Ceiling the whole prompt is meant to stay under
    pub prompt_ceiling: u32,
}

/// Conditions worth a warning that never fail prompt assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BudgetWarning {
    /// Counts come from the character heuristic, not the model tokenizer
    #[error("token counts are approximate (counter: {counter})")]
    ApproximateCounting { counter: String },

    /// Preamble plus current input leave no room for history
    #[error("preamble ({system_tokens} tokens) and current input ({current_tokens} tokens) leave no history budget (allowance {allowance})")]
    BudgetExhaustedBeforeCurrentInput {
        system_tokens: u32,
        current_tokens: u32,
        allowance: i64,
    },

    /// History entry with a role outside user/assistant, kept as a singleton
    #[error("history entry {index} has unrecognised role '{role}'")]
    MalformedHistoryEntry { index: usize, role: String },
}

/// Result of prompt assembly, consumed once by the inference call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptResult {
    /// Final prompt text
    pub text: String,
    /// Token count of `text`, measured with the budgeting counter
    pub token_count: u32,
    /// Breakdown of where the tokens went
    pub usage: TokenUsageBreakdown,
    /// History turns included in `text`
    pub turns_admitted: usize,
    /// History turns dropped by truncation
    pub turns_dropped: usize,
    /// Whether counts came from an approximate counter
    pub approximate: bool,
    pub warnings: Vec<BudgetWarning>,
}

impl PromptResult {
    /// Whether the measured prompt stays under the ceiling.
    pub fn within_ceiling(&self) -> bool {
        self.token_count <= self.usage.prompt_ceiling
    }
}
