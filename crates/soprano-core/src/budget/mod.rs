//! Token budget management for persona prompts.
//!
//! Keeps the assembled prompt inside the model's context window while
//! preserving the most recent exchange.
//!
//! # Key Components
//!
//! - [`types`]: `TokenBudget`, `PromptResult`, `BudgetWarning`
//! - [`counter`]: Token counting via tiktoken, with a heuristic fallback
//! - [`segmenter`]: History segmentation into user/assistant pairs and orphans
//! - [`builder`]: Prompt assembly with FIFO history truncation

pub mod builder;
pub mod counter;
pub mod segmenter;
pub mod types;

pub use builder::PromptBudgeter;
pub use counter::{
    select_counter, CounterError, CountingStrategy, HeuristicTokenCounter, SharedTokenCounter,
    TiktokenCounter, TokenCounter, DEFAULT_ENCODING,
};
pub use segmenter::{HistoryUnit, TurnSegmenter};
pub use types::{BudgetWarning, PromptResult, TokenBudget, TokenUsageBreakdown};
