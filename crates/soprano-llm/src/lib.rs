pub mod llamacpp;
pub mod provider;
pub mod sse;

pub use llamacpp::LlamaCppProvider;
pub use provider::{GenerationParams, LLMError, Result, TextChunk, TextGenerator, TextStream};
