//! Chat-turn delimiters the served model was instruction-tuned on.
//!
//! The delimiters are part of the model contract: a prompt rendered with the
//! wrong markers still "works" but the persona degrades badly. Every prompt
//! string in the workspace goes through [`ChatTemplate`].

use crate::turn::{Role, Turn};
use serde::{Deserialize, Serialize};

const PHI3_STOP_SEQUENCES: &[&str] = &["<|end|>", "<|user|>", "<|endoftext|>"];
const INSTRUCT_STOP_SEQUENCES: &[&str] = &["User:", "\nUser", "Instruct:"];

/// Prompt format for a model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatTemplate {
    /// Phi-3 instruct markers (`<|system|>`, `<|user|>`, `<|assistant|>`, `<|end|>`).
    #[default]
    Phi3,
    /// Single-line `Instruct:` / `User:` / `Output:` format of the first deployment.
    Instruct,
}

impl ChatTemplate {
    /// Stable identifier, bumped whenever the rendered format changes.
    pub fn version(&self) -> &'static str {
        match self {
            ChatTemplate::Phi3 => "phi3-v1",
            ChatTemplate::Instruct => "instruct-v1",
        }
    }

    pub fn format_system(&self, preamble: &str) -> String {
        match self {
            ChatTemplate::Phi3 => format!("<|system|>\n{preamble}<|end|>\n"),
            ChatTemplate::Instruct => format!("Instruct: {preamble}\n"),
        }
    }

    pub fn format_user(&self, content: &str) -> String {
        match self {
            ChatTemplate::Phi3 => format!("<|user|>\n{content}<|end|>\n"),
            ChatTemplate::Instruct => format!("User: {content}\n"),
        }
    }

    pub fn format_assistant(&self, content: &str) -> String {
        match self {
            ChatTemplate::Phi3 => format!("<|assistant|>\n{content}<|end|>\n"),
            ChatTemplate::Instruct => format!("Output: {content}\n"),
        }
    }

    /// Render a history turn. Unrecognised roles get user markers so the
    /// model never reads them as its own words.
    pub fn format_turn(&self, turn: &Turn) -> String {
        match turn.role {
            Role::Assistant => self.format_assistant(&turn.content),
            Role::User | Role::Other(_) => self.format_user(&turn.content),
        }
    }

    /// Empty assistant opening that primes generation.
    pub fn assistant_primer(&self) -> &'static str {
        match self {
            ChatTemplate::Phi3 => "<|assistant|>\n",
            ChatTemplate::Instruct => "Output:",
        }
    }

    pub fn stop_sequences(&self) -> &'static [&'static str] {
        match self {
            ChatTemplate::Phi3 => PHI3_STOP_SEQUENCES,
            ChatTemplate::Instruct => INSTRUCT_STOP_SEQUENCES,
        }
    }
}

impl std::str::FromStr for ChatTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "phi3" | "phi-3" => Ok(ChatTemplate::Phi3),
            "instruct" => Ok(ChatTemplate::Instruct),
            other => Err(format!("unknown chat template '{other}'")),
        }
    }
}
