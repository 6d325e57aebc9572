//! Prompt assembly under a hard token ceiling.
//!
//! Builds the final prompt from the persona preamble, as much recent history
//! as fits, and the current user input. Neither the preamble nor the current
//! input is ever truncated; history is dropped oldest first.

use crate::budget::counter::SharedTokenCounter;
use crate::budget::segmenter::{HistoryUnit, TurnSegmenter};
use crate::budget::types::{BudgetWarning, PromptResult, TokenBudget, TokenUsageBreakdown};
use crate::template::ChatTemplate;
use crate::turn::Turn;
use std::fmt;

/// Stateless prompt builder shared by every request.
pub struct PromptBudgeter {
    template: ChatTemplate,
    budget: TokenBudget,
    counter: SharedTokenCounter,
    segmenter: TurnSegmenter,
}

impl PromptBudgeter {
    pub fn new(template: ChatTemplate, budget: TokenBudget, counter: SharedTokenCounter) -> Self {
        Self {
            template,
            budget,
            counter,
            segmenter: TurnSegmenter::new(),
        }
    }

    pub fn template(&self) -> ChatTemplate {
        self.template
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    pub fn counter_name(&self) -> &str {
        self.counter.name()
    }

    /// Assemble a prompt that fits the budget.
    ///
    /// 1. Format and count the system preamble
    /// 2. Format and count the current input as a user turn, together with
    ///    the assistant primer that follows it
    /// 3. Derive the history allowance (clamped at zero)
    /// 4. Segment history into pairs and singletons, then admit units from
    ///    the newest backwards, stopping at the first one that does not fit
    /// 5. Concatenate preamble, admitted history, current input and the
    ///    assistant primer
    /// 6. Measure the result
    ///
    /// Never fails; degraded conditions are reported in
    /// [`PromptResult::warnings`].
    pub fn build_prompt(
        &self,
        system_preamble: &str,
        history: &[Turn],
        current_input: &str,
    ) -> PromptResult {
        let mut warnings = Vec::new();

        if !self.counter.is_exact() {
            warnings.push(BudgetWarning::ApproximateCounting {
                counter: self.counter.name().to_string(),
            });
        }

        // 1-2. Fixed parts; the primer always follows the current input
        let primer = self.template.assistant_primer();
        let system_text = self.template.format_system(system_preamble);
        let system_tokens = self.counter.count_text(&system_text);
        let mut current_text = self.template.format_user(current_input);
        current_text.push_str(primer);
        let current_tokens = self.counter.count_text(&current_text);

        // 3. History allowance
        let allowance = self
            .budget
            .raw_history_allowance(system_tokens, current_tokens);
        let available_for_history = self
            .budget
            .available_for_history(system_tokens, current_tokens);
        if allowance <= 0 {
            tracing::warn!(
                "Preamble ({} tokens) and current input ({} tokens) exhaust the budget; no history admitted",
                system_tokens,
                current_tokens
            );
            warnings.push(BudgetWarning::BudgetExhaustedBeforeCurrentInput {
                system_tokens,
                current_tokens,
                allowance,
            });
        }

        for (index, turn) in history.iter().enumerate() {
            if !turn.role.is_known() {
                tracing::warn!(
                    "History entry {} has unrecognised role '{}', treating as orphan",
                    index,
                    turn.role
                );
                warnings.push(BudgetWarning::MalformedHistoryEntry {
                    index,
                    role: turn.role.to_string(),
                });
            }
        }

        // 4. Segment and admit
        let units = self.segmenter.segment(history);
        let rendered: Vec<(String, u32)> = units
            .iter()
            .map(|unit| {
                let text = unit.render(&self.template);
                let cost = self.counter.count_text(&text);
                (text, cost)
            })
            .collect();

        let first_admitted = admit_newest_first(&rendered, available_for_history);
        let history_tokens = rendered[first_admitted..]
            .iter()
            .fold(0u32, |acc, (_, cost)| acc.saturating_add(*cost));
        let turns_admitted: usize = units[first_admitted..]
            .iter()
            .map(HistoryUnit::turn_count)
            .sum();
        let turns_dropped = history.len() - turns_admitted;

        // 5. Concatenate in original order
        let history_len: usize = rendered[first_admitted..]
            .iter()
            .map(|(text, _)| text.len())
            .sum();
        let mut text = String::with_capacity(system_text.len() + history_len + current_text.len());
        text.push_str(&system_text);
        for (unit_text, _) in &rendered[first_admitted..] {
            text.push_str(unit_text);
        }
        text.push_str(&current_text);

        // 6. Measure
        let token_count = self.counter.count_text(&text);
        let prompt_ceiling = self.budget.prompt_ceiling();

        if token_count > prompt_ceiling {
            tracing::warn!(
                "Assembled prompt ({} tokens) exceeds ceiling ({} tokens)",
                token_count,
                prompt_ceiling
            );
        }

        tracing::debug!(
            "Prompt built: {} tokens (system {}, history {}, current {}), {} turns admitted, {} dropped",
            token_count,
            system_tokens,
            history_tokens,
            current_tokens,
            turns_admitted,
            turns_dropped
        );

        PromptResult {
            text,
            token_count,
            usage: TokenUsageBreakdown {
                system_tokens,
                current_tokens,
                history_tokens,
                available_for_history,
                prompt_ceiling,
            },
            turns_admitted,
            turns_dropped,
            approximate: !self.counter.is_exact(),
            warnings,
        }
    }
}

impl fmt::Debug for PromptBudgeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptBudgeter")
            .field("template", &self.template)
            .field("budget", &self.budget)
            .field("counter", &self.counter.name())
            .finish()
    }
}

/// Index of the oldest admitted unit.
///
/// Walks from the newest unit backwards and stops at the first one whose
/// cost would overflow `available`; nothing older is considered after that.
fn admit_newest_first(units: &[(String, u32)], available: u32) -> usize {
    let mut running: u32 = 0;
    let mut first = units.len();

    for (index, (_, cost)) in units.iter().enumerate().rev() {
        match running.checked_add(*cost) {
            Some(total) if total <= available => {
                running = total;
                first = index;
            }
            _ => break,
        }
    }

    first
}
