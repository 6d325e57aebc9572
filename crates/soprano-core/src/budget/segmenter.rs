//! History segmentation for budget management.
//!
//! Groups turns into atomic units so truncation never separates a user
//! message from the reply it got.

use crate::template::ChatTemplate;
use crate::turn::{Role, Turn};

/// A slice of history admitted or dropped as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryUnit<'a> {
    /// A user turn immediately followed by an assistant turn
    Pair {
        user: &'a Turn,
        assistant: &'a Turn,
    },
    /// Any turn that does not open a pair: a leading or repeated assistant
    /// turn, a dangling user turn, or an unknown role
    Single(&'a Turn),
}

impl<'a> HistoryUnit<'a> {
    pub fn turn_count(&self) -> usize {
        match self {
            HistoryUnit::Pair { .. } => 2,
            HistoryUnit::Single(_) => 1,
        }
    }

    /// Render the unit with the template's turn delimiters.
    pub fn render(&self, template: &ChatTemplate) -> String {
        match self {
            HistoryUnit::Pair { user, assistant } => {
                let mut text = template.format_turn(user);
                text.push_str(&template.format_turn(assistant));
                text
            }
            HistoryUnit::Single(turn) => template.format_turn(turn),
        }
    }
}

/// Splits a conversation window into [`HistoryUnit`]s.
///
/// # Algorithm
///
/// Walk oldest to newest. When a `user` turn is directly followed by an
/// `assistant` turn, emit both as a pair; otherwise emit the current turn on
/// its own and move one step.
#[derive(Debug, Default)]
pub struct TurnSegmenter;

impl TurnSegmenter {
    pub fn new() -> Self {
        Self
    }

    /// Returns units in chronological order (oldest first).
    pub fn segment<'a>(&self, history: &'a [Turn]) -> Vec<HistoryUnit<'a>> {
        let mut units = Vec::with_capacity(history.len());
        let mut index = 0;

        while index < history.len() {
            let turn = &history[index];
            let next = history.get(index + 1);

            match (&turn.role, next) {
                (Role::User, Some(reply)) if reply.role == Role::Assistant => {
                    units.push(HistoryUnit::Pair {
                        user: turn,
                        assistant: reply,
                    });
                    index += 2;
                }
                _ => {
                    units.push(HistoryUnit::Single(turn));
                    index += 1;
                }
            }
        }

        units
    }
}
