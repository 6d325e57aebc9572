pub mod budget;
pub mod persona;
pub mod template;
pub mod turn;

pub use budget::{
    select_counter, BudgetWarning, CountingStrategy, PromptBudgeter, PromptResult,
    SharedTokenCounter, TokenBudget, TokenCounter,
};
pub use template::ChatTemplate;
pub use turn::{Role, Turn};
