pub mod generate;
pub mod health;
pub mod root;
pub mod stream;
