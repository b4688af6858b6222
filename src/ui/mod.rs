pub mod types;
pub mod terminal;
