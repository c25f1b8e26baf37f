pub mod connections;
pub mod global;
pub mod llm;
pub mod pipeline;
pub mod project;
