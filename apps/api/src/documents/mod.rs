pub mod extraction;
pub mod handlers;
pub mod merge;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod prompts;
pub mod store;
