pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod questions;
pub mod responder;
pub mod scraper;
pub mod store;
