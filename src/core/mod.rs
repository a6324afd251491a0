pub mod agent;
pub mod calendar;
pub mod chat;
pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod llm;
pub mod mention;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod prompt_cache;
pub mod responder;
pub mod scheduler;
pub mod store;
pub mod terminal;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;
