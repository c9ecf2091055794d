pub mod aggregator;
pub mod cache;
pub mod handlers;
pub mod merge;
pub mod prompts;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod response_parser;
pub mod sse;
pub mod types;

#[cfg(test)]
pub mod testing;
