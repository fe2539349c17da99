pub mod actions;
pub mod aggregation;
pub mod analysis;
pub mod config;
pub mod dataset;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod orchestrator;
pub mod preparation;
pub mod profiler;
pub mod prompts;
pub mod session;
pub mod store;
pub mod transform;
