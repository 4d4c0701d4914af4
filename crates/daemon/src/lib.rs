pub mod api;
pub mod autosave;
pub mod config;
pub mod llm;
pub mod store;
pub mod workflow;
