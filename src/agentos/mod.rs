// src/agentos/mod.rs

pub mod agent;
pub mod bootstrap;
pub mod config;
pub mod events;
pub mod ledger;
pub mod llm;
pub mod mailbox;
pub mod orchestrator;
pub mod prompts;
pub mod toolbox;
pub mod tools;
pub mod visualizer;

// Export the bootstrap entry point at module level so callers can write
// `agentos::Bootstrap` instead of walking the hierarchy.
pub use bootstrap::Bootstrap;
