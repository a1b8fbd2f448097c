// src/lib.rs

// Import the top-level `agentos` module.
pub mod agentos;

// Re-exporting key items for easier external access.
pub use agentos::agent::{Agent, AgentConfig, AgentState};
pub use agentos::bootstrap::Bootstrap;
pub use agentos::config::{Capabilities, LlmConfig, SystemConfig};
pub use agentos::ledger::{Ledger, TransactionKind};
pub use agentos::llm::LlmClient;
pub use agentos::orchestrator::Orchestrator;
