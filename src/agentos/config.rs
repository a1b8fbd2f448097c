//! System configuration.
//!
//! Provides the [`SystemConfig`] struct: an immutable snapshot of budget,
//! caps, costs, paths, capability flags, and LLM settings shared by the
//! whole simulation.  Users construct it manually (typically from CLI
//! flags) and call [`SystemConfig::validate`] before booting.  No
//! config-file parsing dependencies are introduced.
//!
//! # Example
//!
//! ```rust
//! use agentos::SystemConfig;
//!
//! let mut config = SystemConfig::default();
//! config.objective = "Build a landing page".to_string();
//! config.initial_budget = 50.0;
//! config.validate().unwrap();
//! ```

use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Tools that cannot be disabled through [`SystemConfig::disabled_tools`].
///
/// The file manager is the delivery path for every worker, so a
/// configuration that removed it would leave agents unable to produce
/// artefacts.
pub const PROTECTED_TOOLS: &[&str] = &["file_manager"];

/// Configuration error raised by [`SystemConfig::validate`].
#[derive(Debug, Clone)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid configuration: {}", self.0)
    }
}

impl Error for ConfigError {}

/// Capability switches that gate optional agent behaviour.
#[derive(Debug, Clone)]
pub struct Capabilities {
    /// Inter-agent messaging (the `messaging` tool and mailbox prompts).
    pub messaging: bool,
    /// Architect validation pass over the founder's draft plan.
    pub advanced_planning: bool,
    /// The tool-forging protocol (`REQUEST_NEW_TOOL`).
    pub tool_creation: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            messaging: true,
            advanced_planning: true,
            tool_creation: false,
        }
    }
}

/// Settings forwarded to the LLM adapter on every call.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Provider key: `openai`, `deepseek`, `kimi`, or `groq`.
    pub provider: String,
    /// Upstream model identifier.
    pub model: String,
    pub temperature: f64,
    pub max_tokens: usize,
    /// Per-call timeout; the adapter adds a 10 s outer wall on top.
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let model = std::env::var("AOS_MODEL_NAME").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Self {
            provider: "openai".to_string(),
            model,
            temperature: 0.2,
            max_tokens: 2_000,
            timeout: Duration::from_secs(90),
        }
    }
}

/// System-wide configuration for a simulation run.
///
/// Immutable once handed to the orchestrator.  Monetary values are USD;
/// token prices are per million tokens.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    /// The user-supplied high-level objective handed to the founder.
    pub objective: String,
    /// Funds granted to the founder at boot.
    pub initial_budget: f64,
    /// Global cap on the agent population (founder included).
    pub max_agents: usize,

    pub price_per_1m_input_tokens: f64,
    pub price_per_1m_output_tokens: f64,
    /// Flat fee charged to a parent for spawning a child.
    pub spawn_cost: f64,
    /// Flat fee charged per tool invocation.
    pub tool_use_cost: f64,

    /// Base directory holding `workspace/` and `delivery/`.
    pub output_base: PathBuf,
    /// Directory scanned for generated plugin tools.
    pub plugins_dir: PathBuf,
    /// Tool names removed from every toolbox (protected tools exempt).
    pub disabled_tools: Vec<String>,

    /// Wall-clock bound on the whole simulation.
    pub simulation_timeout: Duration,
    /// How long cancelled agent tasks are given to stop.
    pub shutdown_timeout: Duration,

    pub capabilities: Capabilities,
    pub llm: LlmConfig,

    /// Serve the live visualizer WebSocket endpoint.
    pub visualize: bool,
    pub visualizer_addr: SocketAddr,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            objective: "Achieve a complex, multi-step goal.".to_string(),
            initial_budget: 100.0,
            max_agents: 10,
            price_per_1m_input_tokens: 5.0,
            price_per_1m_output_tokens: 15.0,
            spawn_cost: 0.01,
            tool_use_cost: 0.005,
            output_base: PathBuf::from("./output"),
            plugins_dir: PathBuf::from("./plugins"),
            disabled_tools: Vec::new(),
            simulation_timeout: Duration::from_secs(600),
            shutdown_timeout: Duration::from_secs(10),
            capabilities: Capabilities::default(),
            llm: LlmConfig::default(),
            visualize: false,
            visualizer_addr: "127.0.0.1:8765".parse().expect("static socket address"),
        }
    }
}

impl SystemConfig {
    /// Directory under which each agent gets its own sandbox.
    pub fn workspace_path(&self) -> PathBuf {
        self.output_base.join("workspace")
    }

    /// Flat directory where workers deposit final artefacts.
    pub fn delivery_path(&self) -> PathBuf {
        self.output_base.join("delivery")
    }

    /// Sandbox directory for one agent.
    pub fn agent_workspace(&self, agent_id: &str) -> PathBuf {
        self.workspace_path().join(agent_id)
    }

    /// Check parameter ranges.  Must pass before the config is used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_budget <= 0.0 {
            return Err(ConfigError("initial_budget must be positive".to_string()));
        }
        if self.max_agents == 0 {
            return Err(ConfigError(
                "max_agents must be a positive integer".to_string(),
            ));
        }
        if self.price_per_1m_input_tokens < 0.0 || self.price_per_1m_output_tokens < 0.0 {
            return Err(ConfigError("Token prices cannot be negative".to_string()));
        }
        if self.spawn_cost < 0.0 || self.tool_use_cost < 0.0 {
            return Err(ConfigError("Costs cannot be negative".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SystemConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_budget() {
        let mut config = SystemConfig::default();
        config.initial_budget = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_agent_cap() {
        let mut config = SystemConfig::default();
        config.max_agents = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_negative_prices_and_costs() {
        let mut config = SystemConfig::default();
        config.price_per_1m_output_tokens = -1.0;
        assert!(config.validate().is_err());

        let mut config = SystemConfig::default();
        config.spawn_cost = -0.01;
        assert!(config.validate().is_err());
    }

    #[test]
    fn derived_paths_nest_under_output_base() {
        let mut config = SystemConfig::default();
        config.output_base = PathBuf::from("/tmp/aos");
        assert_eq!(config.workspace_path(), PathBuf::from("/tmp/aos/workspace"));
        assert_eq!(config.delivery_path(), PathBuf::from("/tmp/aos/delivery"));
        assert_eq!(
            config.agent_workspace("ab12cd34"),
            PathBuf::from("/tmp/aos/workspace/ab12cd34")
        );
    }
}
