//! Bootstrap — the BIOS of the agent operating system.
//!
//! Wires the ledger, the LLM adapter, and the orchestrator together,
//! spawns the founder agent with the initial budget, and runs the
//! simulation to completion.
//!
//! # Example
//!
//! ```rust,no_run
//! use agentos::{Bootstrap, SystemConfig};
//!
//! # async {
//! let mut config = SystemConfig::default();
//! config.objective = "Write a haiku generator".to_string();
//!
//! let mut bios = Bootstrap::new(config);
//! let report = bios.boot().await.unwrap();
//! println!("Total cost: ${:.4}", report.total_cost);
//! # };
//! ```

use crate::agentos::config::SystemConfig;
use crate::agentos::ledger::Ledger;
use crate::agentos::llm::{client_for_provider, LlmClient};
use crate::agentos::orchestrator::{Orchestrator, SimulationReport};
use crate::agentos::visualizer;
use std::error::Error;
use std::sync::Arc;

/// Everything a finished boot reports back to the caller.
#[derive(Debug)]
pub struct BootReport {
    pub founder_id: String,
    pub final_state: SimulationReport,
    pub total_cost: f64,
}

/// System assembler and lifecycle owner.
pub struct Bootstrap {
    config: SystemConfig,
    llm_override: Option<Arc<dyn LlmClient>>,
    ledger: Option<Arc<Ledger>>,
    orchestrator: Option<Arc<Orchestrator>>,
}

impl Bootstrap {
    pub fn new(config: SystemConfig) -> Self {
        Self {
            config,
            llm_override: None,
            ledger: None,
            orchestrator: None,
        }
    }

    /// Inject an LLM client instead of resolving one from the provider
    /// table.  Used by tests and embedders with custom adapters.
    pub fn with_llm_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.llm_override = Some(client);
        self
    }

    /// The orchestrator, once [`Bootstrap::boot`] has built it.
    pub fn orchestrator(&self) -> Option<&Arc<Orchestrator>> {
        self.orchestrator.as_ref()
    }

    /// Validate the configuration, assemble the system, spawn the
    /// founder, and run the event loop to completion.
    pub async fn boot(&mut self) -> Result<BootReport, Box<dyn Error + Send + Sync>> {
        self.config.validate()?;
        log::info!(target: "aos::bootstrap", "Initializing AgentOS...");

        let ledger = Arc::new(Ledger::new());
        let llm = match &self.llm_override {
            Some(client) => client.clone(),
            None => client_for_provider(&self.config.llm.provider)?,
        };
        let orchestrator = Orchestrator::new(self.config.clone(), ledger.clone(), llm);
        self.ledger = Some(ledger.clone());
        self.orchestrator = Some(orchestrator.clone());

        if self.config.visualize {
            let endpoint = orchestrator.clone();
            let addr = self.config.visualizer_addr;
            tokio::spawn(async move {
                if let Err(e) = visualizer::serve(endpoint, addr).await {
                    log::error!(target: "aos::bootstrap", "Visualizer server failed: {}", e);
                }
            });
        }

        let founder_id = orchestrator
            .spawn_founder(&self.config.objective, self.config.initial_budget)
            .await?;
        log::info!(
            target: "aos::bootstrap",
            "System booted. Founder agent {} created.",
            founder_id
        );

        let final_state = orchestrator.run().await;
        let total_cost = ledger.total_expenditure().await;
        Ok(BootReport {
            founder_id,
            final_state,
            total_cost,
        })
    }

    /// Gracefully stop whatever is still running.
    pub async fn shutdown(&self) {
        if let Some(orchestrator) = &self.orchestrator {
            orchestrator.shutdown().await;
        }
        log::info!(target: "aos::bootstrap", "AgentOS shutdown complete");
    }
}
