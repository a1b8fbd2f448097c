//! Orchestrator — the kernel of the agent society.
//!
//! The orchestrator exclusively owns the agent table, every mailbox, and
//! the pending tool-request registry.  It admits new agents under the
//! global cap, routes inter-agent messages, intercepts system-level
//! events (tool-creation reports from forging agents), supervises
//! progress and the simulation timeout, and reports the final state.
//!
//! Scheduling is cooperative: each active agent runs in its own tokio
//! task, and the supervisor loop ticks once per second:
//!
//! 1. process system events out of the mailboxes,
//! 2. start tasks for newly admitted agents,
//! 3. every 30 s, log a progress report,
//! 4. exit when every agent is terminal or the wall clock runs out.
//!
//! On exit, still-running tasks are cancelled and joined within the
//! shutdown timeout; stragglers are marked `Failed`.

use crate::agentos::agent::{Agent, AgentConfig, AgentState};
use crate::agentos::config::SystemConfig;
use crate::agentos::events::{EventBus, GraphEdge, GraphNode, VisualizerEvent};
use crate::agentos::ledger::{Ledger, LedgerError};
use crate::agentos::llm::LlmClient;
use crate::agentos::mailbox::{AgentMessage, Mailboxes};
use crate::agentos::prompts;
use crate::agentos::toolbox::Toolbox;
use crate::agentos::tools::file_manager::resolve_in_workspace;
use crate::agentos::tools::PluginManifest;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Role given to the root agent.
pub const FOUNDER_ROLE: &str = "Founder";

/// Role of the privileged short-lived agents that author new plugins.
pub const TOOL_FORGER_ROLE: &str = "Tool Forging Agent";

/// Sender id used for orchestrator-originated mailbox messages.
pub const SYSTEM_SENDER: &str = "AOS_SYSTEM";

/// Fraction of the initial budget granted to a forging agent.
const FORGER_BUDGET_SHARE: f64 = 0.2;

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const PROGRESS_REPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Errors raised while admitting an agent.
#[derive(Debug)]
pub enum SpawnError {
    /// The global agent cap is already reached.
    MaxAgentsReached,
    Ledger(LedgerError),
    Io(String),
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::MaxAgentsReached => {
                write!(f, "Maximum number of agents has been reached")
            }
            SpawnError::Ledger(e) => write!(f, "Ledger error during spawn: {}", e),
            SpawnError::Io(msg) => write!(f, "I/O error during spawn: {}", msg),
        }
    }
}

impl Error for SpawnError {}

/// Final per-agent summary in the simulation report.
#[derive(Debug, Clone, Serialize)]
pub struct AgentReport {
    pub state: String,
    pub role: String,
    pub parent: Option<String>,
    pub subagents: Vec<String>,
    pub final_balance: f64,
}

/// What a finished simulation looked like.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub total_agents: usize,
    pub agent_states: HashMap<String, AgentReport>,
    pub hierarchy: HashMap<String, Vec<String>>,
    pub total_cost: f64,
}

/// Supervisor of the agent population.
pub struct Orchestrator {
    config: SystemConfig,
    ledger: Arc<Ledger>,
    llm: Arc<dyn LlmClient>,
    events: EventBus,
    /// Back-reference handed to agents and toolboxes, set at construction.
    self_ref: Weak<Orchestrator>,
    agents: RwLock<HashMap<String, Arc<Agent>>>,
    /// Agent ids in admission order, for stable snapshots and reports.
    admission_order: Mutex<Vec<String>>,
    mailboxes: Mailboxes,
    running: Mutex<HashMap<String, JoinHandle<()>>>,
    /// In-flight forge requests, keyed by requester id.
    pending_tool_requests: Mutex<HashMap<String, String>>,
    admission: Mutex<()>,
    started_at: Mutex<Option<Instant>>,
}

impl Orchestrator {
    pub fn new(config: SystemConfig, ledger: Arc<Ledger>, llm: Arc<dyn LlmClient>) -> Arc<Self> {
        log::info!(target: "aos::orchestrator", "Orchestrator initialized");
        Arc::new_cyclic(|self_ref| Self {
            config,
            ledger,
            llm,
            events: EventBus::new(),
            self_ref: self_ref.clone(),
            agents: RwLock::new(HashMap::new()),
            admission_order: Mutex::new(Vec::new()),
            mailboxes: Mailboxes::new(),
            running: Mutex::new(HashMap::new()),
            pending_tool_requests: Mutex::new(HashMap::new()),
            admission: Mutex::new(()),
            started_at: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ---- Admission ----

    /// Spawn the root agent for `objective`.
    pub async fn spawn_founder(
        &self,
        objective: &str,
        budget: f64,
    ) -> Result<String, SpawnError> {
        log::info!(
            target: "aos::orchestrator",
            "Spawning founder agent with objective: '{}'",
            objective
        );
        let config = AgentConfig {
            role: FOUNDER_ROLE.to_string(),
            task: format!(
                "Oversee the project to achieve the primary objective: {}",
                objective
            ),
            budget,
            parent_id: None,
            max_subagents: self.config.max_agents.saturating_sub(1),
            completion_criteria: None,
            price_per_1m_input_tokens: self.config.price_per_1m_input_tokens,
            price_per_1m_output_tokens: self.config.price_per_1m_output_tokens,
            spawn_cost: self.config.spawn_cost,
            tool_use_cost: self.config.tool_use_cost,
        };
        self.create_agent(config).await
    }

    /// Spawn a worker on behalf of a parent agent.
    pub async fn spawn_agent(
        &self,
        role: &str,
        task: &str,
        budget: f64,
        parent_id: Option<&str>,
        completion_criteria: Option<Value>,
    ) -> Result<String, SpawnError> {
        log::info!(
            target: "aos::orchestrator",
            "Spawning new agent. Role: {}, Parent: {:?}",
            role,
            parent_id
        );
        let config = AgentConfig {
            role: role.to_string(),
            task: task.to_string(),
            budget,
            parent_id: parent_id.map(str::to_string),
            max_subagents: 5,
            completion_criteria,
            price_per_1m_input_tokens: self.config.price_per_1m_input_tokens,
            price_per_1m_output_tokens: self.config.price_per_1m_output_tokens,
            spawn_cost: self.config.spawn_cost,
            tool_use_cost: self.config.tool_use_cost,
        };
        self.create_agent(config).await
    }

    /// Admit one agent: cap check, id, mailbox, workspace, toolbox,
    /// ledger account, registration, `agent_created` event, in that
    /// order, under the admission mutex.
    async fn create_agent(&self, config: AgentConfig) -> Result<String, SpawnError> {
        let _admission = self.admission.lock().await;

        {
            let agents = self.agents.read().await;
            if agents.len() >= self.config.max_agents {
                return Err(SpawnError::MaxAgentsReached);
            }
        }

        let agent_id = Uuid::new_v4().simple().to_string()[..8].to_string();

        // The mailbox exists before the agent can ever be scheduled, so
        // no message sent to it is lost.
        self.mailboxes.create(&agent_id).await;

        let workspace = self.config.agent_workspace(&agent_id);
        tokio::fs::create_dir_all(&workspace)
            .await
            .map_err(|e| SpawnError::Io(e.to_string()))?;

        // Forging agents see every tool: the disabled list is cleared
        // for their toolbox construction only, and they always get
        // messaging so they can report back.
        let is_forger = config.role == TOOL_FORGER_ROLE;
        let disabled_tools = if is_forger {
            Vec::new()
        } else {
            self.config.disabled_tools.clone()
        };
        let messaging_enabled = self.config.capabilities.messaging || is_forger;

        let toolbox = Arc::new(Toolbox::new(
            workspace.clone(),
            self.config.delivery_path(),
            self.config.plugins_dir.clone(),
            disabled_tools,
            messaging_enabled,
            self.self_ref.clone(),
        ));
        toolbox.initialize().await;

        let agent = Arc::new(Agent::new(
            agent_id.clone(),
            config.clone(),
            self.ledger.clone(),
            toolbox,
            self.self_ref.clone(),
            self.llm.clone(),
            self.config.llm.clone(),
            self.config.capabilities.clone(),
            self.events.clone(),
        ));

        self.ledger
            .create_account(&agent_id, config.budget)
            .await
            .map_err(SpawnError::Ledger)?;

        {
            let mut agents = self.agents.write().await;
            agents.insert(agent_id.clone(), agent);
        }
        self.admission_order.lock().await.push(agent_id.clone());

        self.events.emit(VisualizerEvent::AgentCreated {
            node: GraphNode {
                id: agent_id.clone(),
                label: config.role.clone(),
                title: format!("{} ({})", config.role, agent_id),
                state: AgentState::Active.as_str().to_string(),
            },
            edge: config.parent_id.as_ref().map(|parent_id| GraphEdge {
                from: parent_id.clone(),
                to: agent_id.clone(),
            }),
        });

        log::info!(
            target: "aos::orchestrator",
            "Agent {} ({}) created with workspace '{}'",
            agent_id,
            config.role,
            workspace.display()
        );
        Ok(agent_id)
    }

    // ---- Lookups ----

    pub async fn agent(&self, agent_id: &str) -> Option<Arc<Agent>> {
        let agents = self.agents.read().await;
        agents.get(agent_id).cloned()
    }

    pub async fn agent_state(&self, agent_id: &str) -> Option<AgentState> {
        let agent = self.agent(agent_id).await?;
        Some(agent.state().await)
    }

    pub async fn agent_count(&self) -> usize {
        let agents = self.agents.read().await;
        agents.len()
    }

    /// Current hierarchy graph, for the visualizer's `full_sync`.
    pub async fn graph_snapshot(&self) -> (Vec<GraphNode>, Vec<GraphEdge>) {
        let order = self.admission_order.lock().await.clone();
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for agent_id in order {
            if let Some(agent) = self.agent(&agent_id).await {
                nodes.push(GraphNode {
                    id: agent.id.clone(),
                    label: agent.config.role.clone(),
                    title: format!("{} ({})", agent.config.role, agent.id),
                    state: agent.state().await.as_str().to_string(),
                });
                if let Some(parent_id) = &agent.config.parent_id {
                    edges.push(GraphEdge {
                        from: parent_id.clone(),
                        to: agent.id.clone(),
                    });
                }
            }
        }
        (nodes, edges)
    }

    // ---- Messaging ----

    /// Route a message into the recipient's mailbox (per-sender FIFO).
    pub async fn send_message(&self, from: &str, to: &str, content: Value) -> bool {
        self.mailboxes.send(from, to, content).await
    }

    /// Drain every message queued for `agent_id`.
    pub async fn get_messages(&self, agent_id: &str) -> Vec<AgentMessage> {
        self.mailboxes.drain(agent_id).await
    }

    // ---- Event loop ----

    /// Run the supervisor loop until every agent is terminal or the
    /// simulation times out, then shut down and collect results.
    pub async fn run(&self) -> SimulationReport {
        log::info!(target: "aos::orchestrator", "Starting orchestrator event loop...");
        let start = {
            let mut started_at = self.started_at.lock().await;
            *started_at.get_or_insert_with(Instant::now)
        };
        let mut last_progress_report = Instant::now();

        loop {
            self.process_system_events().await;
            self.start_new_agent_tasks().await;
            self.reap_finished_tasks().await;

            if self.all_agents_terminal().await {
                log::info!(
                    target: "aos::orchestrator",
                    "All agent tasks have completed. Exiting orchestrator loop."
                );
                break;
            }
            if start.elapsed() > self.config.simulation_timeout {
                log::warn!(
                    target: "aos::orchestrator",
                    "System-wide timeout reached. Shutting down."
                );
                break;
            }
            if last_progress_report.elapsed() > PROGRESS_REPORT_INTERVAL {
                self.report_progress().await;
                last_progress_report = Instant::now();
            }
            tokio::time::sleep(TICK_INTERVAL).await;
        }

        self.cancel_running_tasks().await;
        log::info!(
            target: "aos::orchestrator",
            "Orchestrator event loop finished. Collecting results."
        );
        self.collect_results().await
    }

    async fn all_agents_terminal(&self) -> bool {
        let agents: Vec<Arc<Agent>> = {
            let agents = self.agents.read().await;
            agents.values().cloned().collect()
        };
        if agents.is_empty() {
            return false;
        }
        for agent in agents {
            if agent.state().await == AgentState::Active {
                return false;
            }
        }
        true
    }

    async fn start_new_agent_tasks(&self) {
        let agents: Vec<(String, Arc<Agent>)> = {
            let agents = self.agents.read().await;
            agents
                .iter()
                .map(|(id, agent)| (id.clone(), agent.clone()))
                .collect()
        };
        let mut running = self.running.lock().await;
        for (agent_id, agent) in agents {
            if running.contains_key(&agent_id) {
                continue;
            }
            if agent.state().await != AgentState::Active {
                continue;
            }
            log::info!(
                target: "aos::orchestrator",
                "Starting task for newly spawned agent: {}",
                agent_id
            );
            let handle = tokio::spawn(async move {
                agent.run().await;
            });
            running.insert(agent_id, handle);
        }
    }

    /// Join finished tasks; a panicked agent is marked `Failed`.
    async fn reap_finished_tasks(&self) {
        let finished: Vec<(String, JoinHandle<()>)> = {
            let mut running = self.running.lock().await;
            let ids: Vec<String> = running
                .iter()
                .filter(|(_, handle)| handle.is_finished())
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| running.remove(&id).map(|handle| (id, handle)))
                .collect()
        };
        for (agent_id, handle) in finished {
            if let Err(join_error) = handle.await {
                if join_error.is_panic() {
                    log::error!(
                        target: "aos::orchestrator",
                        "Agent {} crashed with an unhandled panic",
                        agent_id
                    );
                    if let Some(agent) = self.agent(&agent_id).await {
                        agent.set_state(AgentState::Failed).await;
                    }
                }
            }
        }
    }

    async fn report_progress(&self) {
        let agents: Vec<Arc<Agent>> = {
            let agents = self.agents.read().await;
            agents.values().cloned().collect()
        };
        let total = agents.len();
        let mut active = 0;
        for agent in agents {
            if agent.state().await == AgentState::Active {
                active += 1;
            }
        }
        let total_cost = self.ledger.total_expenditure().await;
        log::info!(
            target: "aos::orchestrator",
            "Progress Report - Active Agents: {}, Total Agents: {}, Total Cost: ${:.4}",
            active,
            total,
            total_cost
        );
    }

    /// Cancel whatever still runs, join within the shutdown timeout, and
    /// mark any agent still `Active` as `Failed`.
    async fn cancel_running_tasks(&self) {
        let handles: Vec<(String, JoinHandle<()>)> = {
            let mut running = self.running.lock().await;
            running.drain().collect()
        };
        let pending: Vec<JoinHandle<()>> = handles
            .into_iter()
            .map(|(agent_id, handle)| {
                if !handle.is_finished() {
                    log::warn!(
                        target: "aos::orchestrator",
                        "Cancelling task of agent {}",
                        agent_id
                    );
                    handle.abort();
                }
                handle
            })
            .collect();
        if !pending.is_empty() {
            let join_all = futures_util::future::join_all(pending);
            if tokio::time::timeout(self.config.shutdown_timeout, join_all)
                .await
                .is_err()
            {
                log::warn!(
                    target: "aos::orchestrator",
                    "Some tasks did not cancel gracefully within the timeout."
                );
            }
        }

        let agents: Vec<Arc<Agent>> = {
            let agents = self.agents.read().await;
            agents.values().cloned().collect()
        };
        for agent in agents {
            if agent.state().await == AgentState::Active {
                agent.set_state(AgentState::Failed).await;
            }
        }
    }

    /// Cancel running tasks without collecting results.  Used by the
    /// bootstrap teardown path.
    pub async fn shutdown(&self) {
        log::info!(target: "aos::orchestrator", "Shutting down orchestrator...");
        self.cancel_running_tasks().await;
        log::info!(target: "aos::orchestrator", "Orchestrator shutdown complete");
    }

    // ---- System events ----

    /// One pass over every mailbox: consume tool-creation reports from
    /// forging agents, deploy the plugins they announce, and restore all
    /// other messages in their original order.
    pub async fn process_system_events(&self) {
        for owner in self.mailboxes.owners().await {
            let messages = self.mailboxes.drain(&owner).await;
            if messages.is_empty() {
                continue;
            }
            let mut kept = Vec::new();
            let mut reports = Vec::new();
            for message in messages {
                if self.is_system_message(&message).await {
                    reports.push(message);
                } else {
                    kept.push(message);
                }
            }
            self.mailboxes.reinsert_front(&owner, kept).await;
            for report in reports {
                self.handle_tool_creation_report(report).await;
            }
        }
    }

    /// A message is a system event iff its sender is a forging agent and
    /// it carries a successful tool-creation status.
    async fn is_system_message(&self, message: &AgentMessage) -> bool {
        if message.content["status"] != "tool_creation_success" {
            return false;
        }
        match self.agent(&message.from).await {
            Some(sender) => sender.config.role == TOOL_FORGER_ROLE,
            None => false,
        }
    }

    async fn handle_tool_creation_report(&self, message: AgentMessage) {
        let forger_id = message.from.clone();
        let tool_path = match message.content["tool_code_path"].as_str() {
            Some(tool_path) => tool_path.to_string(),
            None => {
                log::warn!(
                    target: "aos::orchestrator",
                    "Forger {} reported success without a tool_code_path",
                    forger_id
                );
                return;
            }
        };
        let requester = self
            .agent(&forger_id)
            .await
            .and_then(|forger| forger.config.parent_id.clone());

        self.deploy_new_tool(&forger_id, requester.as_deref(), &tool_path, &message.content)
            .await;

        if let Some(forger) = self.agent(&forger_id).await {
            forger.set_state(AgentState::Completed).await;
        }
    }

    /// Copy a forged tool out of the forger's workspace into the plugins
    /// directory, write its manifest, refresh every toolbox, and notify
    /// the requester.
    async fn deploy_new_tool(
        &self,
        forger_id: &str,
        requester: Option<&str>,
        tool_path: &str,
        content: &Value,
    ) {
        let workspace = self.config.agent_workspace(forger_id);
        let source = match resolve_in_workspace(&workspace, tool_path) {
            Ok(source) => source,
            Err(message) => {
                log::error!(
                    target: "aos::orchestrator",
                    "Refusing to deploy tool from forger {}: {}",
                    forger_id,
                    message
                );
                return;
            }
        };
        let stem = Path::new(tool_path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "tool".to_string());
        let plugin_file = format!("generated_{}_{}.py", stem, forger_id);

        if let Err(e) = tokio::fs::create_dir_all(&self.config.plugins_dir).await {
            log::error!(
                target: "aos::orchestrator",
                "Cannot create plugins directory: {}",
                e
            );
            return;
        }
        if let Err(e) = tokio::fs::copy(&source, self.config.plugins_dir.join(&plugin_file)).await
        {
            log::error!(
                target: "aos::orchestrator",
                "Failed to deploy tool from forger {}: {}",
                forger_id,
                e
            );
            return;
        }

        let tool_name = content["tool_name"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| stem.clone());
        let manifest = PluginManifest {
            name: tool_name.clone(),
            description: content["description"]
                .as_str()
                .unwrap_or("Generated tool.")
                .to_string(),
            entrypoint: plugin_file,
            schema: content.get("schema").cloned(),
        };
        let manifest_path = self
            .config
            .plugins_dir
            .join(format!("generated_{}_{}.json", stem, forger_id));
        match serde_json::to_string_pretty(&manifest) {
            Ok(rendered) => {
                if let Err(e) = tokio::fs::write(&manifest_path, rendered).await {
                    log::error!(
                        target: "aos::orchestrator",
                        "Failed to write plugin manifest: {}",
                        e
                    );
                    return;
                }
            }
            Err(e) => {
                log::error!(
                    target: "aos::orchestrator",
                    "Failed to serialize plugin manifest: {}",
                    e
                );
                return;
            }
        }

        // Every toolbox re-scans the plugins directory so the new tool is
        // visible to all agents before the next tick.
        let agents: Vec<Arc<Agent>> = {
            let agents = self.agents.read().await;
            agents.values().cloned().collect()
        };
        for agent in agents {
            agent.toolbox().refresh().await;
        }

        if let Some(requester) = requester {
            self.pending_tool_requests.lock().await.remove(requester);
            self.send_message(
                SYSTEM_SENDER,
                requester,
                json!({"status": "tool_request_fulfilled", "tool_name": tool_name}),
            )
            .await;
        }
        log::info!(
            target: "aos::orchestrator",
            "Deployed new tool '{}' forged by agent {}",
            tool_name,
            forger_id
        );
    }

    // ---- Tool-creation requests ----

    /// Is a forge request currently pending for `requester_id`?
    pub async fn has_pending_tool_request(&self, requester_id: &str) -> bool {
        let pending = self.pending_tool_requests.lock().await;
        pending.contains_key(requester_id)
    }

    /// Handle a `REQUEST_NEW_TOOL` from an agent: register the request
    /// and spawn a Tool Forging Agent as the requester's child.
    pub async fn handle_tool_request(&self, requester_id: &str, description: &str) {
        if !self.config.capabilities.tool_creation {
            self.send_message(
                SYSTEM_SENDER,
                requester_id,
                json!({
                    "status": "tool_request_denied",
                    "reason": "Tool creation capability is disabled.",
                }),
            )
            .await;
            return;
        }
        {
            let mut pending = self.pending_tool_requests.lock().await;
            if pending.contains_key(requester_id) {
                drop(pending);
                self.send_message(
                    SYSTEM_SENDER,
                    requester_id,
                    json!({"status": "tool_request_duplicate"}),
                )
                .await;
                return;
            }
            pending.insert(requester_id.to_string(), description.to_string());
        }

        // The forging prompt enumerates every tool, ignoring the
        // disabled list, since the forger's own toolbox will too.
        let catalogue = Toolbox::new(
            self.config.workspace_path(),
            self.config.delivery_path(),
            self.config.plugins_dir.clone(),
            Vec::new(),
            true,
            self.self_ref.clone(),
        );
        catalogue.initialize().await;
        let tools = catalogue.tools_for_prompt().await;
        let tools_formatted =
            serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string());

        let task = prompts::tool_forging_task(description, &tools_formatted);
        let budget = FORGER_BUDGET_SHARE * self.config.initial_budget;
        match self
            .spawn_agent(TOOL_FORGER_ROLE, &task, budget, Some(requester_id), None)
            .await
        {
            Ok(forger_id) => {
                log::info!(
                    target: "aos::orchestrator",
                    "Spawned forging agent {} for requester {}",
                    forger_id,
                    requester_id
                );
            }
            Err(e) => {
                log::warn!(
                    target: "aos::orchestrator",
                    "Could not spawn forging agent for {}: {}",
                    requester_id,
                    e
                );
                self.pending_tool_requests.lock().await.remove(requester_id);
                self.send_message(
                    SYSTEM_SENDER,
                    requester_id,
                    json!({"status": "tool_request_denied", "reason": e.to_string()}),
                )
                .await;
            }
        }
    }

    // ---- Results ----

    /// Final snapshot: per-agent states, the parent→children hierarchy,
    /// and the total spend.
    pub async fn collect_results(&self) -> SimulationReport {
        let order = self.admission_order.lock().await.clone();
        let mut agent_states = HashMap::new();
        let mut hierarchy: HashMap<String, Vec<String>> = HashMap::new();
        for agent_id in &order {
            if let Some(agent) = self.agent(agent_id).await {
                agent_states.insert(
                    agent_id.clone(),
                    AgentReport {
                        state: agent.state().await.as_str().to_string(),
                        role: agent.config.role.clone(),
                        parent: agent.config.parent_id.clone(),
                        subagents: agent.subagents().await,
                        final_balance: self.ledger.balance(agent_id).await,
                    },
                );
                if let Some(parent_id) = &agent.config.parent_id {
                    hierarchy
                        .entry(parent_id.clone())
                        .or_default()
                        .push(agent_id.clone());
                }
            }
        }
        SimulationReport {
            total_agents: order.len(),
            agent_states,
            hierarchy,
            total_cost: self.ledger.total_expenditure().await,
        }
    }
}
