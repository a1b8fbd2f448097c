//! Agent Execution Engine
//!
//! An [`Agent`] is a single reasoning loop with its own budget, workspace,
//! toolbox, and mailbox.  The engine has two modes:
//!
//! - The **founder** (the one agent with no parent) creates a plan of
//!   DELEGATE steps, then dispatches them in order: step N starts only
//!   after step N−1's child has reached a terminal state.  Waiting costs
//!   no think cycles.
//! - **Workers** run a think/act loop: drain the mailbox, prompt the LLM,
//!   pay for the tokens, parse the response into an [`Action`], and
//!   dispatch it.  A worker whose completion criteria match a recorded
//!   result delivers its artefacts and completes.
//!
//! Every recoverable failure (parse error, tool error, denied charge
//! outside of thinking) counts against the consecutive-error budget;
//! exhausting it fails the agent but never the system.  A denied charge
//! for thinking itself is bankruptcy: the agent dies.

use crate::agentos::config::{Capabilities, LlmConfig};
use crate::agentos::events::{EventBus, VisualizerEvent};
use crate::agentos::ledger::{Ledger, TransactionKind};
use crate::agentos::llm::LlmClient;
use crate::agentos::orchestrator::{Orchestrator, SpawnError};
use crate::agentos::prompts;
use crate::agentos::toolbox::Toolbox;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Recoverable failures tolerated before an agent is failed.
pub const MAX_CONSECUTIVE_ERRORS: usize = 3;

/// Fraction of the spendable balance granted to a delegated child.
const DELEGATION_SHARE: f64 = 0.75;

/// How long the founder sleeps between dispatch checks (no think cost).
const FOUNDER_WAIT: Duration = Duration::from_secs(2);

/// Pause between loop iterations so sibling tasks get scheduled.
const LOOP_PAUSE: Duration = Duration::from_millis(100);

/// File extensions picked up by the automatic delivery hook.
const DELIVERABLE_EXTENSIONS: &[&str] =
    &[".html", ".css", ".js", ".py", ".txt", ".json", ".xml"];

/// Lifecycle states.  `Completed`, `Failed`, and `Dead` are sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Active,
    Completed,
    Failed,
    /// Bankrupt: a debit required to keep thinking was denied.
    Dead,
}

impl AgentState {
    pub fn is_terminal(self) -> bool {
        self != AgentState::Active
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentState::Active => "active",
            AgentState::Completed => "completed",
            AgentState::Failed => "failed",
            AgentState::Dead => "dead",
        }
    }
}

/// Immutable per-agent configuration, fixed at admission.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub role: String,
    pub task: String,
    pub budget: f64,
    pub parent_id: Option<String>,
    pub max_subagents: usize,
    /// `{action, tool, parameters}` record whose presence in the result
    /// history implies the worker's task is done.
    pub completion_criteria: Option<Value>,
    pub price_per_1m_input_tokens: f64,
    pub price_per_1m_output_tokens: f64,
    pub spawn_cost: f64,
    pub tool_use_cost: f64,
}

/// One parsed LLM decision.
///
/// The raw response text is parsed exactly once into this variant; the
/// original string is kept alongside for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Delegate {
        role: String,
        task: String,
        completion_criteria: Option<Value>,
        step_index: Option<usize>,
    },
    UseTool {
        tool: String,
        parameters: Value,
    },
    RequestNewTool {
        description: String,
    },
    Complete,
    Fail,
    ParseError {
        raw: String,
        message: String,
    },
}

impl Action {
    fn kind(&self) -> &'static str {
        match self {
            Action::Delegate { .. } => "DELEGATE",
            Action::UseTool { .. } => "USE_TOOL",
            Action::RequestNewTool { .. } => "REQUEST_NEW_TOOL",
            Action::Complete => "COMPLETE",
            Action::Fail => "FAIL",
            Action::ParseError { .. } => "ERROR",
        }
    }
}

/// One step of the founder's plan, as parsed from the planning response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub action: String,
    pub details: PlanStepDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStepDetails {
    pub role: String,
    pub task: String,
    #[serde(default)]
    pub completion_criteria: Option<Value>,
}

/// Scan `text` for the outermost `{…}` and parse it.
///
/// LLMs routinely wrap their JSON in prose; taking the first `{` to the
/// last `}` recovers the object in the common cases without a full
/// grammar.
pub fn extract_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Tolerantly parse an LLM response into an [`Action`].
///
/// `action` is matched case-insensitively; `tool` may be a string or an
/// object carrying `name`; `parameters` may live at the top level or
/// under `details`.
pub fn parse_action(thought: &str) -> Action {
    let value = match extract_json(thought) {
        Some(value) => value,
        None => {
            return Action::ParseError {
                raw: thought.to_string(),
                message: "No JSON object found".to_string(),
            }
        }
    };
    let action_type = value["action"].as_str().unwrap_or("").to_lowercase();
    let details = value.get("details").cloned().unwrap_or_else(|| json!({}));
    let tool = match value.get("tool") {
        Some(Value::String(name)) => Some(name.clone()),
        Some(Value::Object(object)) => object
            .get("name")
            .and_then(|name| name.as_str())
            .map(str::to_string),
        _ => None,
    };
    let parameters = value
        .get("parameters")
        .cloned()
        .filter(|parameters| !parameters.is_null())
        .or_else(|| {
            details
                .get("parameters")
                .cloned()
                .filter(|parameters| !parameters.is_null())
        })
        .unwrap_or_else(|| json!({}));

    match action_type.as_str() {
        "use_tool" => Action::UseTool {
            tool: tool.unwrap_or_default(),
            parameters,
        },
        "delegate" => Action::Delegate {
            role: details["role"].as_str().unwrap_or("Specialist").to_string(),
            task: details["task"]
                .as_str()
                .unwrap_or("Complete assigned sub-task.")
                .to_string(),
            completion_criteria: details
                .get("completion_criteria")
                .cloned()
                .filter(|criteria| !criteria.is_null()),
            step_index: details["step_index"].as_u64().map(|index| index as usize),
        },
        "request_new_tool" => Action::RequestNewTool {
            description: details["description"].as_str().unwrap_or("").to_string(),
        },
        "complete" => Action::Complete,
        "fail" => Action::Fail,
        other => Action::ParseError {
            raw: thought.to_string(),
            message: format!("Unknown action type: {}", other),
        },
    }
}

/// A single reasoning loop with its own budget, workspace, and mailbox.
pub struct Agent {
    pub id: String,
    pub config: AgentConfig,
    ledger: Arc<Ledger>,
    toolbox: Arc<Toolbox>,
    orchestrator: Weak<Orchestrator>,
    llm: Arc<dyn LlmClient>,
    llm_cfg: LlmConfig,
    capabilities: Capabilities,
    events: EventBus,

    state: RwLock<AgentState>,
    subagents: Mutex<Vec<String>>,
    delegated_tasks: Mutex<HashMap<String, usize>>,
    step_artifacts: Mutex<HashMap<usize, Value>>,
    thoughts: Mutex<Vec<String>>,
    results: Mutex<Vec<Value>>,
    consecutive_errors: AtomicUsize,
    plan: Mutex<Vec<PlanStep>>,
    plan_created: AtomicBool,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        config: AgentConfig,
        ledger: Arc<Ledger>,
        toolbox: Arc<Toolbox>,
        orchestrator: Weak<Orchestrator>,
        llm: Arc<dyn LlmClient>,
        llm_cfg: LlmConfig,
        capabilities: Capabilities,
        events: EventBus,
    ) -> Self {
        Self {
            id,
            config,
            ledger,
            toolbox,
            orchestrator,
            llm,
            llm_cfg,
            capabilities,
            events,
            state: RwLock::new(AgentState::Active),
            subagents: Mutex::new(Vec::new()),
            delegated_tasks: Mutex::new(HashMap::new()),
            step_artifacts: Mutex::new(HashMap::new()),
            thoughts: Mutex::new(Vec::new()),
            results: Mutex::new(Vec::new()),
            consecutive_errors: AtomicUsize::new(0),
            plan: Mutex::new(Vec::new()),
            plan_created: AtomicBool::new(false),
        }
    }

    /// The founder is the one agent without a parent.
    pub fn is_founder(&self) -> bool {
        self.config.parent_id.is_none()
    }

    pub fn toolbox(&self) -> &Arc<Toolbox> {
        &self.toolbox
    }

    pub async fn state(&self) -> AgentState {
        *self.state.read().await
    }

    /// Transition to `next`.  Terminal states are sticky; a state change
    /// is broadcast to visualizer clients.
    pub async fn set_state(&self, next: AgentState) {
        {
            let mut state = self.state.write().await;
            if state.is_terminal() || *state == next {
                return;
            }
            *state = next;
        }
        log::info!(
            target: "aos::agent",
            "Agent {} ({}) transitioned to {}",
            self.id,
            self.config.role,
            next.as_str()
        );
        self.events.emit(VisualizerEvent::AgentStateChanged {
            id: self.id.clone(),
            state: next.as_str().to_string(),
        });
    }

    pub async fn subagents(&self) -> Vec<String> {
        self.subagents.lock().await.clone()
    }

    pub async fn thoughts(&self) -> Vec<String> {
        self.thoughts.lock().await.clone()
    }

    pub async fn results(&self) -> Vec<Value> {
        self.results.lock().await.clone()
    }

    fn orch(&self) -> Option<Arc<Orchestrator>> {
        self.orchestrator.upgrade()
    }

    /// Main execution loop: plan+dispatch for the founder, think/act for
    /// workers.  Returns when the agent leaves `Active`.
    pub async fn run(&self) {
        log::info!(
            target: "aos::agent",
            "Agent {} ({}) starting main execution loop",
            self.id,
            self.config.role
        );

        if self.is_founder() && !self.plan_created.load(Ordering::SeqCst) {
            self.create_plan().await;
            if self.state().await != AgentState::Active {
                log::warn!(
                    target: "aos::agent",
                    "Agent {}: plan creation failed. Halting execution.",
                    self.id
                );
                return;
            }
        }

        while self.state().await == AgentState::Active {
            let result = if self.is_founder() {
                match self.next_action_from_plan().await {
                    Some(action) => {
                        let raw = format!("plan step dispatch: {}", action.kind());
                        Some(self.perform(action, &raw).await)
                    }
                    None => {
                        tokio::time::sleep(FOUNDER_WAIT).await;
                        continue;
                    }
                }
            } else {
                let context = self.recent_history().await;
                let thought = self.think(&context).await;
                if self.state().await != AgentState::Active {
                    break;
                }
                Some(self.act(&thought).await)
            };

            if let Some(result) = result {
                self.record_result(result).await;
            }

            if !self.is_founder() && self.is_task_complete().await {
                self.deliver_files().await;
                self.set_state(AgentState::Completed).await;
            }

            tokio::time::sleep(LOOP_PAUSE).await;
        }

        log::info!(
            target: "aos::agent",
            "Agent {} finished execution with state: {}",
            self.id,
            self.state().await.as_str()
        );
    }

    async fn recent_history(&self) -> String {
        let results = self.results.lock().await;
        if results.is_empty() {
            return "This is your first action.".to_string();
        }
        let tail_start = results.len().saturating_sub(3);
        let tail = &results[tail_start..];
        format!(
            "History of your previous actions and their results: {}",
            serde_json::to_string(tail).unwrap_or_else(|_| "[]".to_string())
        )
    }

    /// Append a result and update the consecutive-error budget.
    async fn record_result(&self, result: Value) {
        let is_error = result.get("error").is_some();
        if is_error {
            log::error!(
                target: "aos::agent",
                "Agent {} action error: {}",
                self.id,
                result["error"]
            );
            let errors = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
            if errors >= MAX_CONSECUTIVE_ERRORS {
                self.set_state(AgentState::Failed).await;
            }
        } else {
            self.consecutive_errors.store(0, Ordering::SeqCst);
        }
        self.results.lock().await.push(result);
    }

    /// Charge this agent for one LLM round trip.  Returns `false` when
    /// the charge was denied and the agent is now dead.
    async fn pay_for_tokens(&self, input_tokens: usize, output_tokens: usize) -> bool {
        let cost = (input_tokens as f64 / 1_000_000.0) * self.config.price_per_1m_input_tokens
            + (output_tokens as f64 / 1_000_000.0) * self.config.price_per_1m_output_tokens;
        if cost <= 0.0 {
            return true;
        }
        match self
            .ledger
            .charge(&self.id, cost, TransactionKind::ApiCall, "LLM API usage")
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                self.set_state(AgentState::Dead).await;
                false
            }
            Err(e) => {
                log::error!(target: "aos::agent", "Agent {} ledger misuse: {}", self.id, e);
                false
            }
        }
    }

    /// One reasoning step: check funds, build the prompt, call the LLM,
    /// pay for the tokens, and record the thought.
    pub async fn think(&self, context: &str) -> String {
        log::debug!(target: "aos::agent", "Agent {} thinking...", self.id);
        let balance = self.ledger.balance(&self.id).await;
        if balance <= 0.0 {
            self.set_state(AgentState::Dead).await;
            return "Out of funds".to_string();
        }

        let prompt = self.build_prompt(context).await;
        let (text, input_tokens, output_tokens) = self.llm.call(&prompt, &self.llm_cfg).await;
        if !self.pay_for_tokens(input_tokens, output_tokens).await {
            return "Out of funds after final API call".to_string();
        }

        if self.state().await != AgentState::Failed {
            self.thoughts.lock().await.push(text.clone());
        }
        text
    }

    /// Worker prompt: role, task, balance, history, tools, and any
    /// mailbox traffic since the last iteration.
    async fn build_prompt(&self, context: &str) -> String {
        let mut message_context = String::new();
        if self.capabilities.messaging {
            if let Some(orch) = self.orch() {
                let messages = orch.get_messages(&self.id).await;
                if !messages.is_empty() {
                    let formatted: Vec<String> = messages
                        .iter()
                        .map(|message| format!("- From {}: {}", message.from, message.content))
                        .collect();
                    message_context = format!(
                        "\n--- NEW MESSAGES ---\nYou have received the following messages:\n{}\n--- END OF MESSAGES ---\n",
                        formatted.join("\n")
                    );
                }
            }
        }
        let balance = self.ledger.balance(&self.id).await;
        let tools = self.toolbox.tools_for_prompt().await;
        let tools_formatted =
            serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string());
        prompts::worker_prompt(
            &self.config.role,
            &self.config.task,
            balance,
            context,
            &tools_formatted,
            self.config.parent_id.as_deref().unwrap_or("none"),
            &message_context,
        )
    }

    /// Parse a thought and dispatch the resulting action.
    pub async fn act(&self, thought: &str) -> Value {
        log::debug!(target: "aos::agent", "Agent {} acting...", self.id);
        let action = parse_action(thought);
        self.perform(action, thought).await
    }

    async fn perform(&self, action: Action, raw: &str) -> Value {
        log::info!(
            target: "aos::agent",
            "Agent {} decided action: {}",
            self.id,
            action.kind()
        );
        match action {
            Action::Delegate {
                role,
                task,
                completion_criteria,
                step_index,
            } => {
                self.delegate(&role, &task, completion_criteria, step_index)
                    .await
            }
            Action::UseTool { tool, parameters } => self.use_tool(&tool, parameters).await,
            Action::RequestNewTool { description } => self.request_new_tool(&description).await,
            Action::Complete => {
                if !self.is_founder() {
                    self.deliver_files().await;
                }
                self.set_state(AgentState::Completed).await;
                json!({"action": "complete"})
            }
            Action::Fail => {
                self.set_state(AgentState::Failed).await;
                json!({"error": raw})
            }
            Action::ParseError { raw, message } => {
                json!({"error": format!("JSON parse failed: {}. Raw: '{}'", message, raw)})
            }
        }
    }

    // ---- Founder: planning ----

    /// Charged one-shot LLM call used by the planning pipeline.  Returns
    /// `None` when the agent went bankrupt paying for it.
    async fn charged_call(&self, prompt: &str) -> Option<String> {
        let (text, input_tokens, output_tokens) = self.llm.call(prompt, &self.llm_cfg).await;
        if !self.pay_for_tokens(input_tokens, output_tokens).await {
            return None;
        }
        Some(text)
    }

    async fn generate_plan_draft(&self, refinement: Option<&str>) -> Option<Value> {
        let mut prompt = prompts::founder_planning_prompt(&self.config.task);
        if let Some(feedback) = refinement {
            prompt.push_str(&format!(
                "\n\nPlease refine the plan based on the following feedback: {}",
                feedback
            ));
        }
        let text = self.charged_call(&prompt).await?;
        extract_json(&text)
    }

    async fn validate_plan(&self, plan_json: &Value) -> Value {
        let rendered =
            serde_json::to_string_pretty(plan_json).unwrap_or_else(|_| plan_json.to_string());
        let prompt = prompts::architect_validation_prompt(&self.config.task, &rendered);
        match self.charged_call(&prompt).await.and_then(|t| extract_json(&t)) {
            Some(verdict) => verdict,
            None => json!({
                "is_valid": false,
                "reasoning": "Failed to get a valid validation response from architect.",
            }),
        }
    }

    /// Planning pipeline: draft, optional architect validation, one
    /// refinement attempt.  A founder with no valid plan is failed.
    async fn create_plan(&self) {
        log::info!(target: "aos::agent", "Founder {} is creating a project plan...", self.id);

        let initial = match self.generate_plan_draft(None).await {
            Some(value) => value,
            None => {
                self.set_state(AgentState::Failed).await;
                return;
            }
        };

        let mut final_plan = Some(initial.clone());
        if self.capabilities.advanced_planning {
            log::info!(target: "aos::agent", "Initiating advanced plan validation...");
            let verdict = self.validate_plan(&initial).await;
            if !verdict["is_valid"].as_bool().unwrap_or(false) {
                let reasoning = verdict["reasoning"]
                    .as_str()
                    .unwrap_or("No reasoning provided.")
                    .to_string();
                log::warn!(
                    target: "aos::agent",
                    "Plan deemed invalid. Reason: {}. Attempting to refine...",
                    reasoning
                );
                final_plan = self.generate_plan_draft(Some(&reasoning)).await;
            }
        }

        if let Some(plan_data) = final_plan {
            if let Ok(steps) =
                serde_json::from_value::<Vec<PlanStep>>(plan_data["plan"].clone())
            {
                let steps: Vec<PlanStep> = steps
                    .into_iter()
                    .filter(|step| step.action.eq_ignore_ascii_case("DELEGATE"))
                    .collect();
                if !steps.is_empty() {
                    log::info!(
                        target: "aos::agent",
                        "Final plan created with {} steps.",
                        steps.len()
                    );
                    *self.plan.lock().await = steps;
                    self.plan_created.store(true, Ordering::SeqCst);
                    return;
                }
            }
        }

        log::error!(target: "aos::agent", "Failed to create a valid final plan.");
        self.set_state(AgentState::Failed).await;
    }

    // ---- Founder: step dispatch ----

    /// Decide the founder's next move.
    ///
    /// Returns the delegation for the next runnable step, or `None` when
    /// the founder should keep waiting.  Completion is detected here:
    /// once every step is delegated and every child is terminal, the
    /// founder completes.
    async fn next_action_from_plan(&self) -> Option<Action> {
        if !self.plan_created.load(Ordering::SeqCst) {
            return None;
        }
        let orch = self.orch()?;

        // Record task_completed reports so later steps can inherit the
        // artifact lists of earlier ones.
        for message in orch.get_messages(&self.id).await {
            let step_index = {
                let delegated = self.delegated_tasks.lock().await;
                delegated.get(&message.from).copied()
            };
            if let Some(step_index) = step_index {
                if message.content["status"] == "task_completed" {
                    let artifacts = message
                        .content
                        .get("artifacts")
                        .cloned()
                        .unwrap_or_else(|| json!([]));
                    log::info!(
                        target: "aos::agent",
                        "Step {} confirmed complete by agent {} with artifacts: {}",
                        step_index + 1,
                        message.from,
                        artifacts
                    );
                    self.step_artifacts.lock().await.insert(step_index, artifacts);
                }
            }
        }

        let plan_len = self.plan.lock().await.len();
        let subagents = self.subagents.lock().await.clone();
        let next_step_index = subagents.len();

        if next_step_index >= plan_len {
            // Everything is delegated; wait out the stragglers.
            let mut all_done = true;
            for subagent_id in &subagents {
                match orch.agent_state(subagent_id).await {
                    Some(AgentState::Active) => {
                        all_done = false;
                        break;
                    }
                    _ => {}
                }
            }
            if all_done {
                log::info!(
                    target: "aos::agent",
                    "All plan steps delegated and all agents finished. Founder's task is complete."
                );
                self.set_state(AgentState::Completed).await;
            }
            return None;
        }

        if next_step_index > 0 {
            let previous_agent_id = &subagents[next_step_index - 1];
            if orch.agent_state(previous_agent_id).await == Some(AgentState::Active) {
                log::debug!(
                    target: "aos::agent",
                    "Waiting for agent {} (step {}) to complete.",
                    previous_agent_id,
                    next_step_index
                );
                return None;
            }
        }

        log::info!(
            target: "aos::agent",
            "Ready to execute step {} of the plan.",
            next_step_index + 1
        );
        let step = {
            let plan = self.plan.lock().await;
            plan[next_step_index].clone()
        };
        let mut task = step.details.task;
        if next_step_index > 0 {
            let artifacts = {
                let step_artifacts = self.step_artifacts.lock().await;
                step_artifacts.get(&(next_step_index - 1)).cloned()
            };
            if let Some(artifacts) = artifacts {
                task.push_str(&format!(
                    "\n\nCONTEXT FROM PREVIOUS STEP: Your colleague has produced the following artifacts: {}. You should use them as input.",
                    artifacts
                ));
            }
        }
        Some(Action::Delegate {
            role: step.details.role,
            task,
            completion_criteria: step.details.completion_criteria,
            step_index: Some(next_step_index),
        })
    }

    // ---- Actions ----

    /// Spawn a child agent, funding it with 75% of the spendable balance.
    ///
    /// The economic protocol is atomic from this agent's point of view:
    /// any partially applied debit is refunded on failure.
    pub async fn delegate(
        &self,
        role: &str,
        task: &str,
        completion_criteria: Option<Value>,
        step_index: Option<usize>,
    ) -> Value {
        let balance = self.ledger.balance(&self.id).await;
        if balance < self.config.spawn_cost {
            return json!({"error": "Insufficient funds for spawn cost."});
        }
        let allocation = (balance - self.config.spawn_cost) * DELEGATION_SHARE;

        if self.config.spawn_cost > 0.0 {
            match self
                .ledger
                .charge(
                    &self.id,
                    self.config.spawn_cost,
                    TransactionKind::SpawnAgent,
                    "Spawning sub-agent",
                )
                .await
            {
                Ok(true) => {}
                _ => return json!({"error": "Failed to complete delegation transaction."}),
            }
        }
        if allocation > 0.0 {
            match self
                .ledger
                .charge(
                    &self.id,
                    allocation,
                    TransactionKind::BudgetAllocation,
                    "Allocating budget",
                )
                .await
            {
                Ok(true) => {}
                _ => {
                    if self.config.spawn_cost > 0.0 {
                        let _ = self
                            .ledger
                            .credit(
                                &self.id,
                                self.config.spawn_cost,
                                TransactionKind::Refund,
                                "Refund for failed delegation.",
                            )
                            .await;
                    }
                    return json!({"error": "Failed to complete delegation transaction."});
                }
            }
        }

        let refund_total = self.config.spawn_cost + allocation;
        let orch = match self.orch() {
            Some(orch) => orch,
            None => {
                if refund_total > 0.0 {
                    let _ = self
                        .ledger
                        .credit(
                            &self.id,
                            refund_total,
                            TransactionKind::Refund,
                            "Refund for unexpected spawn failure.",
                        )
                        .await;
                }
                return json!({"error": "An unexpected error occurred during agent spawn."});
            }
        };

        match orch
            .spawn_agent(role, task, allocation, Some(self.id.as_str()), completion_criteria)
            .await
        {
            Ok(subagent_id) => {
                self.subagents.lock().await.push(subagent_id.clone());
                if let Some(index) = step_index {
                    self.delegated_tasks
                        .lock()
                        .await
                        .insert(subagent_id.clone(), index);
                }
                json!({
                    "action": "delegate",
                    "subagent_id": subagent_id,
                    "step_index": step_index,
                })
            }
            Err(SpawnError::MaxAgentsReached) => {
                log::warn!(
                    target: "aos::agent",
                    "Agent {} failed to spawn: agent cap reached",
                    self.id
                );
                if refund_total > 0.0 {
                    let _ = self
                        .ledger
                        .credit(
                            &self.id,
                            refund_total,
                            TransactionKind::Refund,
                            "Refund for max agents reached.",
                        )
                        .await;
                }
                json!({"error": "Maximum number of agents has been reached."})
            }
            Err(e) => {
                log::error!(
                    target: "aos::agent",
                    "Agent {}: unexpected error during agent spawn: {}",
                    self.id,
                    e
                );
                if refund_total > 0.0 {
                    let _ = self
                        .ledger
                        .credit(
                            &self.id,
                            refund_total,
                            TransactionKind::Refund,
                            "Refund for unexpected spawn failure.",
                        )
                        .await;
                }
                json!({
                    "error": "An unexpected error occurred during agent spawn.",
                    "details": e.to_string(),
                })
            }
        }
    }

    async fn use_tool(&self, tool: &str, parameters: Value) -> Value {
        if tool.is_empty() {
            return json!({"error": "No 'tool' name was specified."});
        }
        if self.config.tool_use_cost > 0.0 {
            match self
                .ledger
                .charge(
                    &self.id,
                    self.config.tool_use_cost,
                    TransactionKind::ToolUsage,
                    &format!("Using tool {}", tool),
                )
                .await
            {
                Ok(true) => {}
                _ => return json!({"error": "Insufficient funds for tool usage"}),
            }
        }
        let result = self
            .toolbox
            .execute(tool, parameters.clone(), &self.id)
            .await;
        json!({
            "action": "use_tool",
            "tool": tool,
            "parameters": parameters,
            "result": result,
        })
    }

    async fn request_new_tool(&self, description: &str) -> Value {
        if description.is_empty() {
            return json!({"error": "Tool description is required to request a new tool."});
        }
        log::info!(
            target: "aos::agent",
            "Agent {} requesting creation of a new tool: '{}'",
            self.id,
            description
        );
        match self.orch() {
            Some(orch) => {
                orch.handle_tool_request(&self.id, description).await;
                json!({
                    "action": "request_new_tool",
                    "status": "request_submitted",
                    "description": description,
                })
            }
            None => json!({"error": "Tool forging is unavailable."}),
        }
    }

    // ---- Completion ----

    /// Does any recorded non-error result satisfy the completion
    /// criteria?  Without criteria, two successful results are taken as
    /// done (the legacy behaviour).
    async fn is_task_complete(&self) -> bool {
        let criteria = match &self.config.completion_criteria {
            Some(criteria) => criteria.clone(),
            None => {
                let results = self.results.lock().await;
                return results
                    .iter()
                    .filter(|result| result.get("error").is_none())
                    .count()
                    >= 2;
            }
        };

        let wanted = json!({
            "action": criteria.get("action").cloned().unwrap_or(Value::Null),
            "tool": criteria.get("tool").cloned().unwrap_or(Value::Null),
            "parameters": criteria.get("parameters").cloned().unwrap_or_else(|| json!({})),
        });

        let results = self.results.lock().await;
        for result in results.iter().rev() {
            if result.get("error").is_some() {
                continue;
            }
            let taken = json!({
                "action": result.get("action").cloned().unwrap_or(Value::Null),
                "tool": result.get("tool").cloned().unwrap_or(Value::Null),
                "parameters": result.get("parameters").cloned().unwrap_or_else(|| json!({})),
            });
            if taken == wanted {
                log::info!(
                    target: "aos::agent",
                    "Agent {} completion criteria met: {}",
                    self.id,
                    criteria
                );
                return true;
            }
        }
        false
    }

    /// Copy finished artefacts to the delivery folder and report the
    /// list to the parent.
    async fn deliver_files(&self) {
        let listing = self
            .toolbox
            .execute(
                "file_manager",
                json!({"operation": "list", "path": "."}),
                &self.id,
            )
            .await;
        if listing["status"] != "success" {
            log::error!(
                target: "aos::agent",
                "Agent {} failed to list workspace files for delivery: {}",
                self.id,
                listing
            );
            return;
        }

        let mut delivered: Vec<Value> = Vec::new();
        for item in listing["items"].as_array().cloned().unwrap_or_default() {
            let filename = match item.as_str() {
                Some(filename) => filename.to_string(),
                None => continue,
            };
            if !DELIVERABLE_EXTENSIONS
                .iter()
                .any(|extension| filename.ends_with(extension))
            {
                continue;
            }
            let result = self
                .toolbox
                .execute(
                    "file_manager",
                    json!({
                        "operation": "copy_to_delivery",
                        "path": filename,
                        "delivery_name": filename,
                    }),
                    &self.id,
                )
                .await;
            if result["status"] == "success" {
                log::info!(
                    target: "aos::agent",
                    "Agent {} delivered {} to delivery folder",
                    self.id,
                    filename
                );
                delivered.push(json!(filename));
            } else {
                log::warn!(
                    target: "aos::agent",
                    "Agent {} failed to deliver {}: {}",
                    self.id,
                    filename,
                    result["error"]
                );
            }
        }

        if self.capabilities.messaging {
            if let (Some(parent_id), Some(orch)) = (&self.config.parent_id, self.orch()) {
                orch.send_message(
                    &self.id,
                    parent_id,
                    json!({"status": "task_completed", "artifacts": delivered}),
                )
                .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_action_reads_plain_json() {
        let action = parse_action(
            r#"{"reasoning": "...", "action": "USE_TOOL", "tool": "web_search", "parameters": {"query": "rust"}}"#,
        );
        assert_eq!(
            action,
            Action::UseTool {
                tool: "web_search".to_string(),
                parameters: json!({"query": "rust"}),
            }
        );
    }

    #[test]
    fn parse_action_recovers_json_wrapped_in_prose() {
        let action = parse_action(
            "Sure! Here is my decision:\n{\"action\": \"COMPLETE\"}\nLet me know if you need more.",
        );
        assert_eq!(action, Action::Complete);
    }

    #[test]
    fn parse_action_accepts_tool_objects_and_nested_parameters() {
        let action = parse_action(
            r#"{"action": "use_tool", "tool": {"name": "file_manager"}, "details": {"parameters": {"operation": "list"}}}"#,
        );
        assert_eq!(
            action,
            Action::UseTool {
                tool: "file_manager".to_string(),
                parameters: json!({"operation": "list"}),
            }
        );
    }

    #[test]
    fn parse_action_reads_delegation_details() {
        let action = parse_action(
            r#"{"action": "DELEGATE", "details": {"role": "QA Engineer", "task": "Test it", "step_index": 1}}"#,
        );
        match action {
            Action::Delegate {
                role,
                task,
                step_index,
                ..
            } => {
                assert_eq!(role, "QA Engineer");
                assert_eq!(task, "Test it");
                assert_eq!(step_index, Some(1));
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn parse_action_flags_garbage() {
        match parse_action("I could not decide on an action.") {
            Action::ParseError { raw, .. } => {
                assert!(raw.contains("could not decide"));
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn parse_action_flags_unknown_action_types() {
        match parse_action(r#"{"action": "PONDER"}"#) {
            Action::ParseError { message, .. } => {
                assert!(message.contains("PONDER") || message.contains("ponder"));
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn extract_json_requires_braces_in_order() {
        assert!(extract_json("} nope {").is_none());
        assert!(extract_json("no braces at all").is_none());
        assert_eq!(
            extract_json("prefix {\"a\": 1} suffix"),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn plan_steps_deserialize_with_optional_criteria() {
        let steps: Vec<PlanStep> = serde_json::from_value(json!([
            {"action": "DELEGATE", "details": {"role": "Dev", "task": "Build"}},
            {
                "action": "DELEGATE",
                "details": {
                    "role": "QA",
                    "task": "Verify",
                    "completion_criteria": {"action": "use_tool", "tool": "pytest_runner"},
                }
            }
        ]))
        .unwrap();
        assert_eq!(steps.len(), 2);
        assert!(steps[0].details.completion_criteria.is_none());
        assert!(steps[1].details.completion_criteria.is_some());
    }
}
