//! End-to-end simulation scenarios driven by a scripted LLM client.
//!
//! The scripted client routes on prompt markers: the founder's planning
//! and validation prompts get canned plans/verdicts, worker prompts get
//! canned actions.  Everything else (admission, the economy, mailboxes,
//! the supervisor loop) is the real system.

use agentos::agentos::config::LlmConfig;
use agentos::agentos::orchestrator::{Orchestrator, SpawnError, SYSTEM_SENDER, TOOL_FORGER_ROLE};
use agentos::{AgentState, Bootstrap, Ledger, LlmClient, SystemConfig};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Canned-response client: first matching prompt marker wins.
struct ScriptedLlm {
    rules: Vec<(&'static str, String)>,
    default: String,
}

impl ScriptedLlm {
    fn new(rules: Vec<(&'static str, String)>, default: String) -> Arc<Self> {
        Arc::new(Self { rules, default })
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn call(&self, prompt: &str, _cfg: &LlmConfig) -> (String, usize, usize) {
        for (marker, response) in &self.rules {
            if prompt.contains(marker) {
                return (response.clone(), 10, 5);
            }
        }
        (self.default.clone(), 10, 5)
    }
}

fn complete_action() -> String {
    json!({"reasoning": "Done.", "action": "COMPLETE"}).to_string()
}

fn test_config(base: &TempDir) -> SystemConfig {
    let mut config = SystemConfig::default();
    config.objective = "Test objective".to_string();
    config.output_base = base.path().join("output");
    config.plugins_dir = base.path().join("plugins");
    config.simulation_timeout = Duration::from_secs(60);
    config.shutdown_timeout = Duration::from_secs(2);
    config
}

// ---- Scenario: bankrupt worker ----

#[tokio::test]
async fn bankrupt_worker_dies_on_first_think() {
    let base = TempDir::new().unwrap();
    let config = test_config(&base);
    let llm = ScriptedLlm::new(Vec::new(), complete_action());
    let orchestrator = Orchestrator::new(config, Arc::new(Ledger::new()), llm);

    let worker_id = orchestrator
        .spawn_agent("Writer", "Write a file", 0.0, Some("parent0"), None)
        .await
        .unwrap();
    let worker = orchestrator.agent(&worker_id).await.unwrap();

    let thought = worker.think("").await;
    assert!(thought.contains("Out of funds"));
    assert_eq!(worker.state().await, AgentState::Dead);
}

// ---- Scenario: admission cap ----

#[tokio::test]
async fn admission_is_denied_beyond_the_agent_cap() {
    let base = TempDir::new().unwrap();
    let mut config = test_config(&base);
    config.max_agents = 1;
    let llm = ScriptedLlm::new(Vec::new(), complete_action());
    let orchestrator = Orchestrator::new(config, Arc::new(Ledger::new()), llm);

    orchestrator
        .spawn_founder("Small world", 10.0)
        .await
        .unwrap();
    assert_eq!(orchestrator.agent_count().await, 1);

    for _ in 0..3 {
        let denied = orchestrator
            .spawn_agent("Worker", "anything", 1.0, None, None)
            .await;
        assert!(matches!(denied, Err(SpawnError::MaxAgentsReached)));
    }
    assert_eq!(orchestrator.agent_count().await, 1);
}

// ---- Delegation economics ----

#[tokio::test]
async fn delegation_splits_the_budget_precisely() {
    let base = TempDir::new().unwrap();
    let config = test_config(&base);
    let spawn_cost = config.spawn_cost;
    let llm = ScriptedLlm::new(Vec::new(), complete_action());
    let orchestrator = Orchestrator::new(config, Arc::new(Ledger::new()), llm);

    let parent_id = orchestrator
        .spawn_agent("Manager", "Coordinate", 10.0, Some("parent0"), None)
        .await
        .unwrap();
    let parent = orchestrator.agent(&parent_id).await.unwrap();

    let result = parent.delegate("Helper", "Assist", None, None).await;
    assert!(result.get("error").is_none(), "delegation failed: {}", result);
    let child_id = result["subagent_id"].as_str().unwrap().to_string();

    let allocation = 0.75 * (10.0 - spawn_cost);
    let ledger = orchestrator.ledger();
    assert!((ledger.balance(&parent_id).await - (10.0 - spawn_cost - allocation)).abs() < 1e-9);
    assert!((ledger.balance(&child_id).await - allocation).abs() < 1e-9);

    let child = orchestrator.agent(&child_id).await.unwrap();
    assert_eq!(child.config.parent_id.as_deref(), Some(parent_id.as_str()));
    assert_eq!(parent.subagents().await, vec![child_id]);
}

#[tokio::test]
async fn delegation_with_epsilon_over_spawn_cost_allocates_three_quarters() {
    let base = TempDir::new().unwrap();
    let config = test_config(&base);
    let spawn_cost = config.spawn_cost;
    let epsilon = 0.004;
    let llm = ScriptedLlm::new(Vec::new(), complete_action());
    let orchestrator = Orchestrator::new(config, Arc::new(Ledger::new()), llm);

    let parent_id = orchestrator
        .spawn_agent(
            "Manager",
            "Coordinate",
            spawn_cost + epsilon,
            Some("parent0"),
            None,
        )
        .await
        .unwrap();
    let parent = orchestrator.agent(&parent_id).await.unwrap();

    let result = parent.delegate("Helper", "Assist", None, None).await;
    assert!(result.get("error").is_none());
    let child_id = result["subagent_id"].as_str().unwrap();
    assert!(
        (orchestrator.ledger().balance(child_id).await - 0.75 * epsilon).abs() < 1e-12
    );
}

#[tokio::test]
async fn delegation_below_spawn_cost_fails_without_charges() {
    let base = TempDir::new().unwrap();
    let config = test_config(&base);
    let spawn_cost = config.spawn_cost;
    let llm = ScriptedLlm::new(Vec::new(), complete_action());
    let orchestrator = Orchestrator::new(config, Arc::new(Ledger::new()), llm);

    let parent_id = orchestrator
        .spawn_agent(
            "Manager",
            "Coordinate",
            spawn_cost / 2.0,
            Some("parent0"),
            None,
        )
        .await
        .unwrap();
    let parent = orchestrator.agent(&parent_id).await.unwrap();

    let result = parent.delegate("Helper", "Assist", None, None).await;
    assert!(result["error"]
        .as_str()
        .unwrap()
        .contains("Insufficient funds for spawn cost"));
    assert!(
        (orchestrator.ledger().balance(&parent_id).await - spawn_cost / 2.0).abs() < 1e-12
    );
}

#[tokio::test]
async fn failed_spawn_at_the_cap_refunds_the_parent() {
    let base = TempDir::new().unwrap();
    let mut config = test_config(&base);
    config.max_agents = 1;
    let llm = ScriptedLlm::new(Vec::new(), complete_action());
    let orchestrator = Orchestrator::new(config, Arc::new(Ledger::new()), llm);

    let parent_id = orchestrator
        .spawn_agent("Manager", "Coordinate", 10.0, Some("parent0"), None)
        .await
        .unwrap();
    let parent = orchestrator.agent(&parent_id).await.unwrap();

    let result = parent.delegate("Helper", "Assist", None, None).await;
    assert!(result["error"]
        .as_str()
        .unwrap()
        .contains("Maximum number of agents"));
    // Both debits were refunded.
    assert!((orchestrator.ledger().balance(&parent_id).await - 10.0).abs() < 1e-9);
}

// ---- Scenario: founder two-step plan ----

#[tokio::test]
async fn founder_runs_a_two_step_plan_to_completion() {
    let base = TempDir::new().unwrap();
    let config = test_config(&base);

    let plan = json!({
        "reasoning": "Two specialists, in order.",
        "plan": [
            {"action": "DELEGATE", "details": {"role": "HTML Developer", "task": "Create index.html"}},
            {"action": "DELEGATE", "details": {"role": "CSS Designer", "task": "Create style.css"}}
        ]
    })
    .to_string();
    let verdict = json!({"is_valid": true, "reasoning": "Looks right."}).to_string();
    let llm = ScriptedLlm::new(
        vec![
            ("Project Manager agent", plan),
            ("Software Architect agent", verdict),
        ],
        complete_action(),
    );

    let mut bios = Bootstrap::new(config).with_llm_client(llm);
    let report = bios.boot().await.unwrap();

    assert_eq!(report.final_state.total_agents, 3);
    let founder = &report.final_state.agent_states[&report.founder_id];
    assert_eq!(founder.state, "completed");
    assert_eq!(founder.role, "Founder");

    let children = &report.final_state.hierarchy[&report.founder_id];
    assert_eq!(children.len(), 2);
    for child_id in children {
        assert_eq!(report.final_state.agent_states[child_id].state, "completed");
    }
    assert!(report.total_cost > 0.0);
}

#[tokio::test]
async fn founder_with_unparseable_plan_fails() {
    let base = TempDir::new().unwrap();
    let mut config = test_config(&base);
    config.capabilities.advanced_planning = false;
    let llm = ScriptedLlm::new(
        vec![("Project Manager agent", "I cannot produce a plan.".to_string())],
        complete_action(),
    );

    let mut bios = Bootstrap::new(config).with_llm_client(llm);
    let report = bios.boot().await.unwrap();
    let founder = &report.final_state.agent_states[&report.founder_id];
    assert_eq!(founder.state, "failed");
}

// ---- Scenario: timeout ----

#[tokio::test]
async fn simulation_timeout_fails_the_looping_agent() {
    let base = TempDir::new().unwrap();
    let mut config = test_config(&base);
    config.simulation_timeout = Duration::from_millis(500);
    config.shutdown_timeout = Duration::from_secs(1);

    // Endless tool usage, with criteria that can never match.
    let spin = json!({
        "reasoning": "Keep searching.",
        "action": "USE_TOOL",
        "tool": "web_search",
        "parameters": {"query": "more"},
    })
    .to_string();
    let llm = ScriptedLlm::new(Vec::new(), spin);
    let orchestrator = Orchestrator::new(config, Arc::new(Ledger::new()), llm);

    let worker_id = orchestrator
        .spawn_agent(
            "Spinner",
            "Loop forever",
            5.0,
            Some("parent0"),
            Some(json!({"action": "use_tool", "tool": "never", "parameters": {}})),
        )
        .await
        .unwrap();

    let started = Instant::now();
    let report = orchestrator.run().await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(500), "returned too early: {:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(2500), "returned too late: {:?}", elapsed);
    assert_eq!(report.agent_states[&worker_id].state, "failed");
}

// ---- Scenario: tool forging ----

#[tokio::test]
async fn tool_forging_deploys_the_plugin_and_notifies_the_requester() {
    let base = TempDir::new().unwrap();
    let mut config = test_config(&base);
    config.capabilities.tool_creation = true;
    let workspace_root = config.workspace_path();
    let plugins_dir = config.plugins_dir.clone();

    let llm = ScriptedLlm::new(Vec::new(), complete_action());
    let orchestrator = Orchestrator::new(config, Arc::new(Ledger::new()), llm);

    let requester_id = orchestrator
        .spawn_agent("Builder", "Build things", 5.0, Some("parent0"), None)
        .await
        .unwrap();

    orchestrator
        .handle_tool_request(&requester_id, "hash a string")
        .await;
    assert!(orchestrator.has_pending_tool_request(&requester_id).await);

    // Find the forging agent: child of the requester with the forger role.
    let results = orchestrator.collect_results().await;
    let forger_id = results
        .agent_states
        .iter()
        .find(|(_, report)| report.role == TOOL_FORGER_ROLE)
        .map(|(id, _)| id.clone())
        .expect("forging agent was not spawned");
    assert_eq!(
        results.agent_states[&forger_id].parent.as_deref(),
        Some(requester_id.as_str())
    );

    // The forger writes its tool, then reports success.
    let tool_source = workspace_root.join(&forger_id).join("new_tool.py");
    std::fs::write(&tool_source, "import json, sys\nprint(json.dumps({\"ok\": True}))\n")
        .unwrap();
    orchestrator
        .send_message(
            &forger_id,
            &requester_id,
            json!({
                "status": "tool_creation_success",
                "tool_code_path": "new_tool.py",
                "tool_name": "string_hasher",
                "description": "hash a string",
            }),
        )
        .await;

    orchestrator.process_system_events().await;

    // Plugin and manifest deployed under a forger-tagged name.
    let plugin_py = plugins_dir.join(format!("generated_new_tool_{}.py", forger_id));
    let plugin_manifest = plugins_dir.join(format!("generated_new_tool_{}.json", forger_id));
    assert!(plugin_py.exists());
    assert!(plugin_manifest.exists());

    // The forger is completed and the pending request is cleared.
    assert_eq!(
        orchestrator.agent_state(&forger_id).await,
        Some(AgentState::Completed)
    );
    assert!(!orchestrator.has_pending_tool_request(&requester_id).await);

    // The requester was notified and can see the new tool.
    let messages = orchestrator.get_messages(&requester_id).await;
    assert!(messages.iter().any(|message| {
        message.from == SYSTEM_SENDER && message.content["status"] == "tool_request_fulfilled"
    }));
    let requester = orchestrator.agent(&requester_id).await.unwrap();
    assert!(requester.toolbox().has_tool("string_hasher").await);

    // Refresh stays idempotent after deployment.
    requester.toolbox().refresh().await;
    assert!(requester.toolbox().has_tool("string_hasher").await);
}

#[tokio::test]
async fn tool_requests_are_denied_when_the_capability_is_off() {
    let base = TempDir::new().unwrap();
    let config = test_config(&base); // tool_creation defaults to false
    let llm = ScriptedLlm::new(Vec::new(), complete_action());
    let orchestrator = Orchestrator::new(config, Arc::new(Ledger::new()), llm);

    let requester_id = orchestrator
        .spawn_agent("Builder", "Build things", 5.0, Some("parent0"), None)
        .await
        .unwrap();
    let before = orchestrator.agent_count().await;

    orchestrator
        .handle_tool_request(&requester_id, "hash a string")
        .await;

    assert_eq!(orchestrator.agent_count().await, before);
    let messages = orchestrator.get_messages(&requester_id).await;
    assert!(messages
        .iter()
        .any(|message| message.content["status"] == "tool_request_denied"));
}

#[tokio::test]
async fn duplicate_tool_requests_are_rejected() {
    let base = TempDir::new().unwrap();
    let mut config = test_config(&base);
    config.capabilities.tool_creation = true;
    let llm = ScriptedLlm::new(Vec::new(), complete_action());
    let orchestrator = Orchestrator::new(config, Arc::new(Ledger::new()), llm);

    let requester_id = orchestrator
        .spawn_agent("Builder", "Build things", 5.0, Some("parent0"), None)
        .await
        .unwrap();

    orchestrator
        .handle_tool_request(&requester_id, "hash a string")
        .await;
    let after_first = orchestrator.agent_count().await;

    orchestrator
        .handle_tool_request(&requester_id, "hash another string")
        .await;
    assert_eq!(orchestrator.agent_count().await, after_first);
    let messages = orchestrator.get_messages(&requester_id).await;
    assert!(messages
        .iter()
        .any(|message| message.content["status"] == "tool_request_duplicate"));
}

// ---- System-event mailbox discipline ----

#[tokio::test]
async fn system_event_scan_preserves_non_system_message_order() {
    let base = TempDir::new().unwrap();
    let mut config = test_config(&base);
    config.capabilities.tool_creation = true;
    let workspace_root = config.workspace_path();

    let llm = ScriptedLlm::new(Vec::new(), complete_action());
    let orchestrator = Orchestrator::new(config, Arc::new(Ledger::new()), llm);

    let requester_id = orchestrator
        .spawn_agent("Builder", "Build things", 5.0, Some("parent0"), None)
        .await
        .unwrap();
    orchestrator
        .handle_tool_request(&requester_id, "hash a string")
        .await;
    let forger_id = orchestrator
        .collect_results()
        .await
        .agent_states
        .iter()
        .find(|(_, report)| report.role == TOOL_FORGER_ROLE)
        .map(|(id, _)| id.clone())
        .unwrap();
    std::fs::write(
        workspace_root.join(&forger_id).join("new_tool.py"),
        "print('{}')\n",
    )
    .unwrap();

    // Interleave normal traffic around the system message.
    orchestrator
        .send_message("peer1", &requester_id, json!({"n": 1}))
        .await;
    orchestrator
        .send_message(
            &forger_id,
            &requester_id,
            json!({"status": "tool_creation_success", "tool_code_path": "new_tool.py"}),
        )
        .await;
    orchestrator
        .send_message("peer1", &requester_id, json!({"n": 2}))
        .await;

    orchestrator.process_system_events().await;

    let messages = orchestrator.get_messages(&requester_id).await;
    // No tool-creation report survives the scan, and the normal messages
    // keep their original relative order at the front.
    assert!(messages
        .iter()
        .all(|message| message.content["status"] != "tool_creation_success"));
    assert_eq!(messages[0].content["n"], 1);
    assert_eq!(messages[1].content["n"], 2);
}

// ---- Worker completion criteria ----

#[tokio::test]
async fn worker_completes_and_delivers_when_criteria_match() {
    let base = TempDir::new().unwrap();
    let config = test_config(&base);
    let delivery_dir = config.delivery_path();

    let write_action = json!({
        "reasoning": "Create the file.",
        "action": "USE_TOOL",
        "tool": "file_manager",
        "parameters": {"operation": "write", "path": "report.txt", "content": "done"},
    })
    .to_string();
    let llm = ScriptedLlm::new(Vec::new(), write_action);
    let orchestrator = Orchestrator::new(config, Arc::new(Ledger::new()), llm);

    let criteria = json!({
        "action": "use_tool",
        "tool": "file_manager",
        "parameters": {"operation": "write", "path": "report.txt", "content": "done"},
    });
    let worker_id = orchestrator
        .spawn_agent("Writer", "Write report.txt", 5.0, Some("parent0"), Some(criteria))
        .await
        .unwrap();
    let worker = orchestrator.agent(&worker_id).await.unwrap();

    worker.run().await;

    assert_eq!(worker.state().await, AgentState::Completed);
    // The delivery hook copied the artefact out of the workspace.
    assert_eq!(
        std::fs::read_to_string(delivery_dir.join("report.txt")).unwrap(),
        "done"
    );
}

// ---- Bootstrap validation ----

#[tokio::test]
async fn bootstrap_rejects_invalid_configuration() {
    let base = TempDir::new().unwrap();
    let mut config = test_config(&base);
    config.initial_budget = -1.0;
    let llm = ScriptedLlm::new(Vec::new(), complete_action());
    let mut bios = Bootstrap::new(config).with_llm_client(llm);
    assert!(bios.boot().await.is_err());
}
