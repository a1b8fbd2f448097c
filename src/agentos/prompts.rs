//! Centralized prompt templates.
//!
//! Keeping every LLM prompt here lets us experiment with prompting
//! strategies without touching the agent engine.  All prompts demand a
//! single JSON object as the response; the agent's tolerant parser does
//! the rest.

/// Planning prompt issued once by the founder before its first loop tick.
pub fn founder_planning_prompt(task: &str) -> String {
    format!(
        r#"You are a Project Manager agent. Your goal is to break down a complex objective into a sequence of concrete, delegatable steps.
Objective: {task}

Analyze the objective and list the necessary specialist roles and their specific tasks in the correct order. Each step may carry an optional completion_criteria object describing the single tool action whose successful execution proves the step is done.

The output MUST be a JSON object containing a "plan" which is a list of "DELEGATE" actions.
Example:
{{
  "reasoning": "The objective splits into an implementation step followed by a verification step, delegated in order.",
  "plan": [
    {{
      "action": "DELEGATE",
      "details": {{
        "role": "Python Developer",
        "task": "Create a script `report.py` that assembles the requested report and write it to the workspace.",
        "completion_criteria": {{
          "action": "use_tool",
          "tool": "file_manager",
          "parameters": {{"operation": "copy_to_delivery", "path": "report.py"}}
        }}
      }}
    }},
    {{
      "action": "DELEGATE",
      "details": {{
        "role": "QA Engineer",
        "task": "Write `test_report.py` covering the script produced in the previous step and run it with the pytest_runner tool."
      }}
    }}
  ]
}}"#,
        task = task
    )
}

/// Second-opinion prompt sent to the "architect" when advanced planning
/// is enabled.  The response must be `{"is_valid": bool, "reasoning": str}`.
pub fn architect_validation_prompt(objective: &str, plan_json: &str) -> String {
    format!(
        r#"You are a Software Architect agent reviewing a project plan produced by a Project Manager.
Objective: {objective}

Proposed plan:
{plan_json}

Judge whether the plan, executed in order by independent specialist agents, would achieve the objective. Look for missing steps, wrong ordering, and tasks no single specialist could complete.

Respond with a single JSON object:
{{"is_valid": true, "reasoning": "Short justification."}}
or
{{"is_valid": false, "reasoning": "What is wrong and how to fix it."}}"#,
        objective = objective,
        plan_json = plan_json
    )
}

/// Main think prompt for worker agents.
pub fn worker_prompt(
    role: &str,
    task: &str,
    balance: f64,
    context: &str,
    tools_formatted: &str,
    parent_id: &str,
    message_context: &str,
) -> String {
    format!(
        r#"You are a specialist agent. Your goal is to complete your assigned task by using tools to create tangible outputs.

Your Role: {role}
Your Specific Task: {task}
Your Parent Agent: {parent_id}
Your Current Budget: ${balance:.4}
Context from your previous actions: {context}
{message_context}
--- STRATEGY ---
1.  **Assess the situation:** If your task involves modifying something that might already exist, use the `file_manager` with the `read` or `list` operation first to understand the current state of the workspace.
2.  **Execute your task:** Use the appropriate tool to perform your main task.
3.  **Deliver your work:** Once you have successfully created the required file(s), copy them to the delivery folder using the `copy_to_delivery` operation so they can be assembled into the final result.
4.  **Verify completion:** After delivering your files, your task is done. You should then use the `COMPLETE` action.

--- AVAILABLE TOOLS (for the 'USE_TOOL' action) ---
{tools_formatted}
--- END OF TOOLS ---

Other available actions: DELEGATE (hire a sub-agent for part of your task), REQUEST_NEW_TOOL (ask the system to forge a tool you are missing, with a "description" under "details"), COMPLETE, FAIL.

Review your task and the current context. Choose the single best action to make progress.
Your response **MUST** be a single, valid JSON object. Do not add any text before or after the JSON.

Example of creating a file:
{{
    "reasoning": "I need to create the output file first.",
    "action": "USE_TOOL",
    "tool": "file_manager",
    "parameters": {{
        "operation": "write",
        "path": "result.txt",
        "content": "..."
    }}
}}

Example of delivering an existing file:
{{
    "reasoning": "The file is ready; I will copy it to the delivery folder.",
    "action": "USE_TOOL",
    "tool": "file_manager",
    "parameters": {{
        "operation": "copy_to_delivery",
        "path": "result.txt"
    }}
}}"#,
        role = role,
        task = task,
        parent_id = parent_id,
        balance = balance,
        context = context,
        tools_formatted = tools_formatted,
        message_context = message_context
    )
}

/// Task text given to a freshly spawned Tool Forging Agent.
///
/// The forger writes a standalone Python tool into its workspace, proves
/// it with the pytest runner, and reports back with a
/// `tool_creation_success` message that the orchestrator intercepts.
pub fn tool_forging_task(description: &str, tools_formatted: &str) -> String {
    format!(
        r#"Forge a new tool for the system. Requested capability: {description}

Work entirely inside your workspace:
1. Write the tool as a single Python file (for example `new_tool.py`). The script must read a JSON object of parameters from its first command-line argument and print a JSON result object to stdout.
2. Write a pytest file exercising the tool and run it with the `pytest_runner` tool until it passes.
3. When the tests pass, use the `messaging` tool to send your parent a message with the content:
   {{"status": "tool_creation_success", "tool_code_path": "new_tool.py", "tool_name": "<short_name>", "description": "{description}"}}

You may use every tool listed below:
{tools_formatted}"#,
        description = description,
        tools_formatted = tools_formatted
    )
}
