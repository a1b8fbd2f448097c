//! Command-line front end for AgentOS.

use agentos::agentos::llm::api_key_var;
use agentos::{Bootstrap, SystemConfig};
use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "agentos",
    about = "Agentic Operating System - run autonomous agent societies against an objective.",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a new simulation with a given objective.
    Run {
        /// The main objective for the simulation.
        objective: String,
        /// Initial budget for the simulation.
        #[arg(short, long, default_value_t = 100.0)]
        budget: f64,
        /// Maximum number of concurrent agents.
        #[arg(short = 'a', long, default_value_t = 10)]
        max_agents: usize,
        /// Logging level (debug, info, warn, error).
        #[arg(short, long, default_value = "info")]
        log_level: String,
        /// Serve the live visualizer WebSocket endpoint.
        #[arg(short, long)]
        visualize: bool,
        /// LLM provider to use (openai, deepseek, kimi, groq).
        #[arg(short, long, default_value = "openai")]
        provider: String,
        /// Model override (e.g. gpt-4o-mini, kimi-k2-0711-preview).
        #[arg(short, long, env = "AOS_MODEL_NAME")]
        model: Option<String>,
        /// Enable inter-agent messaging (default).
        #[arg(long = "messaging", overrides_with = "no_messaging")]
        messaging: bool,
        /// Disable inter-agent messaging.
        #[arg(long = "no-messaging")]
        no_messaging: bool,
        /// Enable the advanced planning validation loop (default).
        #[arg(long = "adv-planning", overrides_with = "no_adv_planning")]
        adv_planning: bool,
        /// Disable the advanced planning validation loop.
        #[arg(long = "no-adv-planning")]
        no_adv_planning: bool,
        /// Enable the agents' ability to create new tools.
        #[arg(long = "tool-creation", overrides_with = "no_tool_creation")]
        tool_creation: bool,
        /// Disable the agents' ability to create new tools (default).
        #[arg(long = "no-tool-creation")]
        no_tool_creation: bool,
    },
    /// Check environment and configuration (e.g., API keys).
    Check,
}

/// Wipe and recreate a directory so every run starts clean.
fn reset_dir(path: &std::path::Path) -> std::io::Result<()> {
    if path.exists() {
        std::fs::remove_dir_all(path)?;
    }
    std::fs::create_dir_all(path)
}

async fn run_simulation(config: SystemConfig) -> ExitCode {
    println!("Starting AgentOS simulation...");
    println!("Objective: {}", config.objective);
    println!("{}", "-".repeat(50));

    if let Err(e) = reset_dir(&config.workspace_path()) {
        eprintln!("Failed to prepare workspace directory: {}", e);
        return ExitCode::FAILURE;
    }
    if let Err(e) = reset_dir(&config.delivery_path()) {
        eprintln!("Failed to prepare delivery directory: {}", e);
        return ExitCode::FAILURE;
    }
    println!(
        "Workspace and delivery folders recreated under '{}'",
        config.output_base.display()
    );

    let mut bios = Bootstrap::new(config);
    match bios.boot().await {
        Ok(report) => {
            println!("\n{0} SIMULATION COMPLETE {0}", "=".repeat(25));
            println!("\nFinal Results:");
            println!("  Founder: {}", report.founder_id);
            println!(
                "  Total Agents Created: {}",
                report.final_state.total_agents
            );
            println!("  Total System Cost: ${:.6}", report.total_cost);
            for (agent_id, agent) in &report.final_state.agent_states {
                println!(
                    "  {} [{}] -> {} (balance ${:.4})",
                    agent_id, agent.role, agent.state, agent.final_balance
                );
            }
            bios.shutdown().await;
            // Orderly termination is success even when the founder failed.
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("\nSIMULATION FAILED: {}", e);
            bios.shutdown().await;
            ExitCode::FAILURE
        }
    }
}

fn check_environment() -> ExitCode {
    println!("Checking environment...");
    for provider in &["openai", "deepseek", "kimi", "groq"] {
        let var = match api_key_var(provider) {
            Some(var) => var,
            None => continue,
        };
        if std::env::var(var).is_ok() {
            println!("  [ok] {} is set ({})", var, provider);
        } else {
            println!("  [--] {} is not set ({})", var, provider);
        }
    }
    println!("Set at least one provider key before running a simulation.");
    ExitCode::SUCCESS
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            objective,
            budget,
            max_agents,
            log_level,
            visualize,
            provider,
            model,
            messaging: _,
            no_messaging,
            adv_planning: _,
            no_adv_planning,
            tool_creation,
            no_tool_creation: _,
        } => {
            env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or(log_level.to_lowercase()),
            )
            .init();

            let mut config = SystemConfig::default();
            config.objective = objective;
            config.initial_budget = budget;
            config.max_agents = max_agents;
            config.visualize = visualize;
            config.llm.provider = provider;
            if let Some(model) = model {
                config.llm.model = model;
            }
            config.capabilities.messaging = !no_messaging;
            config.capabilities.advanced_planning = !no_adv_planning;
            config.capabilities.tool_creation = tool_creation;

            if let Err(e) = config.validate() {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
            run_simulation(config).await
        }
        Commands::Check => check_environment(),
    }
}
