//! stride - tool-using assistant CLI

mod commands;
mod config;
mod tools;
mod utils;

use clap::Parser;
use std::sync::Arc;
use stride_agent::{Agent, AgentEvent, LlmReasoner, LlmSynthesizer, QueryResult, SessionContext};
use stride_ai::Model;
use stride_ai::providers::RetryingProvider;
use stride_ai::providers::openai::OpenAIProvider;

/// stride - reason, act, observe, answer
#[derive(Parser, Debug)]
#[command(name = "stride")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to use (default: gpt-4o-mini)
    #[arg(short, long)]
    model: Option<String>,

    /// Capability set (weather, events, shopping, all)
    #[arg(short = 's', long)]
    capability_set: Option<String>,

    /// User id handed to context-aware capabilities
    #[arg(short, long)]
    user_id: Option<String>,

    /// Override the per-query step budget
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Run in non-interactive mode with a single request
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Print the full query result as JSON (with --command)
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("stride=debug")
            .init();
    }

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cfg = config::Config::load();

    let api_key = match cfg.api_key() {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Set OPENAI_API_KEY or add api_key to {}", config::Config::config_path().display());
            std::process::exit(1);
        }
    };

    let model_id = args
        .model
        .or(cfg.model.clone())
        .unwrap_or_else(|| config::DEFAULT_MODEL.to_string());
    let mut model = Model::openai(model_id);
    if let Some(base_url) = &cfg.base_url {
        model = model.with_base_url(base_url);
    }
    tracing::debug!(model = %model.id, "Using model");

    let set_name = args
        .capability_set
        .or(cfg.capability_set.clone())
        .unwrap_or_else(|| "all".to_string());
    let Some(capability_set) = tools::capability_set(&set_name) else {
        eprintln!(
            "Unknown capability set: '{}' (valid: {})",
            set_name,
            tools::SET_NAMES.join(", ")
        );
        std::process::exit(1);
    };

    let provider = Arc::new(RetryingProvider::new(OpenAIProvider::new(api_key)));
    let reasoner = Arc::new(LlmReasoner::new(provider.clone(), model.clone()));
    let synthesizer = Arc::new(LlmSynthesizer::new(provider, model.clone()));
    let registry = Arc::new(tools::registry(Arc::new(tools::CartStore::new())));

    let agent = Agent::new(
        cfg.agent_config(args.max_iterations),
        registry,
        reasoner,
        synthesizer.clone(),
        synthesizer,
        capability_set,
    );
    let mut agent = match agent {
        Ok(agent) => agent,
        Err(e) if e.is_configuration() => {
            eprintln!("Error: {}", e);
            eprintln!(
                "Fix the [history] section of {}",
                config::Config::config_path().display()
            );
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };
    if let Some(user_id) = args.user_id.or(cfg.user_id.clone()) {
        agent = agent.with_session_context(SessionContext::for_user(user_id));
    }

    if let Some(command) = args.command {
        run_command(&mut agent, &command, args.json).await
    } else {
        run_interactive(&mut agent, &model).await
    }
}

/// Print loop progress as it happens
fn spawn_event_printer(agent: &Agent) -> tokio::task::JoinHandle<()> {
    let mut receiver = agent.subscribe();
    tokio::spawn(async move {
        while let Some(event) = utils::next_event(&mut receiver).await {
            match event {
                AgentEvent::Thought { text, .. } => {
                    println!("[thinking: {}]", utils::truncate_chars(&text, 120));
                }
                AgentEvent::FallbackApplied {
                    rule, invocation, ..
                } => {
                    println!("[fallback {}: {}]", rule, invocation);
                }
                AgentEvent::ToolExecutionStart {
                    capability,
                    arguments,
                    ..
                } => {
                    let preview = utils::truncate_chars(&arguments.to_string(), 120);
                    println!("[Running {} {}]", capability, preview);
                }
                AgentEvent::ToolExecutionEnd {
                    capability,
                    status,
                    duration_ms,
                    ..
                } => {
                    println!(
                        "[{} {} in {}ms]",
                        capability,
                        utils::status_str(status),
                        duration_ms
                    );
                }
                AgentEvent::SummaryCreated {
                    trajectories,
                    steps,
                } => {
                    println!(
                        "[Summarized {} earlier exchanges ({} steps)]",
                        trajectories, steps
                    );
                }
                AgentEvent::TrajectoriesDropped {
                    trajectories,
                    steps,
                } => {
                    println!(
                        "[Dropped {} earlier exchanges ({} steps)]",
                        trajectories, steps
                    );
                }
                AgentEvent::QueryEnd { .. } => break,
                _ => {}
            }
        }
    })
}

fn print_result(result: &QueryResult) {
    if let Some(error) = &result.error {
        eprintln!("Error: {}", error);
        return;
    }
    println!("\n{}", result.answer);
    let mut footer = format!(
        "[confidence {:.2} | {} steps | {:.1}s",
        result.confidence,
        result.iteration_count,
        result.elapsed.as_secs_f64()
    );
    if !result.capabilities_used.is_empty() {
        footer.push_str(&format!(" | used {}", result.capabilities_used.join(", ")));
    }
    if result.budget_limited {
        footer.push_str(" | budget reached");
    }
    footer.push(']');
    println!("{}", footer);
}

async fn run_command(agent: &mut Agent, command: &str, json: bool) -> anyhow::Result<()> {
    if json {
        let result = agent.query(command).await;
        println!("{}", serde_json::to_string_pretty(&result)?);
        if !result.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    println!("stride> {}", command);
    println!();

    let handle = spawn_event_printer(agent);
    let result = agent.query(command).await;
    let _ = handle.await;

    print_result(&result);
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_interactive(agent: &mut Agent, model: &Model) -> anyhow::Result<()> {
    use std::io::{self, Write};

    // Show minimal startup info (only if TTY)
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!(
            "stride ({}) capabilities: {}",
            model.id,
            agent.capability_set().name
        );
        eprintln!("Type /help for commands.");
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        // Handle slash commands
        if let Some(result) = commands::execute_command(input, agent) {
            match result {
                commands::CommandResult::Clear => {
                    agent.clear_history();
                    println!("Cleared conversation.");
                }
                commands::CommandResult::Exit => break,
                commands::CommandResult::Message(msg) => println!("{}", msg),
                commands::CommandResult::ChangeCapabilitySet(set) => {
                    println!("Switched to capability set: {}", set.name);
                    agent.set_capability_set(set);
                }
                commands::CommandResult::ChangeUser(user) => {
                    match &user {
                        Some(id) => println!("Session user: {}", id),
                        None => println!("Session user cleared."),
                    }
                    agent.set_session_context(user.map(SessionContext::for_user));
                }
                commands::CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}", cmd);
                    println!("Type /help for available commands.");
                }
            }
            continue;
        }

        let handle = spawn_event_printer(agent);
        let result = agent.query(input).await;
        let _ = handle.await;
        print_result(&result);
        println!();
    }

    Ok(())
}
