//! Sopilot 命令行入口
//!
//! - `sopilot run <SOP_FILE>`：执行一个 SOP 文件，结束时输出最终状态（或失败与已执行的历史）
//! - `sopilot actions`：列出当前配置下的动作仓库

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sopilot::config::{load_config, AppConfig};
use sopilot::tools::SimulatedUserChannel;
use sopilot::workflow::WorkflowEvent;
use sopilot::{observability, OrchestratorBuilder, WorkflowState};
use tokio_util::sync::CancellationToken;

/// Run free-text SOP workflows with an LLM decision loop
#[derive(Parser)]
#[command(name = "sopilot")]
#[command(version)]
struct Cli {
    /// Extra config file layered over config/default.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute an SOP file
    Run {
        /// SOP file, one step per line
        sop_file: PathBuf,

        /// Initial user context entries (e.g. --context request_id=103)
        #[arg(long = "context", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        context: Vec<(String, String)>,

        /// Override workflow.max_iterations
        #[arg(short = 'n', long)]
        max_iterations: Option<usize>,

        /// Answer prompts with the simulated user instead of stdin
        #[arg(long)]
        simulate_user: bool,

        /// Print the final state as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the loaded action repository
    Actions,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let k = k.trim();
    if k.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((k.to_string(), v.trim().to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    observability::init(level);

    let config = load_config(cli.config.clone()).context("Failed to load config")?;

    match cli.command {
        Commands::Actions => {
            list_actions(&config);
            Ok(())
        }
        Commands::Run {
            sop_file,
            context,
            max_iterations,
            simulate_user,
            json,
        } => {
            let sop = std::fs::read_to_string(&sop_file)
                .with_context(|| format!("Failed to read SOP file {}", sop_file.display()))?;
            run(config, &sop, context, max_iterations, simulate_user, json).await
        }
    }
}

fn list_actions(config: &AppConfig) {
    for entry in config.action_repository().entries() {
        let guard = if entry.guard.is_some() { " [guarded]" } else { "" };
        println!("{:<28} {}{}", entry.name, entry.handler_type, guard);
    }
}

async fn run(
    mut config: AppConfig,
    sop: &str,
    context: Vec<(String, String)>,
    max_iterations: Option<usize>,
    simulate_user: bool,
    json: bool,
) -> anyhow::Result<()> {
    if let Some(n) = max_iterations {
        config.workflow.max_iterations = n;
    }
    let mut builder = OrchestratorBuilder::new(config);
    if simulate_user {
        builder = builder.with_channel(Arc::new(SimulatedUserChannel::new()));
    }
    let orchestrator = builder.build();

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            ctrl_c.cancel();
        }
    });

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<WorkflowEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if !json {
                print_event(&event);
            }
        }
    });

    let user_context: BTreeMap<String, String> = context.into_iter().collect();
    let result = orchestrator
        .run_with(sop, user_context, cancel, Some(&event_tx))
        .await;
    drop(event_tx);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "event printer task failed");
    }

    match result {
        Ok(state) => {
            print_state(&state, json)?;
            Ok(())
        }
        Err(failure) => {
            print_state(&failure.state, json)?;
            bail!("{failure}")
        }
    }
}

fn print_event(event: &WorkflowEvent) {
    match event {
        WorkflowEvent::Decision {
            iteration,
            step: Some(step),
            source,
        } => println!("#{iteration} {step}  ({source:?})"),
        WorkflowEvent::Resolved { action, score, .. } => println!("   -> {action} (score {score:.2})"),
        WorkflowEvent::ToolResult { tool, success, preview } => {
            let mark = if *success { "ok" } else { "FAIL" };
            println!("   {tool} [{mark}] {preview}");
        }
        WorkflowEvent::StepCompleted { feedback, .. } => println!("   feedback: {feedback}"),
        _ => {}
    }
}

fn print_state(state: &WorkflowState, json: bool) -> anyhow::Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(state).context("Failed to serialize state")?
        );
        return Ok(());
    }
    println!(
        "\nrun {}: {} iteration(s), {}/{} step(s) completed, complete={}",
        state.run_id,
        state.iterations,
        state.completed_steps.len(),
        state.steps.len(),
        state.complete
    );
    for (i, entry) in state.memory.entries().iter().enumerate() {
        let mark = if entry.is_success() { "ok" } else { "--" };
        println!("  {}. {} {} [{}] {}", i + 1, mark, entry.step, entry.action, entry.feedback);
    }
    if !state.user_context.is_empty() {
        println!("  context: {:?}", state.user_context);
    }
    let usage = &state.token_usage;
    if usage.total_tokens > 0 {
        println!(
            "  tokens: {} prompt + {} completion = {}",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        );
    }
    Ok(())
}
