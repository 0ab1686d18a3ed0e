//! aidp binary entry point

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, eyre};
use tracing_subscriber::EnvFilter;

use aidp::checkpoint::{CheckpointManager, format_status_line};
use aidp::cli::{Cli, Command, TasksCommand, WsCommand};
use aidp::clock::{Clock, SystemClock};
use aidp::config::Config;
use aidp::domain::TaskStatus;
use aidp::engine::{AsyncRunner, EngineContext, FixForwardEngine, StepStatus};
use aidp::exec::{CommandAgent, GitDriver, ShellRunner, TokioSleeper};
use aidp::repl::ReplSession;
use aidp::tasks::{TaskFilter, TaskLedger};
use aidp::workstream::WorkstreamManager;

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let project_dir = match &cli.project {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("resolving current directory")?,
    };
    let config = Config::load(cli.config.as_ref(), &project_dir)?;

    let exit_code = match cli.command {
        Command::Run {
            step,
            prompt_file,
            prompt,
            max_iterations,
            workstream,
        } => run_step(config, project_dir, step, prompt_file, prompt, max_iterations, workstream).await?,
        Command::Repl => {
            run_repl(config, project_dir).await?;
            0
        }
        Command::Status => {
            show_status(project_dir)?;
            0
        }
        Command::Tasks { command } => {
            show_tasks(project_dir, command)?;
            0
        }
        Command::Ws { command } => {
            manage_workstreams(project_dir, command).await?;
            0
        }
    };

    std::process::exit(exit_code);
}

#[allow(clippy::too_many_arguments)]
async fn run_step(
    mut config: Config,
    project_dir: PathBuf,
    step: String,
    prompt_file: Option<PathBuf>,
    prompt: Option<String>,
    max_iterations: Option<u32>,
    workstream: Option<String>,
) -> Result<i32> {
    if let Some(max) = max_iterations {
        config.harness.max_iterations = max;
    }

    let base_prompt = match (prompt_file, prompt) {
        (Some(path), _) => std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?,
        (None, Some(inline)) => inline,
        (None, None) => format!("Carry out step {} for this project.", step),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let vcs = Arc::new(GitDriver);
    let working_dir = match &workstream {
        Some(slug) => {
            let manager = WorkstreamManager::new(&project_dir, vcs.clone(), clock.clone());
            manager.switch_path(slug).map_err(|e| eyre!(e.to_string()))?
        }
        None => project_dir.clone(),
    };

    let agent_command = config
        .provider
        .settings
        .get("command")
        .cloned()
        .ok_or_else(|| eyre!("No agent command configured; set provider.settings.command in aidp.yml"))?;
    let agent = Arc::new(CommandAgent::new(agent_command, config.provider.instruction_file));

    let engine = FixForwardEngine::new(
        config,
        EngineContext {
            project_dir: project_dir.clone(),
            working_dir,
        },
        agent,
        Arc::new(ShellRunner),
        clock,
        Arc::new(TokioSleeper),
    );
    let runner = AsyncRunner::new(engine);

    let runner = Arc::new(runner);
    runner
        .execute_step_async(&step, &base_prompt)
        .await
        .map_err(|e| eyre!(e.to_string()))?;
    println!("Started {}.", step.bold());

    // Interactive interrupt cancels cooperatively and maps to exit 130.
    let interrupted = Arc::new(std::sync::atomic::AtomicBool::new(false));
    tokio::spawn({
        let runner = runner.clone();
        let interrupted = interrupted.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\n{}", "Interrupt received; cancelling at the next iteration boundary...".yellow());
                interrupted.store(true, std::sync::atomic::Ordering::SeqCst);
                let _ = runner.cancel(true);
            }
        }
    });

    let summary = runner.wait().await;
    print_summary(&summary);

    Ok(match summary.status {
        StepStatus::Completed => 0,
        StepStatus::Error | StepStatus::Unknown => 1,
        StepStatus::Cancelled if interrupted.load(std::sync::atomic::Ordering::SeqCst) => 130,
        StepStatus::Cancelled => 2,
    })
}

fn print_summary(summary: &aidp::engine::RunSummary) {
    let status = match summary.status {
        StepStatus::Completed => summary.status.to_string().green(),
        StepStatus::Cancelled => summary.status.to_string().yellow(),
        _ => summary.status.to_string().red(),
    };
    println!("\n{} after {} iteration(s)", status, summary.iterations);
    if let Some(message) = &summary.message {
        println!("  {}", message);
    }
    if let Some(error) = &summary.error {
        println!("  {}", error.red());
    }
}

async fn run_repl(config: Config, project_dir: PathBuf) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let vcs = Arc::new(GitDriver);
    let workstreams = Arc::new(WorkstreamManager::new(&project_dir, vcs.clone(), clock));
    let mut session = ReplSession::new(project_dir, workstreams, vcs, &config);
    session.run().await
}

fn show_status(project_dir: PathBuf) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let checkpoints = CheckpointManager::new(&project_dir, clock.clone());

    match checkpoints.latest()? {
        Some(checkpoint) => println!("{}", format_status_line(&checkpoint)),
        None => println!("No checkpoints recorded yet."),
    }
    if let Some(summary) = checkpoints.progress_summary()? {
        println!("quality score: {:.1}", summary.quality_score);
        if let Some(trends) = &summary.trends {
            for (name, trend) in trends {
                println!("  {}: {:?} ({:+.1}, {:+.1}%)", name, trend.direction, trend.change, trend.change_percent);
            }
        }
    }

    let ledger = TaskLedger::open(project_dir.join(".aidp"), clock);
    let counts = ledger.counts()?;
    println!(
        "tasks: {} pending, {} in progress, {} done, {} abandoned",
        counts.pending, counts.in_progress, counts.done, counts.abandoned
    );
    Ok(())
}

fn show_tasks(project_dir: PathBuf, command: TasksCommand) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ledger = TaskLedger::open(project_dir.join(".aidp"), clock);

    match command {
        TasksCommand::List { status } => {
            let filter = TaskFilter {
                status: status
                    .map(|s| s.parse::<TaskStatus>().map_err(|e| eyre!(e)))
                    .transpose()?,
                ..Default::default()
            };
            let tasks = ledger.all(&filter)?;
            if tasks.is_empty() {
                println!("No tasks.");
            }
            for task in tasks {
                println!(
                    "{}  [{}] {} ({})",
                    task.id,
                    task.status,
                    task.description,
                    task.priority
                );
            }
        }
        TasksCommand::Counts => {
            let counts = ledger.counts()?;
            println!(
                "pending: {}\nin_progress: {}\ndone: {}\nabandoned: {}\ntotal: {}",
                counts.pending,
                counts.in_progress,
                counts.done,
                counts.abandoned,
                counts.total()
            );
        }
    }
    Ok(())
}

async fn manage_workstreams(project_dir: PathBuf, command: WsCommand) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let manager = WorkstreamManager::new(&project_dir, Arc::new(GitDriver), clock);

    match command {
        WsCommand::List => {
            let streams = manager.list();
            if streams.is_empty() {
                println!("No workstreams.");
            }
            for ws in streams {
                println!("{}  {}  {}", ws.slug.bold(), ws.branch, ws.path.display());
            }
        }
        WsCommand::New { slug, base } => {
            let ws = manager
                .create(&slug, base.as_deref())
                .await
                .map_err(|e| eyre!(e.to_string()))?;
            println!("Created {} at {}", ws.slug.bold(), ws.path.display());
        }
        WsCommand::Rm { slug, delete_branch } => {
            manager
                .remove(&slug, delete_branch)
                .await
                .map_err(|e| eyre!(e.to_string()))?;
            println!("Removed {}", slug.bold());
        }
    }
    Ok(())
}
