//! End-to-end work-loop scenarios driven through scripted collaborators.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use aidp::clock::ManualClock;
use aidp::config::{CommandCategory, CommandPhase, Config, PostCommand};
use aidp::engine::{AsyncRunner, EngineContext, EngineState, FixForwardEngine, LoopPhase, StepStatus};
use aidp::exec::mock::{NoopSleeper, ScriptedAgent, ScriptedRunner, ScriptedTurn};
use aidp::exec::{AgentResult, CommandRunner};
use aidp::tasks::CreateOptions;
use tempfile::tempdir;

fn rspec_command() -> PostCommand {
    PostCommand {
        name: "rspec".to_string(),
        command: "bundle exec rspec".to_string(),
        phase: CommandPhase::EachUnit,
        category: CommandCategory::Tests,
        required: true,
    }
}

fn config_with_tests(max_iterations: u32) -> Config {
    let mut config = Config::default();
    config.harness.max_iterations = max_iterations;
    config.work_loop.commands = vec![rspec_command()];
    config
}

fn engine(
    dir: &Path,
    config: Config,
    agent: ScriptedAgent,
    runner: Arc<dyn CommandRunner>,
) -> FixForwardEngine {
    FixForwardEngine::new(
        config,
        EngineContext {
            project_dir: dir.to_path_buf(),
            working_dir: dir.to_path_buf(),
        },
        Arc::new(agent),
        runner,
        Arc::new(ManualClock::default()),
        Arc::new(NoopSleeper::new()),
    )
}

// S1: the agent completes on the first iteration, every command passes, and
// the ledger is empty.
#[tokio::test]
async fn success_in_one_iteration_archives_prompt() {
    let temp = tempdir().unwrap();
    let agent = ScriptedAgent::completing("Implemented the feature.\nSTATUS: COMPLETE\n");
    let runner = Arc::new(ScriptedRunner::new().on_status("rspec", 0, "12 examples, 0 failures"));

    let mut engine = engine(temp.path(), config_with_tests(10), agent, runner);
    let state = engine.state();
    state.transition(LoopPhase::Running).unwrap();

    let outcome = engine.execute_step("16_IMPLEMENTATION", "Build the feature.").await.unwrap();

    assert_eq!(outcome.status, StepStatus::Completed);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(state.phase(), LoopPhase::Completed);

    // Prompt archived and the working copy deleted.
    assert!(!temp.path().join(".aidp/PROMPT.md").exists());
    let archive_dir = temp.path().join(".aidp/prompt_archive");
    let archived: Vec<_> = std::fs::read_dir(&archive_dir).unwrap().collect();
    assert_eq!(archived.len(), 1);
    let name = archived[0].as_ref().unwrap().file_name().to_string_lossy().to_string();
    assert!(name.ends_with("_16_IMPLEMENTATION_PROMPT.md"));

    // A final checkpoint was recorded.
    assert!(temp.path().join(".aidp/checkpoint.yml").exists());
}

// S2: tests fail once with "spec fail", then pass; the second prompt carries
// the fix-forward block and the state history shows the failure path.
#[tokio::test]
async fn fail_then_fix_then_pass() {
    let temp = tempdir().unwrap();
    let agent = ScriptedAgent::new(vec![
        ScriptedTurn::Result(AgentResult::completed("First attempt.")),
        ScriptedTurn::Result(AgentResult::completed("Fixed it.\nSTATUS: COMPLETE")),
    ]);
    let runner = Arc::new(
        ScriptedRunner::new()
            .on_status("rspec", 1, "spec fail")
            .on_status("rspec", 0, "all green"),
    );

    let mut engine = engine(temp.path(), config_with_tests(10), agent, runner);
    let state = engine.state();
    state.transition(LoopPhase::Running).unwrap();

    // Keep a handle on the agent to inspect prompts afterwards.
    let outcome = engine.execute_step("16_IMPLEMENTATION", "Make the specs pass.").await.unwrap();

    assert_eq!(outcome.status, StepStatus::Completed);
    assert_eq!(outcome.iterations, 2);

    let iteration_one: Vec<_> = engine
        .state_history()
        .iter()
        .filter(|t| t.iteration == 1)
        .map(|t| t.to)
        .collect();
    assert!(iteration_one.contains(&EngineState::Fail));
    assert!(iteration_one.contains(&EngineState::Diagnose));
    assert!(iteration_one.contains(&EngineState::NextPatch));

    let done: Vec<_> = engine.state_history().iter().filter(|t| t.to == EngineState::Done).collect();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].iteration, 2);
}

// S2 (prompt side): the iteration-2 prompt contains the fix-forward header,
// the literal phrases, and the failing output.
#[tokio::test]
async fn fix_forward_block_reaches_next_prompt() {
    let temp = tempdir().unwrap();
    let agent = Arc::new(ScriptedAgent::new(vec![
        ScriptedTurn::Result(AgentResult::completed("First attempt.")),
        ScriptedTurn::Result(AgentResult::completed("STATUS: COMPLETE")),
    ]));
    let runner = Arc::new(
        ScriptedRunner::new()
            .on_status("rspec", 1, "spec fail")
            .on_status("rspec", 0, "all green"),
    );

    let mut engine = FixForwardEngine::new(
        config_with_tests(10),
        EngineContext {
            project_dir: temp.path().to_path_buf(),
            working_dir: temp.path().to_path_buf(),
        },
        agent.clone(),
        runner,
        Arc::new(ManualClock::default()),
        Arc::new(NoopSleeper::new()),
    );
    engine.state().transition(LoopPhase::Running).unwrap();
    engine.execute_step("STEP", "Make the specs pass.").await.unwrap();

    let prompts = agent.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("Fix-Forward Iteration 1"));
    assert!(prompts[1].contains("Fix-forward"));
    assert!(prompts[1].contains("Do not rollback"));
    assert!(prompts[1].contains("spec fail"));
    assert!(prompts[1].contains("- `bundle exec rspec`"));
}

// S3: tests never pass; the loop terminates at MAX_ITERATIONS + 1.
#[tokio::test]
async fn max_iterations_exhaustion() {
    let temp = tempdir().unwrap();
    let agent = ScriptedAgent::completing("Still trying.");
    let runner = Arc::new(ScriptedRunner::new().on_status("rspec", 1, "always failing"));

    let mut engine = engine(temp.path(), config_with_tests(3), agent, runner);
    let state = engine.state();
    state.transition(LoopPhase::Running).unwrap();

    let outcome = engine.execute_step("STEP", "Try forever.").await.unwrap();

    assert_eq!(outcome.status, StepStatus::Error);
    assert_eq!(outcome.iterations, 4, "MAX_ITERATIONS + 1");
    assert_eq!(outcome.message.as_deref(), Some("Maximum iterations reached"));
    assert!(outcome.error.unwrap().contains("did not complete within 3 iterations"));

    assert_eq!(state.phase(), LoopPhase::Error);
    assert!(!temp.path().join(".aidp/PROMPT.md").exists(), "prompt archived and deleted");
    assert!(temp.path().join(".aidp/prompt_archive").exists());
}

// S4: the first agent call raises; the loop recovers and completes.
#[tokio::test]
async fn agent_exception_recovery() {
    let temp = tempdir().unwrap();
    let agent = Arc::new(ScriptedAgent::new(vec![
        ScriptedTurn::Failure("Network timeout".to_string()),
        ScriptedTurn::Result(AgentResult::completed("Recovered.\nSTATUS: COMPLETE")),
    ]));
    let runner = Arc::new(ScriptedRunner::new().on_status("rspec", 0, "green"));

    let mut engine = FixForwardEngine::new(
        config_with_tests(10),
        EngineContext {
            project_dir: temp.path().to_path_buf(),
            working_dir: temp.path().to_path_buf(),
        },
        agent.clone(),
        runner,
        Arc::new(ManualClock::default()),
        Arc::new(NoopSleeper::new()),
    );
    engine.state().transition(LoopPhase::Running).unwrap();

    let outcome = engine.execute_step("STEP", "Survive the timeout.").await.unwrap();
    assert_eq!(outcome.status, StepStatus::Completed);
    assert_eq!(outcome.iterations, 2);

    // The second prompt carries the exception block.
    let prompts = agent.prompts();
    assert!(prompts[1].contains("Fix-Forward Exception"));
    assert!(prompts[1].contains("AgentCallFailure"));
    assert!(prompts[1].contains("Network timeout"));

    // apply_patch was re-entered on the second iteration.
    let applies: Vec<_> = engine
        .state_history()
        .iter()
        .filter(|t| t.to == EngineState::ApplyPatch)
        .map(|t| t.iteration)
        .collect();
    assert_eq!(applies, vec![1, 2]);
}

// S6: the task gate blocks completion while a task is pending, then lets the
// step finish once the agent resolves it.
#[tokio::test]
async fn task_gate_blocks_then_releases() {
    let temp = tempdir().unwrap();
    let mut config = config_with_tests(5);
    config.harness.task_completion_required = true;

    // A pending task filed before the step starts (the gate is
    // project-scoped, not session-scoped).
    let clock = Arc::new(ManualClock::default());
    let ledger = Arc::new(aidp::tasks::TaskLedger::open(
        temp.path().join(".aidp"),
        clock.clone(),
    ));
    let task = ledger.create("wire the error path", CreateOptions::default()).unwrap();

    let agent = Arc::new(ScriptedAgent::new(vec![
        ScriptedTurn::Result(AgentResult::completed("Looks done to me.\nSTATUS: COMPLETE")),
        ScriptedTurn::Result(AgentResult::completed(format!(
            "Update task: {} status: done\nSTATUS: COMPLETE",
            task.id
        ))),
    ]));
    let runner = Arc::new(ScriptedRunner::new().on_status("rspec", 0, "green"));

    let mut engine = FixForwardEngine::new(
        config,
        EngineContext {
            project_dir: temp.path().to_path_buf(),
            working_dir: temp.path().to_path_buf(),
        },
        agent.clone(),
        runner,
        clock,
        Arc::new(NoopSleeper::new()),
    )
    .with_ledger(ledger.clone());
    engine.state().transition(LoopPhase::Running).unwrap();

    let outcome = engine.execute_step("STEP", "Finish the work.").await.unwrap();

    // Iteration 1 was blocked, iteration 2 resolved the task and completed.
    assert_eq!(outcome.status, StepStatus::Completed);
    assert_eq!(outcome.iterations, 2);

    let prompts = agent.prompts();
    assert!(prompts[1].contains("Completion Blocked"));
    assert!(prompts[1].contains(&task.id));

    let resolved = ledger.find(&task.id).unwrap().unwrap();
    assert_eq!(resolved.status, aidp::domain::TaskStatus::Done);
}

// S6 (hard stop): with the gate on and nobody resolving the task, the step
// never reaches `done` and exhausts its iterations instead.
#[tokio::test]
async fn task_gate_never_allows_done_with_open_tasks() {
    let temp = tempdir().unwrap();
    let mut config = config_with_tests(2);
    config.harness.task_completion_required = true;

    let clock = Arc::new(ManualClock::default());
    let ledger = Arc::new(aidp::tasks::TaskLedger::open(
        temp.path().join(".aidp"),
        clock.clone(),
    ));
    ledger.create("never resolved", CreateOptions::default()).unwrap();

    let agent = ScriptedAgent::completing("STATUS: COMPLETE");
    let runner: Arc<dyn CommandRunner> = Arc::new(ScriptedRunner::new().on_status("rspec", 0, "green"));

    let mut engine = FixForwardEngine::new(
        config,
        EngineContext {
            project_dir: temp.path().to_path_buf(),
            working_dir: temp.path().to_path_buf(),
        },
        Arc::new(agent),
        runner,
        clock,
        Arc::new(NoopSleeper::new()),
    )
    .with_ledger(ledger);
    engine.state().transition(LoopPhase::Running).unwrap();

    let outcome = engine.execute_step("STEP", "Claim victory early.").await.unwrap();
    assert_eq!(outcome.status, StepStatus::Error);
    assert!(!engine.state_history().iter().any(|t| t.to == EngineState::Done));
}

// S7: a running worker cancelled from outside lands in `cancelled` within an
// iteration boundary and records a final checkpoint.
#[tokio::test]
async fn repl_cancel_is_cooperative_and_checkpoints() {
    let temp = tempdir().unwrap();
    let mut config = config_with_tests(u32::MAX);
    config.work_loop.commands = vec![rspec_command()];
    let agent = ScriptedAgent::completing("never finishes");
    let runner_cmds = Arc::new(ScriptedRunner::new().on_status("rspec", 1, "failing"));

    let engine = engine(temp.path(), config, agent, runner_cmds);
    let runner = AsyncRunner::new(engine);

    runner.execute_step_async("STEP", "Run until told otherwise.").await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    runner.cancel(true).unwrap();

    let summary = runner.wait().await;
    assert_eq!(summary.status, StepStatus::Cancelled);
    assert!(temp.path().join(".aidp/checkpoint.yml").exists());
    assert!(!temp.path().join(".aidp/PROMPT.md").exists());
}

// S7 (no checkpoint): cancel(save_checkpoint=false) skips the final snapshot.
#[tokio::test]
async fn cancel_without_checkpoint() {
    let temp = tempdir().unwrap();
    let mut config = Config::default();
    config.harness.max_iterations = u32::MAX;
    let agent = ScriptedAgent::completing("spinning");

    let engine = engine(temp.path(), config, agent, Arc::new(ScriptedRunner::new()));
    let runner = AsyncRunner::new(engine);

    runner.execute_step_async("STEP", "spin").await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    runner.cancel(false).unwrap();

    let summary = runner.wait().await;
    assert_eq!(summary.status, StepStatus::Cancelled);
    assert!(!temp.path().join(".aidp/checkpoint.yml").exists());
}

// Instructions enqueued before an iteration boundary reach that iteration's
// prompt, formatted and grouped.
#[tokio::test]
async fn injected_instructions_reach_the_prompt() {
    let temp = tempdir().unwrap();
    let agent = Arc::new(ScriptedAgent::new(vec![ScriptedTurn::Result(AgentResult::completed(
        "STATUS: COMPLETE",
    ))]));

    let engine = FixForwardEngine::new(
        config_with_tests(5),
        EngineContext {
            project_dir: temp.path().to_path_buf(),
            working_dir: temp.path().to_path_buf(),
        },
        agent.clone(),
        Arc::new(ScriptedRunner::new().on_status("rspec", 0, "green")),
        Arc::new(ManualClock::default()),
        Arc::new(NoopSleeper::new()),
    );
    let queue = engine.queue();
    queue.enqueue(
        "do not touch the migrations",
        aidp::domain::InstructionKind::Constraint,
        aidp::domain::InstructionPriority::Critical,
    );

    let runner = AsyncRunner::new(engine);
    runner.execute_step_async("STEP", "base prompt").await.unwrap();
    let summary = runner.wait().await;
    assert_eq!(summary.status, StepStatus::Completed);

    let prompts = agent.prompts();
    assert!(prompts[0].contains("## User Instructions"));
    assert!(prompts[0].contains("**[CRITICAL]** do not touch the migrations"));
}

// S8: the engine runs inside the workstream path selected through the REPL.
#[tokio::test]
async fn workstream_scopes_the_working_directory() {
    use aidp::config::ThinkingConfig;
    use aidp::exec::mock::FakeVcs;
    use aidp::repl::ReplMacroInterpreter;
    use aidp::workstream::WorkstreamManager;

    let temp = tempdir().unwrap();
    let vcs = Arc::new(FakeVcs::new());
    let clock = Arc::new(ManualClock::default());
    let workstreams = Arc::new(WorkstreamManager::new(temp.path(), vcs.clone(), clock.clone()));
    let mut repl = ReplMacroInterpreter::new(temp.path(), workstreams, vcs, &ThinkingConfig::default());

    assert!(repl.execute("/ws new issue-42").await.success);
    assert!(repl.execute("/ws switch issue-42").await.success);
    let working_dir = repl.current_path();
    assert!(working_dir.ends_with(".worktrees/issue-42"));
    std::fs::create_dir_all(&working_dir).unwrap();

    let agent = Arc::new(ScriptedAgent::completing("STATUS: COMPLETE"));
    let mut engine = FixForwardEngine::new(
        Config::default(),
        EngineContext {
            project_dir: temp.path().to_path_buf(),
            working_dir: working_dir.clone(),
        },
        agent.clone(),
        Arc::new(ScriptedRunner::new()),
        clock,
        Arc::new(NoopSleeper::new()),
    );
    engine.state().transition(LoopPhase::Running).unwrap();
    engine.execute_step("STEP", "isolated work").await.unwrap();

    let prompts = agent.prompts();
    assert!(prompts[0].contains(".worktrees/issue-42"), "prompt names the worktree dir");

    // Removing the current workstream is refused until another is current.
    assert!(!repl.execute("/ws rm issue-42").await.success);
}
