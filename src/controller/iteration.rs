//! IterationController - supervises the agent across context rotations.
//!
//! Each iteration:
//! 1. Bumps the persisted counter and renders a fresh prompt
//! 2. Launches the agent/monitor pipeline
//! 3. Consumes signals until the channel closes (ROTATE or an operator
//!    interrupt terminates early)
//! 4. Re-reads the task document and resolves the iteration outcome
//! 5. Ends the run or loops with a fresh iteration

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use colored::*;
use log::{debug, error, info, warn};

use super::heartbeat::Heartbeat;
use super::interrupt::{InterruptFlag, interrupted};
use crate::config::Config;
use crate::coordination::{SignalReceiver, signal_channel};
use crate::domain::{ControllerState, EventKind, IterationOutcome, RunOutcome, SignalKind};
use crate::error::{RelayrError, Result};
use crate::prompt::{PromptContext, PromptRenderer};
use crate::state::{IterationCounter, SessionLog, StateDir};
use crate::supervisor::{Launch, PipelineExit, PipelineHandle, Supervisor};
use crate::task::{TaskProgress, TaskStore};

/// How one iteration ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationReport {
    /// Persisted counter value of this iteration
    pub iteration: u64,
    pub outcome: IterationOutcome,
    /// Task progress observed after the pipeline stopped
    pub progress: TaskProgress,
    pub warnings: usize,
    /// Signals still queued when the channel was closed
    pub discarded: usize,
    pub exit: Option<PipelineExit>,
}

/// Signals consumed during one iteration.
#[derive(Debug, Default)]
struct SignalSummary {
    recorded: Option<SignalKind>,
    warnings: usize,
    interrupted: bool,
}

pub struct IterationController<S: Supervisor> {
    config: Config,
    supervisor: Arc<S>,
    task: TaskStore,
    state: StateDir,
    counter: IterationCounter,
    session_log: SessionLog,
    renderer: PromptRenderer,
    resume_token: Option<String>,
    interrupt: Option<InterruptFlag>,
    narrate: bool,
    current: ControllerState,
    history: Vec<ControllerState>,
    reports: Vec<IterationReport>,
}

impl<S: Supervisor> IterationController<S> {
    pub fn new(config: Config, workspace: &Path, supervisor: Arc<S>) -> Result<Self> {
        config.validate().map_err(|e| RelayrError::Config(e.to_string()))?;
        let task = TaskStore::new(config.paths.task_path(workspace));
        let state = StateDir::new(config.paths.state_path(workspace));
        Ok(Self {
            counter: state.counter(),
            session_log: state.session_log(),
            renderer: PromptRenderer::new()?,
            config,
            supervisor,
            task,
            state,
            resume_token: None,
            interrupt: None,
            narrate: true,
            current: ControllerState::Starting,
            history: vec![ControllerState::Starting],
            reports: Vec::new(),
        })
    }

    /// Seed the first iteration with an agent session token.
    pub fn with_resume_token(mut self, token: Option<String>) -> Self {
        self.resume_token = token;
        self
    }

    /// Stop the run, tearing down the live pipeline, once `flag` is raised.
    pub fn with_interrupt(mut self, flag: InterruptFlag) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Enable or disable console narration. Logging is unaffected.
    pub fn with_narration(mut self, narrate: bool) -> Self {
        self.narrate = narrate;
        self
    }

    pub fn state(&self) -> ControllerState {
        self.current
    }

    /// Every state visited so far, oldest first.
    pub fn history(&self) -> &[ControllerState] {
        &self.history
    }

    pub fn reports(&self) -> &[IterationReport] {
        &self.reports
    }

    pub fn task_path(&self) -> &Path {
        self.task.path()
    }

    pub fn state_dir(&self) -> &StateDir {
        &self.state
    }

    /// Drive iterations until the run reaches a terminal state.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        if !self.task.exists() {
            return Err(RelayrError::TaskNotFound(self.task.path().to_path_buf()));
        }
        self.state.ensure()?;

        let progress = self.task.progress();
        if progress.is_complete() {
            info!("Task already complete ({}), nothing to do", progress);
            self.say(format!("{} all {} criteria already done", "Complete:".green(), progress.total));
            return Ok(self.finish(RunOutcome::AlreadyComplete));
        }

        let max_iterations = self.config.run.max_iterations;
        let pause = Duration::from_millis(self.config.run.iteration_pause_ms);
        let mut started: u32 = 0;

        loop {
            if self.interrupt_raised() {
                let iteration = self.counter.load();
                warn!("Interrupted before iteration {} started", iteration + 1);
                return Ok(self.finish(RunOutcome::Interrupted { iteration }));
            }
            let iteration = self.counter.increment();
            started += 1;
            let report = self.run_iteration(iteration).await?;
            let outcome = report.outcome;
            let progress = report.progress;
            self.reports.push(report);

            match outcome {
                IterationOutcome::Complete => {
                    self.transition(ControllerState::Complete);
                    self.session_log.append(
                        iteration,
                        EventKind::SessionEndedComplete,
                        format!("criteria {}", progress),
                    );
                    info!("Iteration {} completed the task ({})", iteration, progress);
                    self.say(format!(
                        "{} all {} criteria done after {} iteration(s)",
                        "Complete:".green(),
                        progress.total,
                        started
                    ));
                    return Ok(self.finish(RunOutcome::Complete { iterations: started }));
                }
                IterationOutcome::Gutter => {
                    self.transition(ControllerState::Guttered);
                    self.session_log.append(
                        iteration,
                        EventKind::SessionEndedGutter,
                        format!("criteria {}", progress),
                    );
                    error!("Iteration {} guttered with {} criteria remaining", iteration, progress.remaining());
                    self.say(format!("{} agent is stuck on iteration {}", "Gutter:".red(), iteration));
                    for path in operator_paths(&self.state) {
                        self.say(format!("  review {}", path.display()));
                    }
                    return Ok(self.finish(RunOutcome::Gutter { iteration }));
                }
                IterationOutcome::Rotate => {
                    self.transition(ControllerState::Rotating);
                    self.session_log.append(
                        iteration,
                        EventKind::SessionEndedRotated,
                        format!("criteria {}", progress),
                    );
                    info!("Iteration {} rotated ({})", iteration, progress);
                    self.say(format!("{} context budget spent, starting fresh", "Rotate:".yellow()));
                }
                IterationOutcome::Interrupted => {
                    self.session_log.append(
                        iteration,
                        EventKind::SessionEndedInterrupted,
                        format!("criteria {}", progress),
                    );
                    warn!("Iteration {} interrupted ({})", iteration, progress);
                    self.say(format!("{} pipeline stopped on request", "Interrupted:".red()));
                    return Ok(self.finish(RunOutcome::Interrupted { iteration }));
                }
                IterationOutcome::Natural => {
                    self.transition(ControllerState::Continuing);
                    self.session_log.append(
                        iteration,
                        EventKind::SessionEndedNatural,
                        format!("criteria {}", progress),
                    );
                    info!("Iteration {} exited with {} criteria remaining", iteration, progress.remaining());
                    self.say(format!(
                        "{} agent exited, {} criteria remaining",
                        "Continue:".cyan(),
                        progress.remaining()
                    ));
                }
            }

            if started >= max_iterations {
                self.session_log.append(
                    iteration,
                    EventKind::MaxIterationsExceeded,
                    format!("limit {}", max_iterations),
                );
                warn!("Reached max iterations ({}) with criteria remaining", max_iterations);
                self.say(format!("{} reached {} iterations", "Stopped:".red(), max_iterations));
                return Ok(self.finish(RunOutcome::MaxIterations { iterations: started }));
            }

            let mut interrupt = self.interrupt.clone();
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = interrupted(&mut interrupt) => {
                    warn!("Interrupted between iterations after {}", iteration);
                    self.say(format!("{} stopped before the next iteration", "Interrupted:".red()));
                    return Ok(self.finish(RunOutcome::Interrupted { iteration }));
                }
            }
            self.transition(ControllerState::Starting);
        }
    }

    async fn run_iteration(&mut self, iteration: u64) -> Result<IterationReport> {
        let prompt = self.renderer.render(&PromptContext::new(&self.config, iteration))?;
        let launch = Launch::new(iteration, prompt).with_resume(self.resume_token.take());
        let resumed = launch.resume_token.is_some();

        let (sender, mut receiver) = signal_channel(iteration);
        let mut handle = self.supervisor.start(launch, sender).await?;
        self.transition(ControllerState::Running);

        let detail = if resumed {
            format!("model={} resumed", self.config.agent.model)
        } else {
            format!("model={}", self.config.agent.model)
        };
        self.session_log.append(iteration, EventKind::SessionStarted, detail);
        info!("Iteration {} started", iteration);
        self.say(format!("{} {}", "Iteration".bold(), iteration));

        let heartbeat = if self.narrate {
            Heartbeat::start(iteration, Duration::from_secs(self.config.run.heartbeat_secs))
        } else {
            Heartbeat::disabled()
        };

        let summary = self.consume_signals(&mut receiver, &handle).await;
        let exit = self.await_pipeline(&mut handle, iteration).await;
        debug!("Iteration {} received {} signal(s)", iteration, receiver.received());
        let discarded = receiver.close();
        drop(receiver);
        heartbeat.stop();

        if discarded > 0 {
            debug!("Discarded {} queued signal(s) from iteration {}", discarded, iteration);
        }

        let progress = self.task.progress();
        let outcome = if summary.interrupted && !progress.is_complete() {
            IterationOutcome::Interrupted
        } else {
            IterationOutcome::resolve(summary.recorded, progress.is_complete())
        };
        debug!(
            "Iteration {} resolved to {} (signal={:?}, criteria {})",
            iteration, outcome, summary.recorded, progress
        );

        Ok(IterationReport {
            iteration,
            outcome,
            progress,
            warnings: summary.warnings,
            discarded,
            exit,
        })
    }

    /// Read signals until the producer finishes, a ROTATE arrives or the
    /// operator interrupts the supervisor.
    async fn consume_signals(&self, receiver: &mut SignalReceiver, handle: &PipelineHandle) -> SignalSummary {
        let mut summary = SignalSummary::default();
        let mut interrupt = self.interrupt.clone();
        let iteration = receiver.iteration();

        loop {
            let signal = tokio::select! {
                signal = receiver.recv() => signal,
                _ = interrupted(&mut interrupt) => {
                    warn!("Interrupt during iteration {}, terminating pipeline", iteration);
                    summary.interrupted = true;
                    handle.terminate();
                    break;
                }
            };
            let Some(signal) = signal else {
                break;
            };
            let detail = signal.detail.as_deref().unwrap_or("");
            match signal.kind {
                SignalKind::Warn => {
                    summary.warnings += 1;
                    info!("WARN from monitor in iteration {} {}", iteration, detail);
                    self.say(format!("{} context budget running low {}", "Warn:".yellow(), detail));
                }
                SignalKind::Gutter => {
                    // A later ROTATE still wins
                    summary.recorded = Some(SignalKind::Gutter);
                    warn!("GUTTER from monitor in iteration {} {}", iteration, detail);
                }
                SignalKind::Rotate => {
                    summary.recorded = Some(SignalKind::Rotate);
                    info!("ROTATE from monitor in iteration {} {}", iteration, detail);
                    handle.terminate();
                    break;
                }
            }
        }

        summary
    }

    async fn await_pipeline(&self, handle: &mut PipelineHandle, iteration: u64) -> Option<PipelineExit> {
        match handle.wait().await {
            Ok(exit) => {
                debug!(
                    "Iteration {} pipeline exited: {:?} (terminate requested: {})",
                    iteration,
                    exit,
                    handle.is_terminating()
                );
                Some(exit)
            }
            Err(e) => {
                warn!("Iteration {} pipeline failed: {}", iteration, e);
                None
            }
        }
    }

    fn interrupt_raised(&self) -> bool {
        self.interrupt.as_ref().is_some_and(|flag| *flag.borrow())
    }

    fn finish(&mut self, outcome: RunOutcome) -> RunOutcome {
        self.transition(ControllerState::Terminal(outcome));
        outcome
    }

    fn transition(&mut self, next: ControllerState) {
        if !self.current.can_transition_to(&next) {
            warn!("Unexpected controller transition {} -> {}", self.current, next);
        }
        debug!("Controller {} -> {}", self.current, next);
        self.current = next;
        self.history.push(next);
    }

    fn say(&self, message: String) {
        if self.narrate {
            println!("{}", message);
        }
    }
}

/// Paths an operator should inspect after a run.
pub fn operator_paths(state: &StateDir) -> Vec<PathBuf> {
    vec![state.guardrails_path(), state.errors_path(), state.session_log_path()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::coordination::SignalSender;
    use crate::domain::Signal;
    use crate::supervisor::termination_requested;

    /// Scripted behaviour of one fake iteration.
    #[derive(Clone)]
    struct Script {
        signals: Vec<Signal>,
        task_after: Option<String>,
        hang_until_killed: bool,
    }

    struct FakeSupervisor {
        task_path: PathBuf,
        scripts: Mutex<Vec<Script>>,
        launches: Mutex<Vec<Launch>>,
    }

    impl FakeSupervisor {
        fn new(task_path: PathBuf, scripts: Vec<Script>) -> Self {
            Self {
                task_path,
                scripts: Mutex::new(scripts),
                launches: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Supervisor for FakeSupervisor {
        async fn start(&self, launch: Launch, signals: SignalSender) -> Result<PipelineHandle> {
            self.launches.lock().unwrap().push(launch);
            let script = {
                let mut scripts = self.scripts.lock().unwrap();
                if scripts.is_empty() {
                    Script {
                        signals: Vec::new(),
                        task_after: None,
                        hang_until_killed: false,
                    }
                } else {
                    scripts.remove(0)
                }
            };
            let task_path = self.task_path.clone();
            Ok(PipelineHandle::spawn(move |mut kill| async move {
                if let Some(content) = &script.task_after {
                    fs::write(&task_path, content).unwrap();
                }
                for signal in script.signals {
                    signals.send(signal);
                }
                if script.hang_until_killed {
                    termination_requested(&mut kill).await;
                    drop(signals);
                    return PipelineExit::terminated(None);
                }
                drop(signals);
                PipelineExit::exited(Some(0))
            }))
        }
    }

    fn script(signals: Vec<Signal>, task_after: Option<&str>, hang: bool) -> Script {
        Script {
            signals,
            task_after: task_after.map(str::to_string),
            hang_until_killed: hang,
        }
    }

    fn setup(task: &str) -> (TempDir, Config) {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("RALPH_TASK.md"), task).unwrap();
        let mut config = Config::default();
        config.run.iteration_pause_ms = 0;
        config.run.heartbeat_secs = 0;
        (temp, config)
    }

    fn controller(temp: &TempDir, config: Config, scripts: Vec<Script>) -> IterationController<FakeSupervisor> {
        let fake = Arc::new(FakeSupervisor::new(temp.path().join("RALPH_TASK.md"), scripts));
        IterationController::new(config, temp.path(), fake)
            .unwrap()
            .with_narration(false)
    }

    fn logged_kinds(temp: &TempDir) -> Vec<EventKind> {
        SessionLog::new(temp.path().join(".ralph/session.log"))
            .read_all()
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect()
    }

    #[tokio::test]
    async fn test_already_complete_starts_nothing() {
        let (temp, config) = setup("- [x] a\n- [x] b\n");
        let mut ctl = controller(&temp, config, Vec::new());

        let outcome = ctl.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::AlreadyComplete);
        assert!(logged_kinds(&temp).is_empty());
        assert_eq!(ctl.state_dir().counter().load(), 0);
    }

    #[tokio::test]
    async fn test_missing_task_is_error() {
        let temp = TempDir::new().unwrap();
        let mut ctl = controller(&temp, Config::default(), Vec::new());

        let err = ctl.run().await.unwrap_err();
        assert!(matches!(err, RelayrError::TaskNotFound(_)));
        assert!(logged_kinds(&temp).is_empty());
    }

    #[tokio::test]
    async fn test_rotate_then_complete() {
        let (temp, config) = setup("- [ ] a\n- [ ] b\n");
        let scripts = vec![
            script(vec![Signal::warn(), Signal::rotate()], Some("- [x] a\n- [ ] b\n"), true),
            script(Vec::new(), Some("- [x] a\n- [x] b\n"), false),
        ];
        let mut ctl = controller(&temp, config, scripts);

        let outcome = ctl.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::Complete { iterations: 2 });
        assert_eq!(
            logged_kinds(&temp),
            vec![
                EventKind::SessionStarted,
                EventKind::SessionEndedRotated,
                EventKind::SessionStarted,
                EventKind::SessionEndedComplete,
            ]
        );
        let first = &ctl.reports()[0];
        assert_eq!(first.warnings, 1);
        assert!(first.exit.unwrap().terminated);
        assert_eq!(ctl.state_dir().counter().load(), 2);
    }

    #[tokio::test]
    async fn test_completion_wins_over_gutter() {
        let (temp, config) = setup("- [ ] a\n- [ ] b\n");
        let scripts = vec![script(vec![Signal::gutter()], Some("- [x] a\n- [x] b\n"), false)];
        let mut ctl = controller(&temp, config, scripts);

        assert_eq!(ctl.run().await.unwrap(), RunOutcome::Complete { iterations: 1 });
    }

    #[tokio::test]
    async fn test_gutter_ends_run() {
        let (temp, config) = setup("- [ ] a\n");
        let scripts = vec![script(vec![Signal::gutter().with_detail("same error 3x")], None, false)];
        let mut ctl = controller(&temp, config, scripts);

        let outcome = ctl.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::Gutter { iteration: 1 });
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(
            logged_kinds(&temp),
            vec![EventKind::SessionStarted, EventKind::SessionEndedGutter]
        );
        // GUTTER never terminates the pipeline
        assert!(!ctl.reports()[0].exit.unwrap().terminated);
    }

    #[tokio::test]
    async fn test_later_rotate_overrides_gutter() {
        let (temp, mut config) = setup("- [ ] a\n");
        config.run.max_iterations = 1;
        let scripts = vec![script(vec![Signal::gutter(), Signal::rotate()], None, true)];
        let mut ctl = controller(&temp, config, scripts);

        let outcome = ctl.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::MaxIterations { iterations: 1 });
        assert_eq!(ctl.reports()[0].outcome, IterationOutcome::Rotate);
    }

    #[tokio::test]
    async fn test_natural_exit_continues_until_cap() {
        let (temp, mut config) = setup("- [x] a\n- [ ] b\n- [ ] c\n");
        config.run.max_iterations = 3;
        let mut ctl = controller(&temp, config, Vec::new());

        let outcome = ctl.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::MaxIterations { iterations: 3 });
        let kinds = logged_kinds(&temp);
        assert_eq!(kinds.iter().filter(|k| **k == EventKind::SessionEndedNatural).count(), 3);
        assert_eq!(kinds.last(), Some(&EventKind::MaxIterationsExceeded));
    }

    #[tokio::test]
    async fn test_resume_token_only_seeds_first_iteration() {
        let (temp, mut config) = setup("- [ ] a\n");
        config.run.max_iterations = 2;
        let fake = Arc::new(FakeSupervisor::new(temp.path().join("RALPH_TASK.md"), Vec::new()));
        let mut ctl = IterationController::new(config, temp.path(), fake.clone())
            .unwrap()
            .with_narration(false)
            .with_resume_token(Some("chat-123".to_string()));

        ctl.run().await.unwrap();

        let launches = fake.launches.lock().unwrap();
        assert_eq!(launches.len(), 2);
        assert_eq!(launches[0].resume_token.as_deref(), Some("chat-123"));
        assert_eq!(launches[1].resume_token, None);
        assert!(launches[1].prompt.starts_with("# Iteration 2"));
    }

    #[tokio::test]
    async fn test_counter_continues_from_persisted_value() {
        let (temp, mut config) = setup("- [ ] a\n");
        config.run.max_iterations = 1;
        IterationCounter::new(temp.path().join(".ralph/.iteration")).store(7).unwrap();
        let mut ctl = controller(&temp, config, Vec::new());

        ctl.run().await.unwrap();

        assert_eq!(ctl.reports()[0].iteration, 8);
        assert_eq!(ctl.state_dir().counter().load(), 8);
    }

    #[tokio::test]
    async fn test_interrupt_terminates_running_pipeline() {
        let (temp, config) = setup("- [ ] a\n");
        let scripts = vec![script(Vec::new(), None, true)];
        let (raise, flag) = crate::controller::interrupt_flag();
        let mut ctl = controller(&temp, config, scripts).with_interrupt(flag);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            raise.send_replace(true);
        });

        let outcome = tokio::time::timeout(Duration::from_secs(5), ctl.run())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome, RunOutcome::Interrupted { iteration: 1 });
        assert_eq!(outcome.exit_code(), 130);
        assert!(ctl.reports()[0].exit.unwrap().terminated);
        assert_eq!(
            logged_kinds(&temp),
            vec![EventKind::SessionStarted, EventKind::SessionEndedInterrupted]
        );
        for pair in ctl.history().windows(2) {
            assert!(pair[0].can_transition_to(&pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[tokio::test]
    async fn test_interrupt_after_completion_still_completes() {
        let (temp, config) = setup("- [ ] a\n");
        let scripts = vec![script(Vec::new(), Some("- [x] a\n"), true)];
        let (raise, flag) = crate::controller::interrupt_flag();
        let mut ctl = controller(&temp, config, scripts).with_interrupt(flag);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            raise.send_replace(true);
        });

        let outcome = ctl.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::Complete { iterations: 1 });
    }

    #[tokio::test]
    async fn test_interrupt_before_start_launches_nothing() {
        let (temp, config) = setup("- [ ] a\n");
        let (raise, flag) = crate::controller::interrupt_flag();
        raise.send_replace(true);
        let mut ctl = controller(&temp, config, Vec::new()).with_interrupt(flag);

        let outcome = ctl.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::Interrupted { iteration: 0 });
        assert!(ctl.reports().is_empty());
        assert!(logged_kinds(&temp).is_empty());
        assert_eq!(ctl.state_dir().counter().load(), 0);
    }

    #[tokio::test]
    async fn test_history_follows_state_machine() {
        let (temp, mut config) = setup("- [ ] a\n");
        config.run.max_iterations = 2;
        let scripts = vec![script(vec![Signal::rotate()], None, true)];
        let mut ctl = controller(&temp, config, scripts);

        ctl.run().await.unwrap();

        for pair in ctl.history().windows(2) {
            assert!(pair[0].can_transition_to(&pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(ctl.state().is_terminal());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.run.max_iterations = 0;
        let fake = Arc::new(FakeSupervisor::new(temp.path().join("RALPH_TASK.md"), Vec::new()));

        let result = IterationController::new(config, temp.path(), fake);
        assert!(matches!(result, Err(RelayrError::Config(_))));
    }

    #[test]
    fn test_operator_paths() {
        let state = StateDir::new("/w/.ralph");
        let paths = operator_paths(&state);
        assert_eq!(paths[0], PathBuf::from("/w/.ralph/guardrails.md"));
        assert_eq!(paths[1], PathBuf::from("/w/.ralph/errors.log"));
    }
}
