//! Real agent/monitor pipelines using `sh` scripts
//!
//! The agent script receives `--model <m> <prompt>` as positional arguments and
//! ignores them; the monitor script receives the workspace path.

#![cfg(unix)]

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use relayr::config::Config;
use relayr::controller::{IterationController, interrupt_flag};
use relayr::domain::{EventKind, RunOutcome};
use relayr::state::StateDir;
use relayr::supervisor::ProcessSupervisor;
use tempfile::TempDir;

const DEADLINE: Duration = Duration::from_secs(20);

fn pipeline_config(agent_script: &str, monitor_script: &str) -> Config {
    let mut config = Config::default();
    config.agent.command = "sh".to_string();
    config.agent.args = vec!["-c".to_string(), agent_script.to_string(), "agent".to_string()];
    config.monitor.command = "sh".to_string();
    config.monitor.args = vec!["-c".to_string(), monitor_script.to_string(), "monitor".to_string()];
    config.run.require_git = false;
    config.run.iteration_pause_ms = 0;
    config.run.heartbeat_secs = 0;
    config.run.max_iterations = 1;
    config
}

async fn run_pipeline(temp: &TempDir, config: Config) -> RunOutcome {
    let supervisor = Arc::new(ProcessSupervisor::new(&config, temp.path()));
    let mut controller = IterationController::new(config, temp.path(), supervisor)
        .unwrap()
        .with_narration(false);
    tokio::time::timeout(DEADLINE, controller.run())
        .await
        .expect("pipeline did not finish in time")
        .unwrap()
}

fn session_kinds(temp: &TempDir) -> Vec<EventKind> {
    StateDir::new(temp.path().join(".ralph"))
        .session_log()
        .read_all()
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect()
}

#[tokio::test]
async fn test_agent_completes_task() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("RALPH_TASK.md"), "- [ ] write file\n").unwrap();
    let config = pipeline_config(
        "printf -- '- [x] write file\\n' > RALPH_TASK.md; echo finished",
        "cat > /dev/null",
    );

    let outcome = run_pipeline(&temp, config).await;

    assert_eq!(outcome, RunOutcome::Complete { iterations: 1 });
    assert_eq!(
        session_kinds(&temp),
        vec![EventKind::SessionStarted, EventKind::SessionEndedComplete]
    );
    let activity = fs::read_to_string(temp.path().join(".ralph/activity.log")).unwrap();
    assert!(activity.contains("finished"));
}

#[tokio::test]
async fn test_rotate_terminates_long_running_agent() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("RALPH_TASK.md"), "- [ ] a\n").unwrap();
    let config = pipeline_config(
        "echo tokens=81000; exec sleep 30",
        "read line; echo 'ROTATE budget spent'; cat > /dev/null",
    );

    let outcome = run_pipeline(&temp, config).await;

    assert_eq!(outcome, RunOutcome::MaxIterations { iterations: 1 });
    assert_eq!(
        session_kinds(&temp),
        vec![
            EventKind::SessionStarted,
            EventKind::SessionEndedRotated,
            EventKind::MaxIterationsExceeded,
        ]
    );
}

#[tokio::test]
async fn test_gutter_with_agent_errors() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("RALPH_TASK.md"), "- [ ] a\n").unwrap();
    let config = pipeline_config(
        "echo 'cannot find module' >&2; echo attempt",
        "read line; echo 'GUTTER: same failure three times'; cat > /dev/null",
    );

    let outcome = run_pipeline(&temp, config).await;

    assert_eq!(outcome, RunOutcome::Gutter { iteration: 1 });
    let errors = fs::read_to_string(temp.path().join(".ralph/errors.log")).unwrap();
    assert!(errors.contains("cannot find module"));
}

#[tokio::test]
async fn test_warn_is_advisory() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("RALPH_TASK.md"), "- [ ] a\n- [ ] b\n").unwrap();
    let config = pipeline_config(
        "echo step; printf -- '- [x] a\\n- [x] b\\n' > RALPH_TASK.md",
        "read line; echo WARN; cat > /dev/null",
    );

    let outcome = run_pipeline(&temp, config).await;

    assert_eq!(outcome, RunOutcome::Complete { iterations: 1 });
}

#[tokio::test]
async fn test_monitor_ignores_noise() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("RALPH_TASK.md"), "- [ ] a\n").unwrap();
    let config = pipeline_config("echo hello", "echo 'tokens: 12'; echo warning-ish; cat > /dev/null");

    let outcome = run_pipeline(&temp, config).await;

    assert_eq!(outcome, RunOutcome::MaxIterations { iterations: 1 });
    assert!(session_kinds(&temp).contains(&EventKind::SessionEndedNatural));
}

#[tokio::test]
async fn test_interrupt_kills_agent_and_monitor() {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("RALPH_TASK.md"), "- [ ] a\n").unwrap();
    let config = pipeline_config(
        "echo $$ > agent.pid; echo working; exec sleep 30",
        "echo $$ > monitor.pid; cat > /dev/null",
    );
    let supervisor = Arc::new(ProcessSupervisor::new(&config, temp.path()));
    let (raise, flag) = interrupt_flag();
    let mut controller = IterationController::new(config, temp.path(), supervisor)
        .unwrap()
        .with_narration(false)
        .with_interrupt(flag);

    let waiter = temp.path().join("agent.pid");
    tokio::spawn(async move {
        while !waiter.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        raise.send_replace(true);
    });

    let outcome = tokio::time::timeout(DEADLINE, controller.run())
        .await
        .expect("interrupted pipeline did not stop in time")
        .unwrap();

    assert_eq!(outcome, RunOutcome::Interrupted { iteration: 1 });
    assert_eq!(session_kinds(&temp).last(), Some(&EventKind::SessionEndedInterrupted));

    for name in ["agent.pid", "monitor.pid"] {
        let pid: i32 = fs::read_to_string(temp.path().join(name)).unwrap().trim().parse().unwrap();
        assert!(kill(Pid::from_raw(pid), None).is_err(), "{} {} still alive", name, pid);
    }
}
