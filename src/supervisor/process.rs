//! Real pipeline: agent process piped through the monitor process.
//!
//! ```text
//! agent stdout ──┬──> monitor stdin ──> monitor stdout ──> SignalSender
//!                └──> activity.log
//! agent stderr ──┬──> activity.log
//!                └──> errors.log
//! ```
//!
//! Both processes run in their own process groups so termination also takes
//! out anything they spawned.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::handle::{PipelineExit, PipelineHandle, termination_requested};
use super::{Launch, Supervisor};
use crate::config::{AgentConfig, Config, ENV_ROTATE_THRESHOLD, ENV_WARN_THRESHOLD, MonitorConfig};
use crate::coordination::SignalSender;
use crate::domain::Signal;
use crate::error::{RelayrError, Result};
use crate::state::{ActivityTrail, StateDir};

/// How long to wait for output pumps after both processes are gone.
const IO_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Exported to both processes.
pub const ENV_ITERATION: &str = "RELAYR_ITERATION";
pub const ENV_STATE_DIR: &str = "RELAYR_STATE_DIR";

/// Spawns agent + monitor pipelines with tokio processes.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    agent: AgentConfig,
    monitor: MonitorConfig,
    workspace: PathBuf,
    state: StateDir,
}

impl ProcessSupervisor {
    pub fn new(config: &Config, workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        let state = StateDir::new(config.paths.state_path(&workspace));
        Self {
            agent: config.agent.clone(),
            monitor: config.monitor.clone(),
            workspace,
            state,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Full agent argument list for a launch, prompt last.
    pub fn agent_args(&self, launch: &Launch) -> Vec<String> {
        let mut args = self.agent.args.clone();
        if !self.agent.model.is_empty() {
            args.push(self.agent.model_flag.clone());
            args.push(self.agent.model.clone());
        }
        if let Some(token) = &launch.resume_token {
            args.push(self.agent.resume_flag.clone());
            args.push(token.clone());
        }
        args.push(launch.prompt.clone());
        args
    }

    /// Full monitor argument list, workspace last.
    pub fn monitor_args(&self) -> Vec<String> {
        let mut args = self.monitor.args.clone();
        args.push(self.workspace.to_string_lossy().into_owned());
        args
    }

    fn agent_command(&self, launch: &Launch) -> Command {
        let mut cmd = Command::new(&self.agent.command);
        cmd.args(self.agent_args(launch))
            .current_dir(&self.workspace)
            .env(ENV_ITERATION, launch.iteration.to_string())
            .env(ENV_STATE_DIR, self.state.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        own_process_group(&mut cmd);
        cmd
    }

    fn monitor_command(&self, iteration: u64) -> Command {
        let mut cmd = Command::new(&self.monitor.command);
        cmd.args(self.monitor_args())
            .current_dir(&self.workspace)
            .env(ENV_ITERATION, iteration.to_string())
            .env(ENV_STATE_DIR, self.state.root())
            .env(ENV_WARN_THRESHOLD, self.monitor.warn_threshold.to_string())
            .env(ENV_ROTATE_THRESHOLD, self.monitor.rotate_threshold.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        own_process_group(&mut cmd);
        cmd
    }
}

#[async_trait]
impl Supervisor for ProcessSupervisor {
    async fn start(&self, launch: Launch, signals: SignalSender) -> Result<PipelineHandle> {
        if let Err(e) = self.state.ensure() {
            warn!("Failed to create state dir {}: {}", self.state.root().display(), e);
        }

        let mut monitor = self
            .monitor_command(launch.iteration)
            .spawn()
            .map_err(|source| RelayrError::Spawn {
                program: self.monitor.command.clone(),
                source,
            })?;

        let mut agent = match self.agent_command(&launch).spawn() {
            Ok(child) => child,
            Err(source) => {
                let monitor_pid = monitor.id();
                kill_child(&mut monitor, monitor_pid);
                let _ = monitor.wait().await;
                return Err(RelayrError::Spawn {
                    program: self.agent.command.clone(),
                    source,
                });
            }
        };

        let agent_pid = agent.id();
        let monitor_pid = monitor.id();
        info!(
            "Iteration {}: started {} (pid {:?}) | {} (pid {:?})",
            launch.iteration, self.agent.command, agent_pid, self.monitor.command, monitor_pid
        );

        let (Some(agent_stdout), Some(agent_stderr), Some(monitor_stdin), Some(monitor_stdout)) = (
            agent.stdout.take(),
            agent.stderr.take(),
            monitor.stdin.take(),
            monitor.stdout.take(),
        ) else {
            kill_child(&mut agent, agent_pid);
            kill_child(&mut monitor, monitor_pid);
            return Err(RelayrError::Pipeline("pipeline stdio was not captured".to_string()));
        };

        let stdout_trail = ActivityTrail::open(self.state.activity_path()).await;
        let stderr_trail = ActivityTrail::open(self.state.activity_path()).await;
        let errors_trail = ActivityTrail::open(self.state.errors_path()).await;

        let pumps = vec![
            tokio::spawn(pump_agent_stdout(agent_stdout, Some(monitor_stdin), stdout_trail)),
            tokio::spawn(pump_agent_stderr(agent_stderr, stderr_trail, errors_trail)),
            tokio::spawn(forward_signals(monitor_stdout, signals)),
        ];

        let running = RunningPipeline {
            iteration: launch.iteration,
            agent,
            agent_pid,
            monitor,
            monitor_pid,
            pumps,
        };
        Ok(PipelineHandle::spawn(move |kill| running.supervise(kill)))
    }
}

struct RunningPipeline {
    iteration: u64,
    agent: Child,
    agent_pid: Option<u32>,
    monitor: Child,
    monitor_pid: Option<u32>,
    pumps: Vec<JoinHandle<()>>,
}

impl RunningPipeline {
    async fn supervise(mut self, mut kill: watch::Receiver<bool>) -> PipelineExit {
        let mut terminated = false;

        let agent_status = tokio::select! {
            status = self.agent.wait() => status,
            () = termination_requested(&mut kill) => {
                terminated = true;
                self.kill_all();
                self.agent.wait().await
            }
        };
        let code = exit_code(&agent_status, self.iteration);

        // Leftover agent descendants would hold the output pipe open
        kill_group(self.agent_pid);

        if !terminated {
            // The monitor finishes on its own once its input closes
            tokio::select! {
                status = self.monitor.wait() => {
                    debug!("Iteration {} monitor exited: {:?}", self.iteration, status);
                }
                () = termination_requested(&mut kill) => {
                    terminated = true;
                    kill_child(&mut self.monitor, self.monitor_pid);
                    let _ = self.monitor.wait().await;
                }
            }
        } else {
            let _ = self.monitor.wait().await;
        }
        kill_group(self.monitor_pid);

        for pump in self.pumps.drain(..) {
            let abort = pump.abort_handle();
            if tokio::time::timeout(IO_DRAIN_TIMEOUT, pump).await.is_err() {
                warn!("Iteration {} output pump did not drain, aborting", self.iteration);
                abort.abort();
            }
        }

        if terminated {
            info!("Iteration {} pipeline terminated", self.iteration);
            PipelineExit::terminated(code)
        } else {
            info!("Iteration {} agent exited with {:?}", self.iteration, code);
            PipelineExit::exited(code)
        }
    }

    fn kill_all(&mut self) {
        kill_child(&mut self.agent, self.agent_pid);
        kill_child(&mut self.monitor, self.monitor_pid);
    }
}

fn exit_code(status: &std::io::Result<ExitStatus>, iteration: u64) -> Option<i32> {
    match status {
        Ok(status) => status.code(),
        Err(e) => {
            warn!("Iteration {} failed to reap agent: {}", iteration, e);
            None
        }
    }
}

#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

/// SIGKILL a child and its process group. Already-dead targets are fine.
fn kill_child(child: &mut Child, pid: Option<u32>) {
    kill_group(pid);
    if let Err(e) = child.start_kill() {
        debug!("start_kill on {:?}: {}", pid, e);
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::sys::signal::{Signal as UnixSignal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), UnixSignal::SIGKILL) {
        debug!("killpg({}) : {}", pid, e);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

/// Read one line, replacing invalid UTF-8. `None` at EOF.
async fn next_line<R>(reader: &mut BufReader<R>, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    buf.clear();
    let read = reader.read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

async fn forward_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

/// Tee agent stdout into the monitor and the activity trail.
///
/// Keeps draining the agent even after the monitor stops reading, so the
/// agent never blocks on a full pipe.
async fn pump_agent_stdout<R>(stdout: R, mut monitor_stdin: Option<ChildStdin>, mut trail: ActivityTrail)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => {
                trail.write_line(&line).await;
                if let Some(stdin) = monitor_stdin.as_mut()
                    && let Err(e) = forward_line(stdin, &line).await
                {
                    debug!("Monitor stopped accepting input: {}", e);
                    monitor_stdin = None;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed reading agent stdout: {}", e);
                break;
            }
        }
    }
    // Dropping stdin here delivers EOF to the monitor
}

async fn pump_agent_stderr<R>(stderr: R, mut activity: ActivityTrail, mut errors: ActivityTrail)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => {
                activity.write_line(&format!("stderr: {}", line)).await;
                errors.write_line(&line).await;
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed reading agent stderr: {}", e);
                break;
            }
        }
    }
}

/// Parse monitor output into signals. The sender is dropped on return,
/// which closes the iteration's channel.
async fn forward_signals<R>(stdout: R, signals: SignalSender)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => match Signal::parse_line(&line) {
                Some(signal) => {
                    debug!("Iteration {} monitor signal: {}", signals.iteration(), signal);
                    // Once the controller stops listening, keep draining so the
                    // monitor is never blocked on its own output
                    let _ = signals.send(signal);
                }
                None => debug!("Monitor: {}", line),
            },
            Ok(None) => break,
            Err(e) => {
                warn!("Failed reading monitor stdout: {}", e);
                break;
            }
        }
    }
}
