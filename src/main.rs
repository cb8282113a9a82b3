use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{LevelFilter, error, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use relayr::config::Config;
use relayr::controller::{IterationController, StatusReport, listen_for_interrupt};
use relayr::domain::RunOutcome;
use relayr::supervisor::{ProcessSupervisor, preflight};

fn setup_logging(config: &Config, verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("relayr")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("relayr.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let default_level = if verbose {
        "debug".to_string()
    } else {
        config.log_level.clone().unwrap_or_else(|| "info".to_string())
    };
    let level = default_level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).parse_default_env();
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, config: Config) -> Result<i32> {
    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let workspace = cli
        .workspace
        .canonicalize()
        .with_context(|| format!("Workspace not found: {}", cli.workspace.display()))?;

    match cli.subcommand() {
        Commands::Run { resume, .. } => handle_run_command(&workspace, config, resume),
        Commands::Status { json } => handle_status_command(&workspace, &config, json),
    }
}

fn handle_run_command(workspace: &Path, config: Config, resume: Option<String>) -> Result<i32> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async move {
        // Children get their own process groups, so terminal signals stop only us
        let interrupt = listen_for_interrupt().context("Failed to install signal handlers")?;

        let checked = match preflight(&config, workspace).await {
            Ok(checked) => checked,
            Err(e) if e.is_precondition() => {
                error!("Precondition failed: {}", e);
                eprintln!("{} {}", "Cannot start:".red(), e);
                return Ok(1);
            }
            Err(e) => return Err(e).context("Preflight failed"),
        };

        let supervisor = Arc::new(ProcessSupervisor::new(&config, workspace));
        info!(
            "Supervising {} with agent {} and monitor {}",
            supervisor.workspace().display(),
            checked.agent_path.display(),
            checked.monitor_path.display()
        );
        println!("{} {}", "Task:".green(), checked.task_path.display());
        if let Some(root) = &checked.git_root {
            println!("{} {}", "Repository:".green(), root.display());
        }

        let mut controller = IterationController::new(config, workspace, supervisor)
            .context("Failed to build controller")?
            .with_resume_token(resume)
            .with_interrupt(interrupt);

        let outcome = controller.run().await.context("Run failed")?;
        info!("Run finished: {:?}", outcome);
        print_verdict(&outcome);
        Ok(outcome.exit_code())
    })
}

fn print_verdict(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Complete { iterations } => {
            println!("{} task complete after {} iteration(s)", "Done:".green().bold(), iterations)
        }
        RunOutcome::AlreadyComplete => println!("{} nothing to do", "Done:".green().bold()),
        RunOutcome::Gutter { iteration } => {
            println!("{} agent stuck in iteration {}", "Failed:".red().bold(), iteration)
        }
        RunOutcome::MaxIterations { iterations } => println!(
            "{} criteria remain after {} iteration(s)",
            "Failed:".red().bold(),
            iterations
        ),
        RunOutcome::Interrupted { iteration } => {
            println!("{} interrupted during iteration {}", "Stopped:".red().bold(), iteration)
        }
    }
}

fn handle_status_command(workspace: &Path, config: &Config, json: bool) -> Result<i32> {
    let report = StatusReport::collect(config, workspace).context("Failed to read run status")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(0);
    }

    println!("{} {}", "Task:".green(), report.task_file.display());
    if !report.task_present {
        println!("  {}", "(missing)".red());
    }
    let verdict = if report.complete { "complete".green() } else { "in progress".yellow() };
    println!("  criteria {} ({})", report.progress, verdict);
    println!("  iteration {}", report.iteration);

    if !report.recent.is_empty() {
        println!("{}", "Recent sessions:".green());
        for event in &report.recent {
            println!("  {}", event.to_line());
        }
    }
    Ok(0)
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration, then layer environment and flags on top
    let config = Config::load(cli.config.as_ref())
        .context("Failed to load configuration")?
        .apply_env()
        .apply_overrides(&cli.subcommand().overrides());
    config.validate().context("Invalid configuration")?;

    setup_logging(&config, cli.is_verbose()).context("Failed to setup logging")?;
    info!("Starting with config from: {:?}", cli.config);

    let code = run_application(&cli, config).context("Application failed")?;
    std::process::exit(code);
}
