use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use macroflow::config::{self as cfg, AppConfig};
use macroflow::control::{self, ControlCommand, ControlSource, StdinSource};
use macroflow::executor::{
    DryRunDriver, EnigoDriver, ExecutorHandle, INDETERMINATE, InputDriver, MacroExecutor,
};
use macroflow::providers::Resources;

/// macroflow CLI
#[derive(Debug, Parser)]
#[command(
    name = macroflow::PKG_NAME,
    version = macroflow::PKG_VERSION,
    about = "Replay a recorded desktop macro per spreadsheet row, N times, or until stopped"
)]
struct Args {
    /// Path to the project JSON file (relative paths resolve against --base-dir)
    #[arg(short = 'p', long = "project", required_unless_present = "print_schema")]
    project: Option<PathBuf>,

    /// Log actions instead of simulating input
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Set log level (e.g., trace, debug, info, warn, error). Overrides RUST_LOG.
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Base directory holding `projects/` (defaults to the current directory)
    #[arg(long = "base-dir")]
    base_dir: Option<PathBuf>,

    /// Print the JSON Schema for project files and exit
    #[arg(long = "print-schema")]
    print_schema: bool,

    /// Do not read pause/resume/stop commands from stdin
    #[arg(long = "no-stdin-control")]
    no_stdin_control: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    macroflow::init_tracing(args.log_level.as_deref());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    let result = runtime.block_on(run(args));
    // A pending stdin read never completes on its own.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn run(args: Args) -> anyhow::Result<()> {
    if args.print_schema {
        let schema = cfg::generate_schema();
        let json = serde_json::to_string_pretty(&schema)?;
        println!("{json}");
        return Ok(());
    }

    let app = match &args.base_dir {
        Some(dir) => AppConfig::new(dir),
        None => AppConfig::from_current_dir()?,
    };
    app.create_directories()?;

    let project_path = app.resolve(
        args.project
            .as_ref()
            .ok_or_else(|| anyhow!("--project is required"))?,
    );
    info!(
        version = macroflow::PKG_VERSION,
        project = %project_path.display(),
        dry_run = args.dry_run,
        "Starting macroflow"
    );

    let project = cfg::load_from_path_async(&project_path).await?;
    if project.flow_sequence.is_empty() {
        bail!("Project '{}' has no actions in its flow", project.name);
    }
    debug!(target: "macroflow", actions = project.flow_sequence.len(), "Project loaded");
    let resources = Resources::from_project(&project, &app);

    // Drivers are not `Send`; the executor is built on the thread that runs it.
    let handle = ExecutorHandle::new();
    let dry_run = args.dry_run;
    let worker = {
        let handle = handle.clone();
        thread::Builder::new()
            .name("macro-worker".into())
            .spawn(move || {
                let driver: Box<dyn InputDriver> = if dry_run {
                    Box::new(DryRunDriver::new())
                } else {
                    Box::new(EnigoDriver::new())
                };
                let mut executor =
                    MacroExecutor::new(&project, resources, driver, app).with_handle(handle);
                executor.set_callbacks(
                    None,
                    Some(Box::new(|current, total, status| {
                        if total == INDETERMINATE {
                            info!(target: "macroflow::progress", current, "{status}");
                        } else {
                            info!(target: "macroflow::progress", current, total, "{status}");
                        }
                    })),
                    Some(Box::new(|message, screenshot| {
                        error!(
                            target: "macroflow::progress",
                            screenshot = screenshot.is_some(),
                            "{message}"
                        );
                    })),
                );
                executor.start()
            })
            .context("Failed to spawn macro worker thread")?
    };
    let mut join = tokio::task::spawn_blocking(move || worker.join());

    let (tx, mut rx) = mpsc::channel::<ControlCommand>(16);
    let _stdin = if args.no_stdin_control {
        None
    } else {
        let source = StdinSource::new();
        info!(source = source.name(), "Control commands: pause | resume | toggle | stop");
        Some(source.start(tx.clone()))
    };
    drop(tx);

    let mut control_open = true;
    let joined = loop {
        tokio::select! {
            res = &mut join => break res,
            cmd = rx.recv(), if control_open => match cmd {
                Some(cmd) => control::apply(&handle, cmd),
                None => control_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("Received Ctrl+C, stopping macro");
                handle.stop();
            }
        }
    };

    let report = joined
        .context("Failed to join macro worker")?
        .map_err(|_| anyhow!("Macro worker panicked"))??;
    info!(
        mode = ?report.mode,
        executions = report.flow_executions,
        errors = report.errors,
        stopped = report.stopped,
        "macroflow exited"
    );
    if report.aborted {
        bail!("Macro run aborted after {} error(s)", report.errors);
    }
    Ok(())
}
