use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use wsk::config::Config;
use wsk::log::LogLevel;
use wsk::orchestration::{ErrorInterceptor, Orchestrator, RunEvent, RunResult};
use wsk::registry::TaskRegistry;
use wsk::watch::WatchTrigger;
use wsk::{wlog, wlog_warn, Result};

/// wsk - build task orchestrator
#[derive(Parser, Debug)]
#[command(name = "wsk")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    WSK_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Task or composite to run
    #[arg(default_value = "default")]
    pub task: String,

    /// Project configuration file
    #[arg(short = 'c', long, default_value = wsk::config::FILE_NAME)]
    pub config: PathBuf,

    /// Enable debug logging (writes to ~/.wsk/wsk.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// List registered tasks and composites
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Print the execution plan for TASK without running it
    #[arg(short = 'p', long)]
    pub plan: bool,

    /// Keep running watch rules after the initial run
    #[arg(short = 'w', long)]
    pub watch: bool,

    /// Print the run result as JSON
    #[arg(long)]
    pub json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    wsk::log::init_with_debug(cli.debug);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("wsk: {}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether the requested run succeeded.
fn run(cli: Cli) -> Result<bool> {
    if cli.debug {
        wlog!("wsk starting (debug mode enabled)");
    } else {
        wlog!("wsk starting");
    }

    let config = Config::load(&cli.config)?;
    if let Some(level) = &config.log_level {
        match level.parse::<LogLevel>() {
            Ok(level) if !cli.debug => wsk::log::set_level(level),
            Ok(_) => {}
            Err(e) => wlog_warn!("Ignoring log_level: {}", e),
        }
    }

    let root = match cli.config.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    let registry = config.build_registry(&root)?;

    if cli.list {
        print_list(&registry);
        return Ok(true);
    }
    if cli.plan {
        print_plan(&registry, &cli.task)?;
        return Ok(true);
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = Arc::new(
            Orchestrator::new(registry)
                .with_interceptor(ErrorInterceptor::new(config.notifier_sink()))
                .with_events(tx),
        );
        let printer = tokio::spawn(print_events(rx, cli.json));

        let result = orchestrator.invoke(&cli.task).await?;
        if !cli.watch {
            drop(orchestrator);
            let _ = printer.await;
            report(&result, cli.json)?;
            return Ok(result.is_success());
        }
        report(&result, cli.json)?;

        let trigger = WatchTrigger::from_config(&root, &config.watch)?;
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_signal.cancel();
            }
        });
        println!("Watching for changes (Ctrl-C to stop)");
        trigger.run(Arc::clone(&orchestrator), cancel).await?;

        drop(orchestrator);
        let _ = printer.await;
        Ok::<_, wsk::Error>(true)
    })
}

fn print_list(registry: &TaskRegistry) {
    println!("Tasks:");
    for task in registry.tasks() {
        if task.dependencies.is_empty() {
            println!("  {}", task.name);
        } else {
            println!("  {} <- {}", task.name, task.dependencies.join(", "));
        }
    }
    let composites: Vec<_> = registry.composites().collect();
    if !composites.is_empty() {
        println!("Composites:");
        for composite in composites {
            if composite.prerequisites.is_empty() {
                println!("  {} = {}", composite.name, composite.sequence);
            } else {
                println!(
                    "  {} = [{}] then {}",
                    composite.name,
                    composite.prerequisites.join(", "),
                    composite.sequence
                );
            }
        }
    }
}

fn print_plan(registry: &TaskRegistry, name: &str) -> Result<()> {
    let graph = registry.graph()?;
    match registry.composite(name) {
        Some(composite) => {
            registry.check_sequence(&graph, &composite.sequence)?;
            if !composite.prerequisites.is_empty() {
                print!("{}", graph.plan_many(composite.prerequisites.as_slice())?);
            }
            println!("sequence: {}", composite.sequence);
        }
        None => print!("{}", graph.plan(name)?),
    }
    Ok(())
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<RunEvent>, quiet: bool) {
    while let Some(event) = rx.recv().await {
        if quiet {
            continue;
        }
        match event {
            RunEvent::TaskStarted { task } => println!("Starting '{}'...", task),
            RunEvent::TaskSucceeded { task } => println!("Finished '{}'", task),
            RunEvent::TaskFailed { task, error } => println!("'{}' errored: {}", task, error),
            RunEvent::TaskProgress { task, message } => println!("[{}] {}", task, message),
            _ => {}
        }
    }
}

fn report(result: &RunResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    match result.failed_task() {
        None => println!("Done: {} task(s) succeeded", result.tasks.len()),
        Some(task) => println!("Failed at '{}': {}", task, result.outcome),
    }
    Ok(())
}
