use chrono::{DateTime, Utc};
use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempora::config::Config;
use tempora::domain::{Plan, PlanStatus};
use tempora::kernel::{CatalystSource, JsonlCatalystSource, Kernel, PulseSource, RunSummary};
use tempora::ledger::ResourceLedger;
use tempora::loops::standard_loops;
use tempora::observe::{NullSink, TracingSink};
use tempora::storage::{JsonlPlanStore, PlanStore};
use tempora::temporal::{ExecutionTracker, ThresholdGate};

mod cli;

use cli::Cli;
use cli::commands::{Commands, PlanCommands};

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tempora")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("tempora.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run {
            cycles,
            catalysts,
            accept_above,
            defer_above,
            pulse_hold,
        } => {
            let accept = accept_above.unwrap_or(config.intuition.threshold);
            let mut gate = ThresholdGate::new(accept);
            if let Some(floor) = defer_above {
                gate = gate.with_defer_above(*floor);
            }
            handle_run_command(config, *cycles, catalysts.as_deref(), gate, *pulse_hold).await
        }
        Commands::Plans { command } => handle_plans_command(command, config),
        Commands::Config => handle_config_command(config),
    }
}

fn open_store(config: &Config) -> Result<Arc<JsonlPlanStore>> {
    let dir = &config.storage.plans_dir;
    let store = JsonlPlanStore::open(dir).context(format!("Failed to open plan store at {}", dir.display()))?;
    Ok(Arc::new(store))
}

async fn handle_run_command(
    config: &Config,
    cycles: Option<u64>,
    catalysts: Option<&Path>,
    gate: ThresholdGate,
    pulse_hold: u64,
) -> Result<()> {
    let store = open_store(config)?;
    let mut kernel = Kernel::build(config, standard_loops(), store, Arc::new(TracingSink), Box::new(gate))
        .context("Failed to start kernel")?;

    let restored = kernel.restore_plans().await.context("Failed to restore plans")?;
    if !restored.is_empty() {
        println!("{} {} live plan(s)", "Restored".cyan(), restored.len());
    }

    let mut source: Box<dyn CatalystSource> = match catalysts {
        Some(path) => Box::new(
            JsonlCatalystSource::open(path).context(format!("Failed to open catalysts {}", path.display()))?,
        ),
        None => Box::new(PulseSource::new(pulse_hold)),
    };

    println!(
        "{} at {} Hz with {} loops (Ctrl-C to stop)",
        "Running kernel".green(),
        kernel.config().master_hz,
        kernel.config().loops.len()
    );
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let result = kernel.run(source.as_mut(), cycles, shutdown).await;

    let stats = kernel.stats();
    let pipeline = kernel.pipeline();
    let plans: Vec<Plan> = pipeline.lock().await.tracker().plans().into_iter().cloned().collect();
    kernel.shutdown().await;

    let summary = result.context("Kernel run failed")?;
    print_summary(&summary);
    for loop_stats in &stats.loops {
        println!(
            "  {:<12} {:>5.1} Hz target  {:>6} fresh  {:>6} stale  {:>6} degraded  jitter {}",
            loop_stats.loop_id,
            loop_stats.target_hz,
            loop_stats.fresh,
            loop_stats.stale,
            loop_stats.degraded,
            loop_stats
                .jitter
                .map(|j| format!("{:.1}%", j * 100.0))
                .unwrap_or_else(|| "n/a".to_string())
        );
    }
    if !plans.is_empty() {
        println!("{}", "Plans this session:".cyan());
        for plan in &plans {
            print_plan_line(plan);
        }
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} {:?}: {} cycles, {} idle, {} passes, {} dropped",
        "Stopped".green(),
        summary.stop,
        summary.cycles,
        summary.idle_cycles,
        summary.passes,
        summary.dropped
    );
    match summary.measured_hz {
        Some(hz) => println!("  measured master rate: {:.2} Hz", hz),
        None => println!("  measured master rate: n/a"),
    }
    if let Some(jitter) = summary.jitter {
        println!("  master jitter: {:.1}% of period", jitter * 100.0);
    }
    println!(
        "  ledger: balance {:.2}, spent {:.2}, rewarded {:.2}, refused {}",
        summary.ledger.balance, summary.ledger.total_spent, summary.ledger.total_rewarded, summary.ledger.refused_spends
    );
}

fn status_colored(status: PlanStatus) -> ColoredString {
    match status {
        PlanStatus::Draft => status.as_str().normal(),
        PlanStatus::Active => status.as_str().green(),
        PlanStatus::Suspended => status.as_str().yellow(),
        PlanStatus::Completed => status.as_str().cyan(),
        PlanStatus::Abandoned => status.as_str().red(),
    }
}

fn print_plan_line(plan: &Plan) {
    println!(
        "  {}  {:<10} {}/{} actions  {:>3} session(s)  {}",
        plan.id,
        status_colored(plan.status),
        plan.completed_count(),
        plan.actions.len(),
        plan.sessions,
        plan.vision.description
    );
}

fn format_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Tracker over the on-disk store with a fresh session ledger
fn session_tracker(config: &Config) -> Result<ExecutionTracker> {
    let store = open_store(config)?;
    let ledger = Arc::new(ResourceLedger::new(config.ledger.initial_balance));
    Ok(ExecutionTracker::new(&config.planning, ledger, store, Arc::new(NullSink)))
}

fn handle_plans_command(command: &PlanCommands, config: &Config) -> Result<()> {
    match command {
        PlanCommands::List { status } => {
            let status = match status {
                Some(s) => Some(PlanStatus::parse(s).ok_or_else(|| eyre!("Unknown plan status: {}", s))?),
                None => None,
            };
            let plans = open_store(config)?.list(status).context("Failed to list plans")?;
            if plans.is_empty() {
                println!("{}", "No plans found".yellow());
            }
            for plan in &plans {
                print_plan_line(plan);
            }
            Ok(())
        }
        PlanCommands::Show { id } => {
            let plan = open_store(config)?.load(id).context(format!("Failed to load plan {}", id))?;
            print_plan_line(&plan);
            println!("  intent: {}  confidence: {:.2}", plan.vision.intent.as_str(), plan.confidence);
            println!("  created: {}  updated: {}", format_ms(plan.created_at), format_ms(plan.updated_at));
            println!(
                "  complexity: {}  estimated sessions: {}",
                plan.vision.complexity.as_str(),
                plan.vision.estimated_sessions
            );
            for criterion in &plan.vision.success_criteria {
                println!("  success: {}", criterion);
            }
            for inspiration in &plan.vision.inspirations {
                println!("  inspiration: {}", inspiration);
            }
            for action in &plan.actions {
                let mark = if action.completed { "x".green() } else { " ".normal() };
                match action.completed_at {
                    Some(at) => println!("  [{}] {}  {}  ({})", mark, action.id, action.description, format_ms(at)),
                    None => println!("  [{}] {}  {}", mark, action.id, action.description),
                }
            }
            for note in plan.next_session_preparation() {
                println!("  next: {}", note);
            }
            Ok(())
        }
        PlanCommands::Resume { id, steps } => {
            let mut tracker = session_tracker(config)?;
            let plan = tracker.load(id).context(format!("Failed to load plan {}", id))?;
            match plan.status {
                PlanStatus::Draft => {
                    tracker.activate(id)?;
                }
                PlanStatus::Suspended => {
                    tracker.resume(id)?;
                }
                _ => {}
            }
            println!("{} {} (session {})", "Resumed".green(), id, plan.sessions);
            for _ in 0..*steps {
                let advance = tracker.advance(id).context(format!("Failed to advance plan {}", id))?;
                if let Some(action) = &advance.completed {
                    println!("  {} {}  {}", "done".green(), action.id, action.description);
                }
                if advance.finished() {
                    println!("{} {} (wisdom {:.2})", "Completed".cyan(), id, advance.reward);
                    break;
                }
                if advance.completed.is_none() {
                    break;
                }
            }
            Ok(())
        }
        PlanCommands::Suspend { id } => {
            let plan = session_tracker(config)?.suspend(id).context(format!("Failed to suspend plan {}", id))?;
            println!("{} {}", "Suspended".yellow(), plan.id);
            for note in plan.next_session_preparation() {
                println!("  next: {}", note);
            }
            Ok(())
        }
        PlanCommands::Abandon { id } => {
            let plan = session_tracker(config)?.abandon(id).context(format!("Failed to abandon plan {}", id))?;
            println!("{} {}", "Abandoned".red(), plan.id);
            Ok(())
        }
    }
}

fn handle_config_command(config: &Config) -> Result<()> {
    let yaml = config.to_yaml().context("Failed to render configuration")?;
    print!("{}", yaml);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
