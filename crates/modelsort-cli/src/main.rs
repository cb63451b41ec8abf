mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use modelsort_core::executor::OpOutcome;
use modelsort_core::{ExecutionMode, OrganizeEngine, Plan, PlanOperation, RunConfig};
use progress::CliReporter;
use tracing::error;

// Exit status mapping: 0 clean, 1 finished with warnings or per-operation
// failures, 2 fatal planning error, 3 fatal execution error.
const EXIT_WARNINGS: i32 = 1;
const EXIT_PLAN_ERROR: i32 = 2;
const EXIT_EXEC_ERROR: i32 = 3;

fn main() {
    dotenv().ok();
    let _guard = logging::init_logger();

    let args = Cli::parse();
    let root = args
        .directory
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = RunConfig::new(root).with_trust(args.trust);
    match modelsort_core::config::load_overrides() {
        Ok(overrides) => config.apply_overrides(overrides),
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(EXIT_PLAN_ERROR);
        }
    }

    let code = match args.command {
        Some(Commands::Commit { dry_run }) => run_commit(config, dry_run),
        Some(Commands::PrintConfig) => {
            println!("{:#?}", config);
            0
        }
        Some(Commands::Plan) | None => run_plan(config),
    };
    process::exit(code);
}

fn run_plan(config: RunConfig) -> i32 {
    let engine = OrganizeEngine::new(config);
    let reporter = CliReporter::new();

    let plan = match engine.plan(&reporter) {
        Ok(plan) => plan,
        Err(err) => {
            error!("Planning failed: {}", err);
            return EXIT_PLAN_ERROR;
        }
    };

    print_plan(&plan);

    let path = match plan.save() {
        Ok(path) => path,
        Err(err) => {
            error!("Could not write plan file: {}", err);
            return EXIT_PLAN_ERROR;
        }
    };
    println!();
    println!("Plan saved to {}", path.display().to_string().cyan());
    println!("Run {} to apply it.", "modelsort commit".green());

    if plan.warnings.is_empty() {
        0
    } else {
        EXIT_WARNINGS
    }
}

fn run_commit(config: RunConfig, dry_run: bool) -> i32 {
    let plan_path = Plan::file_path(&config.root);
    let plan = match Plan::load(&plan_path) {
        Ok(plan) => plan,
        Err(err) => {
            error!("Cannot load plan: {}", err);
            eprintln!("Run {} first to create one.", "modelsort plan".green());
            return EXIT_EXEC_ERROR;
        }
    };

    println!("Plan for {}:", plan.root.display().to_string().cyan());
    print_summary(&plan);
    if !dry_run && !config.trust_mode {
        match prompt_confirm("Execute this plan?", Some(false)) {
            Ok(true) => {}
            _ => {
                println!("Operation cancelled.");
                return 0;
            }
        }
    }

    let mode = if dry_run {
        ExecutionMode::DryRun
    } else {
        ExecutionMode::Commit
    };
    let config = config.with_mode(mode);
    let engine = OrganizeEngine::new(config);
    let reporter = CliReporter::new();
    let cancel = AtomicBool::new(false);

    let report = match engine.execute(&plan, &cancel, &reporter) {
        Ok(report) => report,
        Err(err) => {
            error!("Execution failed: {}", err);
            return EXIT_EXEC_ERROR;
        }
    };

    for op in &report.operations {
        if let OpOutcome::Failed(reason) = &op.outcome {
            eprintln!("  {} {}", "failed:".red(), reason);
        }
    }
    for warning in &report.warnings {
        eprintln!("  {} {}", "warning:".yellow(), warning);
    }
    println!(
        "{} applied, {} skipped, {} failed",
        report.applied.to_string().green(),
        report.skipped,
        report.failed.to_string().red(),
    );

    if !dry_run && report.failed == 0 {
        // A fully applied plan is spent; leaving it around would invite
        // replaying it against a reorganized tree.
        if let Err(err) = std::fs::remove_file(&plan_path) {
            eprintln!("  {} could not remove plan file: {}", "warning:".yellow(), err);
        }
    }

    if report.failed == 0 && report.warnings.is_empty() {
        0
    } else {
        EXIT_WARNINGS
    }
}

fn print_plan(plan: &Plan) {
    println!();
    for operation in &plan.operations {
        match operation {
            PlanOperation::CreateDir { path, .. } => {
                println!("  {} {}/", "mkdir ".green(), path.display());
            }
            PlanOperation::MoveFile { src, dst, .. } => {
                println!("  {} {} -> {}", "move  ".cyan(), src.display(), dst.display());
            }
            PlanOperation::RemoveFile { path, .. } => {
                println!("  {} {} (duplicate)", "remove".red(), path.display());
            }
            PlanOperation::RemoveEmptyDir { path } => {
                println!("  {} {}/ (empty)", "rmdir ".yellow(), path.display());
            }
        }
    }
    print_summary(plan);
    for warning in &plan.warnings {
        eprintln!("  {} {}", "warning:".yellow(), warning);
    }
}

fn print_summary(plan: &Plan) {
    println!();
    println!(
        "{} groups ({} conflicts resolved, {} orphan files), {} moves, {} hashed, {} bytes",
        plan.summary.group_count.to_string().green(),
        plan.summary.conflict_count,
        plan.summary.orphan_count,
        plan.summary.moved_files,
        plan.summary.files_hashed,
        plan.summary.total_bytes,
    );
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
