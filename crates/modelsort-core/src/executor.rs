use crate::config::RunConfig;
use crate::error::Error;
use crate::plan::{self, Plan, PlanOperation, PLAN_SCHEMA_VERSION};
use crate::progress::ProgressReporter;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
pub enum ExecutionMode {
    DryRun,
    Commit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OpOutcome {
    Applied,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationReport {
    pub operation: PlanOperation,
    pub outcome: OpOutcome,
}

/// Per-operation outcomes plus aggregate counts. The shape is identical for
/// dry runs and commits so the two can be diffed.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub mode: ExecutionMode,
    pub started_at: DateTime<Utc>,
    pub operations: Vec<OperationReport>,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub warnings: Vec<String>,
}

impl ExecutionReport {
    fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            started_at: Utc::now(),
            operations: Vec::new(),
            applied: 0,
            skipped: 0,
            failed: 0,
            warnings: Vec::new(),
        }
    }

    fn record(&mut self, operation: &PlanOperation, outcome: OpOutcome) {
        match &outcome {
            OpOutcome::Applied => self.applied += 1,
            OpOutcome::Skipped(_) => self.skipped += 1,
            OpOutcome::Failed(_) => self.failed += 1,
        }
        self.operations.push(OperationReport {
            operation: operation.clone(),
            outcome,
        });
    }
}

/// Replay a plan against the filesystem.
///
/// `DryRun` validates every operation without mutating anything. In `Commit`
/// a failed operation fails the rest of its group (no half-merged folders)
/// but never the run; unrelated groups continue. The cancel flag is checked
/// between operations, so an in-flight operation always finishes and the
/// report stays consistent.
pub fn execute(
    plan: &Plan,
    config: &RunConfig,
    cancel: &AtomicBool,
    reporter: &dyn ProgressReporter,
) -> Result<ExecutionReport, Error> {
    if plan.schema_version != PLAN_SCHEMA_VERSION {
        return Err(Error::PlanIntegrity(format!(
            "unsupported plan schema version {}",
            plan.schema_version
        )));
    }
    if !plan.root.is_dir() {
        return Err(Error::PlanIntegrity(format!(
            "plan root '{}' is not a directory",
            plan.root.display()
        )));
    }
    let current_root = fs::canonicalize(&config.root).unwrap_or_else(|_| config.root.clone());
    if current_root != plan.root && !config.trust_mode {
        return Err(Error::PlanIntegrity(format!(
            "plan was built for '{}' but the configured root is '{}'",
            plan.root.display(),
            current_root.display()
        )));
    }

    // Protected paths are re-checked at execution time, trust mode or not.
    plan::ensure_root_allowed(config)?;
    for operation in &plan.operations {
        let target = match operation {
            PlanOperation::CreateDir { path, .. } => path,
            PlanOperation::MoveFile { dst, .. } => dst,
            PlanOperation::RemoveFile { path, .. } => path,
            PlanOperation::RemoveEmptyDir { path } => path,
        };
        if plan::is_protected(target, config) {
            return Err(Error::ProtectedPath(target.clone()));
        }
    }

    let mode = config.mode;
    let mut report = ExecutionReport::new(mode);
    let mut failed_groups: HashSet<String> = HashSet::new();
    // Paths a dry run has hypothetically removed. A commit clears them for
    // real, so only validation needs the bookkeeping.
    let mut cleared: HashSet<&Path> = HashSet::new();
    let total = plan.operations.len();
    reporter.on_execute_start(total);
    info!(
        "executing {} operations ({:?} mode) under '{}'",
        total,
        mode,
        plan.root.display()
    );

    for (index, operation) in plan.operations.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            report.record(operation, OpOutcome::Skipped("cancelled".to_string()));
            continue;
        }
        if let Some(group) = operation.group() {
            if failed_groups.contains(group) {
                report.record(
                    operation,
                    OpOutcome::Skipped(format!("group '{}' had an earlier failure", group)),
                );
                continue;
            }
        }

        let mut outcome = match mode {
            ExecutionMode::DryRun => {
                let outcome = validate_operation(operation, &cleared);
                if outcome == OpOutcome::Applied {
                    if let PlanOperation::RemoveFile { path, .. } = operation {
                        cleared.insert(path.as_path());
                    }
                }
                outcome
            }
            ExecutionMode::Commit => apply_operation(operation),
        };

        if let OpOutcome::Failed(reason) = &outcome {
            match operation.group() {
                Some(group) => {
                    error!("operation failed for group '{}': {}", group, reason);
                    failed_groups.insert(group.to_string());
                }
                None => {
                    // Leftover content in a to-be-removed directory is a
                    // warning, never an error.
                    warn!("cleanup skipped: {}", reason);
                    report.warnings.push(reason.clone());
                    outcome = OpOutcome::Skipped(reason.clone());
                }
            }
        }
        match &outcome {
            OpOutcome::Applied => debug!("applied: {:?}", operation),
            OpOutcome::Skipped(reason) => debug!("skipped ({}): {:?}", reason, operation),
            OpOutcome::Failed(_) => {}
        }
        report.record(operation, outcome);
        reporter.on_execute_progress(index + 1, total);
    }

    reporter.on_execute_complete(report.applied, report.failed);
    Ok(report)
}

/// Dry-run validation: existence and writability checks, outcomes are
/// hypothetical. `cleared` holds paths earlier validated removals would have
/// deleted, so a move into a just-vacated destination passes.
fn validate_operation(operation: &PlanOperation, cleared: &HashSet<&Path>) -> OpOutcome {
    match operation {
        PlanOperation::CreateDir { path, .. } => {
            if path.exists() && !path.is_dir() {
                OpOutcome::Failed(format!("'{}' exists and is not a directory", path.display()))
            } else if let Err(reason) = probe_writable(path) {
                OpOutcome::Failed(reason)
            } else {
                OpOutcome::Applied
            }
        }
        PlanOperation::MoveFile { src, dst, .. } => {
            if !src.exists() {
                OpOutcome::Failed(format!("source '{}' is missing", src.display()))
            } else if dst.exists() && !cleared.contains(dst.as_path()) {
                OpOutcome::Failed(format!("destination '{}' already exists", dst.display()))
            } else if let Err(reason) = probe_writable(dst) {
                OpOutcome::Failed(reason)
            } else {
                OpOutcome::Applied
            }
        }
        PlanOperation::RemoveFile { path, .. } => {
            if path.exists() {
                OpOutcome::Applied
            } else {
                OpOutcome::Skipped(format!("'{}' already absent", path.display()))
            }
        }
        PlanOperation::RemoveEmptyDir { path } => {
            if path.is_dir() {
                OpOutcome::Applied
            } else {
                OpOutcome::Skipped(format!("'{}' already absent", path.display()))
            }
        }
    }
}

fn apply_operation(operation: &PlanOperation) -> OpOutcome {
    match operation {
        PlanOperation::CreateDir { path, .. } => {
            match with_retry(|| fs::create_dir_all(path)) {
                Ok(()) => OpOutcome::Applied,
                Err(e) => OpOutcome::Failed(format!("create '{}': {}", path.display(), e)),
            }
        }
        PlanOperation::MoveFile { src, dst, .. } => {
            if !src.exists() {
                return OpOutcome::Failed(format!("source '{}' is missing", src.display()));
            }
            if dst.exists() {
                return OpOutcome::Failed(format!("destination '{}' already exists", dst.display()));
            }
            match with_retry(|| move_file(src, dst)) {
                Ok(()) => OpOutcome::Applied,
                Err(e) => OpOutcome::Failed(format!(
                    "move '{}' -> '{}': {}",
                    src.display(),
                    dst.display(),
                    e
                )),
            }
        }
        PlanOperation::RemoveFile { path, .. } => {
            if !path.exists() {
                return OpOutcome::Skipped(format!("'{}' already absent", path.display()));
            }
            match with_retry(|| fs::remove_file(path)) {
                Ok(()) => OpOutcome::Applied,
                Err(e) => OpOutcome::Failed(format!("remove '{}': {}", path.display(), e)),
            }
        }
        PlanOperation::RemoveEmptyDir { path } => {
            if !path.is_dir() {
                return OpOutcome::Skipped(format!("'{}' already absent", path.display()));
            }
            // Best effort: a directory holding an unplanned leftover file
            // simply stays.
            match fs::remove_dir(path) {
                Ok(()) => OpOutcome::Applied,
                Err(e) => OpOutcome::Failed(format!(
                    "could not remove '{}': {}",
                    path.display(),
                    e
                )),
            }
        }
    }
}

/// Permission-bit check on the nearest existing ancestor of a planned
/// target. Catches read-only destinations during a dry run; the commit path
/// relies on the real operation failing instead.
fn probe_writable(target: &Path) -> Result<(), String> {
    let mut probe = target.parent();
    while let Some(dir) = probe {
        if dir.as_os_str().is_empty() {
            break;
        }
        match fs::symlink_metadata(dir) {
            Ok(meta) => {
                if !meta.is_dir() {
                    return Err(format!("'{}' is not a directory", dir.display()));
                }
                if meta.permissions().readonly() {
                    return Err(format!("'{}' is not writable", dir.display()));
                }
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                probe = dir.parent();
            }
            Err(e) => return Err(format!("cannot stat '{}': {}", dir.display(), e)),
        }
    }
    Ok(())
}

/// Rename with a copy+remove fallback for cross-device moves. Never
/// overwrites: callers check the destination first.
fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, dst)?;
            fs::remove_file(src)
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}

/// Bounded retry with doubling backoff for transient filesystem errors.
fn with_retry<T, F: FnMut() -> io::Result<T>>(mut f: F) -> io::Result<T> {
    let mut delay = RETRY_BACKOFF;
    for _ in 0..RETRIES {
        match f() {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) => {
                debug!("transient error, retrying in {:?}: {}", delay, e);
                thread::sleep(delay);
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
    f()
}
