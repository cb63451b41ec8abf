use crate::config::RunConfig;
use crate::error::Error;
use crate::executor::{self, ExecutionReport};
use crate::grouper;
use crate::hasher::HashCache;
use crate::plan::{self, Plan};
use crate::progress::ProgressReporter;
use crate::resolver;
use crate::scanner;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use tracing::{debug, info};

/// Wires the pipeline together: scan → group → resolve → build plan, and
/// separately, replay a plan. Planning never mutates the filesystem; only
/// `execute` in commit mode does.
pub struct OrganizeEngine {
    config: RunConfig,
}

impl OrganizeEngine {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn plan(&self, reporter: &dyn ProgressReporter) -> Result<Plan, Error> {
        plan::ensure_root_allowed(&self.config)?;

        info!("scanning '{}'", self.config.root.display());
        reporter.on_scan_start();
        let scan_start = Instant::now();
        let scan = scanner::scan(&self.config, reporter)?;
        let scan_duration = scan_start.elapsed();
        reporter.on_scan_complete(scan.records.len(), scan_duration.as_secs_f64());
        debug!(
            "scan completed in {:.2}s — {} files, {} directories, {} warnings",
            scan_duration.as_secs_f64(),
            scan.records.len(),
            scan.dirs.len(),
            scan.warnings.len(),
        );

        let groups = grouper::group_files(scan.records, &self.config);
        debug!("{} candidate groups", groups.len());

        let resolve_start = Instant::now();
        let cache = HashCache::new();
        let resolved = resolver::resolve(groups, &cache, reporter);
        let resolve_duration = resolve_start.elapsed();
        reporter.on_resolve_complete(resolved.files_hashed, resolve_duration.as_secs_f64());
        debug!(
            "resolution completed in {:.2}s — {} conflict sets, {} files hashed",
            resolve_duration.as_secs_f64(),
            resolved.conflict_sets,
            resolved.files_hashed,
        );

        let build_start = Instant::now();
        let mut warnings = scan.warnings;
        warnings.extend(resolved.warnings);
        let plan = plan::build_plan(
            &resolved.groups,
            &scan.dirs,
            &self.config,
            warnings,
            resolved.conflict_sets,
            resolved.files_hashed,
        )?;
        reporter.on_plan_complete(plan.operations.len(), build_start.elapsed().as_secs_f64());
        info!(
            "plan ready: {} operations, {} groups, {} conflicts, {} orphan files",
            plan.operations.len(),
            plan.summary.group_count,
            plan.summary.conflict_count,
            plan.summary.orphan_count,
        );

        Ok(plan)
    }

    pub fn execute(
        &self,
        plan: &Plan,
        cancel: &AtomicBool,
        reporter: &dyn ProgressReporter,
    ) -> Result<ExecutionReport, Error> {
        let start = Instant::now();
        let report = executor::execute(plan, &self.config, cancel, reporter)?;
        info!(
            "execution finished in {:.2}s — {} applied, {} skipped, {} failed",
            start.elapsed().as_secs_f64(),
            report.applied,
            report.skipped,
            report.failed,
        );
        Ok(report)
    }
}
