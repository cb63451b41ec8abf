/// Trait for reporting pipeline progress.
///
/// The CLI implements this with indicatif bars; library consumers and tests
/// use `SilentReporter`. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self) {}
    fn on_scan_progress(&self, _files_found: usize, _current_path: &str) {}
    fn on_scan_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_resolve_start(&self, _conflict_sets: usize) {}
    fn on_hash_progress(&self, _files_hashed: usize, _total_files: usize) {}
    fn on_resolve_complete(&self, _files_hashed: usize, _duration_secs: f64) {}
    fn on_plan_complete(&self, _operations: usize, _duration_secs: f64) {}
    fn on_execute_start(&self, _total_operations: usize) {}
    fn on_execute_progress(&self, _completed: usize, _total: usize) {}
    fn on_execute_complete(&self, _applied: usize, _failed: usize) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
