use indicatif::{ProgressBar, ProgressStyle};
use modelsort_core::ProgressReporter;
use std::sync::Mutex;

/// CLI progress reporter using indicatif.
///
/// - Scan phase: spinner (unknown total upfront)
/// - Hash phase: progress bar (total known per conflict set)
/// - Execute phase: progress bar over the operation list
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }

    fn spinner(&self, message: &'static str) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.set_message(message);
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        self.set_bar(pb);
    }
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for CliReporter {
    fn on_scan_start(&self) {
        self.spinner("Scanning files...");
    }

    fn on_scan_progress(&self, files_found: usize, _current_path: &str) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.set_message(format!("Scanning... {} files found", files_found));
        }
    }

    fn on_scan_complete(&self, total_files: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Scan complete: {} files in {:.2}s",
            total_files, duration_secs
        );
    }

    fn on_resolve_start(&self, conflict_sets: usize) {
        if conflict_sets == 0 {
            eprintln!("  \x1b[32m✓\x1b[0m No name conflicts — fast path, nothing to hash");
            return;
        }
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::with_template(
                "  {spinner:.cyan} Hashing [{bar:30.cyan/dim}] {pos}/{len} files ({eta} remaining)",
            )
            .unwrap()
            .progress_chars("━╸─")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_hash_progress(&self, files_hashed: usize, total_files: usize) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            if pb.length() != Some(total_files as u64) {
                pb.set_length(total_files as u64);
            }
            pb.set_position(files_hashed as u64);
        }
    }

    fn on_resolve_complete(&self, files_hashed: usize, duration_secs: f64) {
        self.finish_bar();
        if files_hashed > 0 {
            eprintln!(
                "  \x1b[32m✓\x1b[0m Conflicts resolved: {} files hashed in {:.2}s",
                files_hashed, duration_secs
            );
        }
    }

    fn on_plan_complete(&self, operations: usize, duration_secs: f64) {
        eprintln!(
            "  \x1b[32m✓\x1b[0m Plan built: {} operations in {:.2}s",
            operations, duration_secs
        );
    }

    fn on_execute_start(&self, total_operations: usize) {
        let pb = ProgressBar::new(total_operations as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "  {spinner:.cyan} Applying [{bar:30.cyan/dim}] {pos}/{len} operations",
            )
            .unwrap()
            .progress_chars("━╸─")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_execute_progress(&self, completed: usize, _total: usize) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.set_position(completed as u64);
        }
    }

    fn on_execute_complete(&self, applied: usize, failed: usize) {
        self.finish_bar();
        if failed == 0 {
            eprintln!("  \x1b[32m✓\x1b[0m Execution complete: {} operations applied", applied);
        } else {
            eprintln!(
                "  \x1b[31m✗\x1b[0m Execution finished with failures: {} applied, {} failed",
                applied, failed
            );
        }
    }
}
