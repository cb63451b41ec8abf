use crate::config::RunConfig;
use crate::error::Error;
use crate::progress::ProgressReporter;
use dashmap::DashSet;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FileRole {
    Model,
    Support,
    Unknown,
}

/// One scanned file. Immutable after the scan; `content_hash` is filled in
/// lazily by the conflict resolver and only when a name collision forces it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub rel_path: PathBuf,
    pub size: u64,
    pub extension: String,
    pub role: FileRole,
    pub content_hash: Option<String>,
}

impl FileRecord {
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .map(|n| n.to_str().unwrap_or_default())
            .unwrap_or_default()
    }

    /// First component of the relative path, if the file sits below a
    /// top-level directory of the scan root.
    pub fn top_level_dir(&self) -> Option<String> {
        if self.rel_path.parent().map_or(true, |p| p.as_os_str().is_empty()) {
            return None;
        }
        self.rel_path
            .components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
    }
}

#[derive(Debug)]
pub struct ScanOutcome {
    pub records: Vec<FileRecord>,
    /// Every directory seen during the walk (absolute), root excluded.
    pub dirs: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Parallel recursive walk of the scan root. Per-entry failures become
/// warnings and the scan continues; only a missing or non-directory root is
/// fatal. Symlinks are never followed, and visited canonical directory
/// identities are tracked so a cycle through one cannot recurse forever.
pub fn scan(config: &RunConfig, reporter: &dyn ProgressReporter) -> Result<ScanOutcome, Error> {
    let meta = fs::metadata(&config.root).map_err(|e| Error::Scan {
        path: config.root.clone(),
        reason: e.to_string(),
    })?;
    if !meta.is_dir() {
        return Err(Error::Scan {
            path: config.root.clone(),
            reason: "not a directory".to_string(),
        });
    }
    let root = fs::canonicalize(&config.root).map_err(|e| Error::Scan {
        path: config.root.clone(),
        reason: e.to_string(),
    })?;

    let records: Mutex<Vec<FileRecord>> = Mutex::new(Vec::new());
    let dirs: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());
    let warnings: Mutex<Vec<String>> = Mutex::new(Vec::new());
    let visited: DashSet<PathBuf> = DashSet::new();
    let found = AtomicUsize::new(0);

    visited.insert(root.clone());
    visit_dir(
        &root, &root, config, &records, &dirs, &warnings, &visited, &found, reporter,
    )?;

    let mut records = records.into_inner().unwrap_or_default();
    let mut dirs = dirs.into_inner().unwrap_or_default();
    let mut warnings = warnings.into_inner().unwrap_or_default();
    records.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    dirs.sort();
    warnings.sort();

    Ok(ScanOutcome {
        records,
        dirs,
        warnings,
    })
}

#[allow(clippy::too_many_arguments)]
fn visit_dir(
    dir: &Path,
    root: &Path,
    config: &RunConfig,
    records: &Mutex<Vec<FileRecord>>,
    dirs: &Mutex<Vec<PathBuf>>,
    warnings: &Mutex<Vec<String>>,
    visited: &DashSet<PathBuf>,
    found: &AtomicUsize,
    reporter: &dyn ProgressReporter,
) -> io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            push_warning(
                warnings,
                format!("cannot read directory '{}': {}", dir.display(), err),
            );
            return Ok(());
        }
    };

    entries.par_bridge().try_for_each(|entry_result| {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                push_warning(
                    warnings,
                    format!("unreadable entry in '{}': {}", dir.display(), err),
                );
                return Ok(());
            }
        };

        let path = entry.path();
        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                push_warning(
                    warnings,
                    format!("cannot stat '{}': {}", path.display(), err),
                );
                return Ok(());
            }
        };

        if metadata.file_type().is_symlink() {
            // Never followed: a link back into the tree would otherwise cycle.
            return Ok(());
        }

        if metadata.is_dir() {
            let canonical = match fs::canonicalize(&path) {
                Ok(c) => c,
                Err(err) => {
                    push_warning(
                        warnings,
                        format!("cannot canonicalize '{}': {}", path.display(), err),
                    );
                    return Ok(());
                }
            };
            if !visited.insert(canonical) {
                warn!("skipping already-visited directory '{}'", path.display());
                return Ok(());
            }
            if let Ok(mut guard) = dirs.lock() {
                guard.push(path.clone());
            }
            return visit_dir(
                &path, root, config, records, dirs, warnings, visited, found, reporter,
            );
        }

        let file_name = entry.file_name().to_string_lossy().into_owned();
        if config.is_ignored(&file_name) {
            return Ok(());
        }

        let rel_path = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_path_buf();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let role = config.classify(&extension);

        let record = FileRecord {
            path: path.clone(),
            rel_path,
            size: metadata.len(),
            extension,
            role,
            content_hash: None,
        };
        if let Ok(mut guard) = records.lock() {
            guard.push(record);
        }

        let count = found.fetch_add(1, Ordering::Relaxed) + 1;
        if count % 64 == 0 {
            reporter.on_scan_progress(count, &path.to_string_lossy());
        }
        Ok(())
    })
}

fn push_warning(warnings: &Mutex<Vec<String>>, message: String) {
    warn!("{}", message);
    if let Ok(mut guard) = warnings.lock() {
        guard.push(message);
    }
}
