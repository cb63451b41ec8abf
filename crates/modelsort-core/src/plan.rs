use crate::config::RunConfig;
use crate::error::Error;
use crate::grouper::{GroupStatus, ModelGroup};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const PLAN_SCHEMA_VERSION: u32 = 1;
pub const PLAN_FILE_NAME: &str = ".modelsort_plan.json";

/// One filesystem mutation, tagged with its owning group for traceability.
/// `RemoveFile` only ever targets redundant copies whose content survives in
/// the kept twin; `RemoveEmptyDir` entries are global cleanup, deepest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanOperation {
    CreateDir { group: String, path: PathBuf },
    MoveFile { group: String, src: PathBuf, dst: PathBuf },
    RemoveFile { group: String, path: PathBuf },
    RemoveEmptyDir { path: PathBuf },
}

impl PlanOperation {
    pub fn group(&self) -> Option<&str> {
        match self {
            PlanOperation::CreateDir { group, .. }
            | PlanOperation::MoveFile { group, .. }
            | PlanOperation::RemoveFile { group, .. } => Some(group),
            PlanOperation::RemoveEmptyDir { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub group_count: usize,
    pub conflict_count: usize,
    pub orphan_count: usize,
    pub files_hashed: usize,
    pub moved_files: usize,
    pub total_bytes: u64,
}

/// The durable artifact between planning and execution. Human-auditable JSON,
/// exactly re-parseable, and deliberately free of volatile fields so an
/// unchanged tree always replans to byte-identical output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub schema_version: u32,
    pub root: PathBuf,
    pub operations: Vec<PlanOperation>,
    pub summary: PlanSummary,
    pub warnings: Vec<String>,
}

impl Plan {
    pub fn file_path(root: &Path) -> PathBuf {
        root.join(PLAN_FILE_NAME)
    }

    pub fn save(&self) -> Result<PathBuf, Error> {
        let path = Self::file_path(&self.root);
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        fs::write(&path, text)?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Plan, Error> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::PlanIntegrity(format!("cannot read '{}': {}", path.display(), e)))?;
        let plan: Plan = serde_json::from_str(&text)
            .map_err(|e| Error::PlanIntegrity(format!("malformed plan: {}", e)))?;
        if plan.schema_version != PLAN_SCHEMA_VERSION {
            return Err(Error::PlanIntegrity(format!(
                "unsupported plan schema version {} (expected {})",
                plan.schema_version, PLAN_SCHEMA_VERSION
            )));
        }
        Ok(plan)
    }
}

/// True when `path` is, or sits inside, a denylisted location. Bare
/// filesystem roots only match exactly so that ordinary paths beneath them
/// are not caught.
pub fn is_protected(path: &Path, config: &RunConfig) -> bool {
    config.protected_paths.iter().any(|p| {
        if path == p.as_path() {
            return true;
        }
        p.components().count() > 1 && path.starts_with(p)
    })
}

/// Fatal check run before any planning or execution touches the tree.
pub fn ensure_root_allowed(config: &RunConfig) -> Result<(), Error> {
    let root = fs::canonicalize(&config.root).unwrap_or_else(|_| config.root.clone());
    if is_protected(&root, config) {
        return Err(Error::ProtectedPath(root));
    }
    Ok(())
}

/// Assemble the ordered operation list from finalized groups.
///
/// Per group: CreateDir, then RemoveFiles, then MoveFiles. After all groups,
/// RemoveEmptyDir for every scanned directory the simulated moves leave
/// empty, deepest path first. Targets outside the root or inside the
/// protected set abort planning entirely.
pub fn build_plan(
    groups: &[ModelGroup],
    scanned_dirs: &[PathBuf],
    config: &RunConfig,
    warnings: Vec<String>,
    conflict_count: usize,
    files_hashed: usize,
) -> Result<Plan, Error> {
    ensure_root_allowed(config)?;
    let root = fs::canonicalize(&config.root)?;

    let mut ordered: Vec<&ModelGroup> = groups.iter().collect();
    ordered.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.files.first().map(|f| &f.rel_path).cmp(&b.files.first().map(|f| &f.rel_path)))
    });

    let scanned_dir_set: HashSet<&Path> = scanned_dirs.iter().map(PathBuf::as_path).collect();
    let mut used_names: BTreeSet<String> = BTreeSet::new();
    let mut operations: Vec<PlanOperation> = Vec::new();
    let mut final_paths: Vec<PathBuf> = Vec::new();
    let mut moved_files = 0usize;
    let mut orphan_count = 0usize;
    let mut total_bytes = 0u64;

    for group in &ordered {
        // The resolver guarantees uniqueness within each conflict set; this
        // guards the residual case of a suffixed name colliding with an
        // unrelated group.
        let mut name = group.name.clone();
        if used_names.contains(&name) {
            let mut n = 2;
            while used_names.contains(&format!("{}_{}", group.name, n)) {
                n += 1;
            }
            name = format!("{}_{}", group.name, n);
            warn!("group '{}' renamed to '{}' to stay unique", group.name, name);
        }
        used_names.insert(name.clone());

        let target_dir = root.join(&name);
        if !target_dir.starts_with(&root) {
            return Err(Error::ProtectedPath(target_dir));
        }
        if is_protected(&target_dir, config) {
            return Err(Error::ProtectedPath(target_dir));
        }

        if group.status == GroupStatus::Orphan {
            orphan_count += group.files.len();
        }
        total_bytes += group.total_bytes();
        total_bytes += group.discards.iter().map(|f| f.size).sum::<u64>();

        // Files already at their destination claim their name first so a
        // newcomer cannot steal it from them.
        let mut claimed: BTreeSet<String> = BTreeSet::new();
        let mut moves: Vec<PlanOperation> = Vec::new();
        for file in &group.files {
            if file.path == target_dir.join(file.file_name()) {
                claimed.insert(file.file_name().to_string());
                final_paths.push(file.path.clone());
            }
        }
        for file in &group.files {
            if file.path == target_dir.join(file.file_name()) {
                continue;
            }
            let dst_name = disambiguate(file.file_name(), &claimed);
            claimed.insert(dst_name.clone());
            let dst = target_dir.join(&dst_name);
            final_paths.push(dst.clone());
            moves.push(PlanOperation::MoveFile {
                group: name.clone(),
                src: file.path.clone(),
                dst,
            });
        }

        if !moves.is_empty() && !scanned_dir_set.contains(target_dir.as_path()) {
            operations.push(PlanOperation::CreateDir {
                group: name.clone(),
                path: target_dir.clone(),
            });
        }
        // Discards go before the moves: a merge may have discarded a file
        // sitting exactly where an incoming file lands (pre-organized
        // folder), and the removal must clear that destination first.
        for discard in &group.discards {
            operations.push(PlanOperation::RemoveFile {
                group: name.clone(),
                path: discard.path.clone(),
            });
        }
        moved_files += moves.len();
        operations.extend(moves);
    }

    // Simulate the moves: a scanned directory with no surviving file at or
    // below it will end up empty. Deepest first, so children go before
    // parents.
    let mut removable: Vec<&PathBuf> = scanned_dirs
        .iter()
        .filter(|dir| !final_paths.iter().any(|p| p.starts_with(dir)))
        .collect();
    removable.sort_by(|a, b| {
        b.components()
            .count()
            .cmp(&a.components().count())
            .then_with(|| a.cmp(b))
    });
    for dir in removable {
        operations.push(PlanOperation::RemoveEmptyDir { path: dir.clone() });
    }

    debug!(
        "plan built: {} operations across {} groups",
        operations.len(),
        ordered.len()
    );

    Ok(Plan {
        schema_version: PLAN_SCHEMA_VERSION,
        root,
        operations,
        summary: PlanSummary {
            group_count: groups.len(),
            conflict_count,
            orphan_count,
            files_hashed,
            moved_files,
            total_bytes,
        },
        warnings,
    })
}

/// Pick a destination filename not yet claimed inside the target folder,
/// suffixing the stem with `_2`, `_3`… when needed.
fn disambiguate(file_name: &str, claimed: &BTreeSet<String>) -> String {
    if !claimed.contains(file_name) {
        return file_name.to_string();
    }
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let mut n = 2;
    loop {
        let candidate = match &ext {
            Some(ext) => format!("{}_{}.{}", stem, n, ext),
            None => format!("{}_{}", stem, n),
        };
        if !claimed.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_roots_only_match_exactly() {
        let config = RunConfig::new("/tmp/models");
        assert!(is_protected(Path::new("/"), &config));
        assert!(is_protected(Path::new("/etc"), &config));
        assert!(is_protected(Path::new("/etc/fstab"), &config));
        assert!(!is_protected(Path::new("/tmp/models"), &config));
    }

    #[test]
    fn configured_patterns_extend_the_denylist() {
        let mut config = RunConfig::new("/tmp/models");
        config.protected_paths.push(PathBuf::from("/tmp/models/keep"));
        assert!(is_protected(Path::new("/tmp/models/keep/sub"), &config));
        assert!(!is_protected(Path::new("/tmp/models/other"), &config));
    }

    #[test]
    fn disambiguate_suffixes_before_extension() {
        let mut claimed = BTreeSet::new();
        claimed.insert("a.stl".to_string());
        assert_eq!(disambiguate("a.stl", &claimed), "a_2.stl");
        claimed.insert("a_2.stl".to_string());
        assert_eq!(disambiguate("a.stl", &claimed), "a_3.stl");
        assert_eq!(disambiguate("b.stl", &claimed), "b.stl");
    }
}
