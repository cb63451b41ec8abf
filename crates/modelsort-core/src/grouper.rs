use crate::config::RunConfig;
use crate::scanner::{FileRecord, FileRole};
use glob::Pattern;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

pub const SCRAP_DIR_NAME: &str = "Scrap";

/// Qualifier stripping is bounded so a pathological rule set cannot loop.
const MAX_STRIP_PASSES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GroupStatus {
    Clean,
    Conflicted,
    Resolved,
    Orphan,
}

/// A proposed model folder: one or more model files plus their supporting
/// assets, or an orphan ("Scrap") bucket. Created here, mutated only by the
/// conflict resolver, finalized by the plan builder.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelGroup {
    /// Proposed target folder name, relative to the output root.
    pub name: String,
    pub files: Vec<FileRecord>,
    pub status: GroupStatus,
    /// Redundant copies discarded by a merge. Their content survives in
    /// `files`, so removing them loses nothing.
    pub discards: Vec<FileRecord>,
}

impl ModelGroup {
    pub fn model_files(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.iter().filter(|f| f.role == FileRole::Model)
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Cluster scanned files into candidate model groups.
///
/// Files are keyed by (source directory, inferred base name): files sitting
/// together whose stems reduce to the same base form one group. Groups from
/// different directories that propose the same folder name surface later as
/// conflicts, which is how nested copies of a model get flattened to the top
/// level. Files with no model sibling become per-top-level-directory Scrap
/// groups. Anything already under `Scrap/` stays where it is.
pub fn group_files(mut records: Vec<FileRecord>, config: &RunConfig) -> Vec<ModelGroup> {
    records.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    let rules = compile_rules(&config.strip_rules);

    let mut keyed: BTreeMap<(PathBuf, String), Vec<FileRecord>> = BTreeMap::new();
    let mut parked: BTreeMap<String, Vec<FileRecord>> = BTreeMap::new();

    for record in records {
        if record.top_level_dir().as_deref() == Some(SCRAP_DIR_NAME) {
            // Previously scrapped content is never re-organized.
            let name = record
                .rel_path
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|| SCRAP_DIR_NAME.to_string());
            parked.entry(name).or_default().push(record);
            continue;
        }

        let parent = record
            .rel_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default();
        let stem = record
            .rel_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| record.file_name().to_string());
        let base = infer_base(&stem, &rules);
        keyed.entry((parent, base)).or_default().push(record);
    }

    let mut groups: Vec<ModelGroup> = Vec::new();
    let mut orphans: BTreeMap<String, Vec<FileRecord>> = BTreeMap::new();

    for ((_parent, base), files) in keyed {
        let has_model = files.iter().any(|f| f.role == FileRole::Model);
        if has_model {
            groups.push(ModelGroup {
                name: sanitize_name(&base),
                files,
                status: GroupStatus::Clean,
                discards: Vec::new(),
            });
        } else {
            for file in files {
                let bucket = match file.top_level_dir() {
                    Some(top) => format!("{}/{}", SCRAP_DIR_NAME, sanitize_name(&top)),
                    None => SCRAP_DIR_NAME.to_string(),
                };
                orphans.entry(bucket).or_default().push(file);
            }
        }
    }

    // Content already parked under Scrap/ shares its bucket with newly
    // orphaned files headed for the same place.
    for (name, files) in parked {
        orphans.entry(name).or_default().extend(files);
    }
    for (name, files) in orphans {
        groups.push(ModelGroup {
            name,
            files,
            status: GroupStatus::Orphan,
            discards: Vec::new(),
        });
    }

    groups
}

fn compile_rules(rules: &[String]) -> Vec<Pattern> {
    rules
        .iter()
        .filter_map(|rule| match Pattern::new(rule) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("invalid strip rule '{}': {}", rule, e);
                None
            }
        })
        .collect()
}

/// Strip trailing qualifiers ("_v2", "_3", "(1)"…) from a file stem to get
/// the model's base name. Each pass removes the longest suffix matched by
/// any rule; passes repeat until nothing strips or the bound is hit. An
/// empty result falls back to the original stem.
fn infer_base(stem: &str, rules: &[Pattern]) -> String {
    let mut base = stem.trim().to_string();

    for _ in 0..MAX_STRIP_PASSES {
        let mut stripped = false;
        for rule in rules {
            if let Some(at) = base
                .char_indices()
                .skip(1)
                .map(|(i, _)| i)
                .find(|&i| rule.matches(&base[i..]))
            {
                base.truncate(at);
                stripped = true;
                break;
            }
        }
        if !stripped {
            break;
        }
        base = base.trim_end_matches([' ', '_', '-']).to_string();
    }

    if base.is_empty() {
        stem.to_string()
    } else {
        base
    }
}

/// Folder-safe rendition of a base name.
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '#' | '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches([' ', '.']).to_string();
    if trimmed.is_empty() {
        "unnamed_model".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::FileRole;
    use std::path::Path;

    fn record(rel: &str, role: FileRole, size: u64) -> FileRecord {
        let rel_path = PathBuf::from(rel);
        FileRecord {
            path: Path::new("/library").join(&rel_path),
            extension: rel_path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default(),
            rel_path,
            size,
            role,
            content_hash: None,
        }
    }

    fn rules() -> Vec<Pattern> {
        compile_rules(&crate::config::RunConfig::new("/library").strip_rules)
    }

    #[test]
    fn base_name_strips_version_tags() {
        let rules = rules();
        assert_eq!(infer_base("dragon_v2", &rules), "dragon");
        assert_eq!(infer_base("dragon_12", &rules), "dragon");
        assert_eq!(infer_base("dragon (3)", &rules), "dragon");
        assert_eq!(infer_base("dragon", &rules), "dragon");
        assert_eq!(infer_base("dragon_blue", &rules), "dragon_blue");
    }

    #[test]
    fn base_name_never_empties() {
        let rules = rules();
        assert_eq!(infer_base("_v2", &rules), "_v2");
    }

    #[test]
    fn sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_name("what?bad:name"), "what_bad_name");
        assert_eq!(sanitize_name("  .."), "unnamed_model");
        assert_eq!(sanitize_name("fine name"), "fine name");
    }

    #[test]
    fn versioned_files_share_a_group() {
        let config = RunConfig::new("/library");
        let groups = group_files(
            vec![
                record("dragon.stl", FileRole::Model, 10),
                record("dragon_v2.stl", FileRole::Model, 12),
                record("dragon.jpg", FileRole::Support, 3),
            ],
            &config,
        );
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "dragon");
        assert_eq!(groups[0].files.len(), 3);
        assert_eq!(groups[0].status, GroupStatus::Clean);
    }

    #[test]
    fn same_name_in_different_dirs_stays_separate() {
        let config = RunConfig::new("/library");
        let groups = group_files(
            vec![
                record("a.stl", FileRole::Model, 10),
                record("b/a.stl", FileRole::Model, 11),
            ],
            &config,
        );
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.name == "a"));
    }

    #[test]
    fn orphans_bucket_per_top_level_dir() {
        let config = RunConfig::new("/library");
        let groups = group_files(
            vec![
                record("note.txt", FileRole::Support, 1),
                record("kits/readme.txt", FileRole::Support, 1),
            ],
            &config,
        );
        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Scrap", "Scrap/kits"]);
        assert!(groups.iter().all(|g| g.status == GroupStatus::Orphan));
    }

    #[test]
    fn existing_scrap_content_is_parked() {
        let config = RunConfig::new("/library");
        let groups = group_files(
            vec![record("Scrap/old/junk.txt", FileRole::Support, 1)],
            &config,
        );
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Scrap/old");
        assert_eq!(groups[0].status, GroupStatus::Orphan);
    }
}
