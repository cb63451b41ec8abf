use crate::grouper::{GroupStatus, ModelGroup};
use crate::hasher::HashCache;
use crate::progress::ProgressReporter;
use crate::scanner::FileRole;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct ResolveOutcome {
    pub groups: Vec<ModelGroup>,
    /// Number of proposed names that needed content analysis.
    pub conflict_sets: usize,
    pub files_hashed: usize,
    pub warnings: Vec<String>,
}

/// Decide the fate of every group whose proposed folder name collides.
///
/// Groups with a unique name pass through untouched — and unhashed, which is
/// the fast path that keeps large archives cheap. Colliding groups have
/// their model files hashed; identical hash multisets merge into one group,
/// distinct ones get deterministic `_2`, `_3`… suffixes in scan order. A
/// group whose files cannot be hashed (raced with the filesystem) degrades
/// to rename-with-suffix instead of merging.
pub fn resolve(
    groups: Vec<ModelGroup>,
    cache: &HashCache,
    reporter: &dyn ProgressReporter,
) -> ResolveOutcome {
    let mut by_name: BTreeMap<String, Vec<ModelGroup>> = BTreeMap::new();
    for group in groups {
        by_name.entry(group.name.clone()).or_default().push(group);
    }

    let conflict_sets = by_name.values().filter(|members| members.len() > 1).count();
    reporter.on_resolve_start(conflict_sets);
    if conflict_sets == 0 {
        debug!("no name collisions, skipping content analysis entirely");
    } else {
        info!("{} name collisions require content analysis", conflict_sets);
    }

    let mut resolved: Vec<ModelGroup> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    for (name, mut members) in by_name {
        if members.len() == 1 {
            resolved.push(members.pop().expect("singleton partition"));
            continue;
        }
        resolved.extend(resolve_conflict_set(
            &name,
            members,
            cache,
            reporter,
            &mut warnings,
        ));
    }

    ResolveOutcome {
        groups: resolved,
        conflict_sets,
        files_hashed: cache.len(),
        warnings,
    }
}

fn resolve_conflict_set(
    name: &str,
    mut members: Vec<ModelGroup>,
    cache: &HashCache,
    reporter: &dyn ProgressReporter,
    warnings: &mut Vec<String>,
) -> Vec<ModelGroup> {
    for member in &mut members {
        member.status = GroupStatus::Conflicted;
    }

    // Hash every model file in the set, in parallel. This is the only place
    // in the whole pipeline that reads file contents.
    let targets: Vec<(usize, usize)> = members
        .iter()
        .enumerate()
        .flat_map(|(gi, group)| {
            group
                .files
                .iter()
                .enumerate()
                .filter(|(_, f)| f.role == FileRole::Model)
                .map(move |(fi, _)| (gi, fi))
        })
        .collect();
    let total = targets.len();
    let done = AtomicUsize::new(0);

    let hashes: Vec<((usize, usize), std::io::Result<String>)> = targets
        .par_iter()
        .map(|&(gi, fi)| {
            let result = cache.get_or_compute(&members[gi].files[fi].path);
            reporter.on_hash_progress(done.fetch_add(1, Ordering::Relaxed) + 1, total);
            ((gi, fi), result)
        })
        .collect();

    let mut degraded = vec![false; members.len()];
    for ((gi, fi), result) in hashes {
        match result {
            Ok(hash) => members[gi].files[fi].content_hash = Some(hash),
            Err(e) => {
                degraded[gi] = true;
                let message = format!(
                    "could not hash '{}' ({}); group '{}' falls back to rename",
                    members[gi].files[fi].path.display(),
                    e,
                    name
                );
                warn!("{}", message);
                warnings.push(message);
            }
        }
    }

    // Partition members by their model-hash multiset, preserving scan order.
    // Degraded groups and groups with nothing hashable never merge.
    let mut buckets: Vec<(Option<Vec<String>>, Vec<ModelGroup>)> = Vec::new();
    for (gi, group) in members.into_iter().enumerate() {
        let key = if degraded[gi] {
            None
        } else {
            let mut multiset: Vec<String> = group
                .model_files()
                .filter_map(|f| f.content_hash.clone())
                .collect();
            multiset.sort();
            if multiset.is_empty() {
                None
            } else {
                Some(multiset)
            }
        };

        match key {
            Some(ref k) => {
                if let Some((_, bucket)) = buckets
                    .iter_mut()
                    .find(|(bk, _)| bk.as_ref() == Some(k))
                {
                    bucket.push(group);
                } else {
                    buckets.push((key, vec![group]));
                }
            }
            None => buckets.push((None, vec![group])),
        }
    }

    // First surviving group keeps the contested name, the rest get numeric
    // suffixes. Bucket order follows the earliest member's scan order, so an
    // unchanged tree reproduces identical assignments.
    let mut survivors: Vec<ModelGroup> = Vec::new();
    for (index, (_, mut bucket)) in buckets.into_iter().enumerate() {
        let mut primary = bucket.remove(0);
        let merged = bucket.len();
        for duplicate in bucket {
            merge_into(&mut primary, duplicate);
        }
        if merged > 0 {
            info!(
                "merged {} duplicate group(s) into '{}'",
                merged, primary.name
            );
        }
        if index > 0 {
            primary.name = format!("{}_{}", name, index + 1);
        }
        primary.status = GroupStatus::Resolved;
        survivors.push(primary);
    }

    survivors
}

/// Fold a duplicate group into its surviving twin. Model files whose name is
/// already present are redundant copies (their content is covered by the
/// identical hash multiset) and become discards. Same-named support files
/// keep the larger of the two; distinct names are unioned.
fn merge_into(primary: &mut ModelGroup, duplicate: ModelGroup) {
    for file in duplicate.files {
        let existing = primary
            .files
            .iter()
            .position(|f| f.file_name() == file.file_name());
        match existing {
            None => primary.files.push(file),
            Some(i) => {
                if file.role != FileRole::Model && file.size > primary.files[i].size {
                    let loser = std::mem::replace(&mut primary.files[i], file);
                    primary.discards.push(loser);
                } else {
                    primary.discards.push(file);
                }
            }
        }
    }
    primary.discards.extend(duplicate.discards);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::FileRecord;
    use std::path::PathBuf;

    fn group(name: &str, files: Vec<FileRecord>) -> ModelGroup {
        ModelGroup {
            name: name.to_string(),
            files,
            status: GroupStatus::Clean,
            discards: Vec::new(),
        }
    }

    fn support(rel: &str, size: u64) -> FileRecord {
        FileRecord {
            path: PathBuf::from("/library").join(rel),
            rel_path: PathBuf::from(rel),
            size,
            extension: "jpg".to_string(),
            role: FileRole::Support,
            content_hash: None,
        }
    }

    #[test]
    fn merge_keeps_larger_support_file() {
        let mut primary = group("a", vec![support("a.jpg", 100)]);
        let duplicate = group("a", vec![support("b/a.jpg", 250), support("b/extra.txt", 5)]);

        merge_into(&mut primary, duplicate);

        assert_eq!(primary.files.len(), 2);
        let kept = primary.files.iter().find(|f| f.file_name() == "a.jpg").unwrap();
        assert_eq!(kept.size, 250);
        assert_eq!(primary.discards.len(), 1);
        assert_eq!(primary.discards[0].size, 100);
    }

    #[test]
    fn unreadable_model_degrades_to_rename() {
        // Paths that do not exist: hashing fails, so the two groups must not
        // merge and both survive with distinct names.
        let model = |rel: &str| FileRecord {
            path: PathBuf::from("/nonexistent").join(rel),
            rel_path: PathBuf::from(rel),
            size: 10,
            extension: "stl".to_string(),
            role: FileRole::Model,
            content_hash: None,
        };
        let cache = HashCache::new();
        let outcome = resolve(
            vec![
                group("a", vec![model("a.stl")]),
                group("a", vec![model("b/a.stl")]),
            ],
            &cache,
            &crate::SilentReporter,
        );

        assert_eq!(outcome.conflict_sets, 1);
        assert_eq!(outcome.groups.len(), 2);
        let mut names: Vec<&str> = outcome.groups.iter().map(|g| g.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "a_2"]);
        assert!(!outcome.warnings.is_empty());
    }
}
