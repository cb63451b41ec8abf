use std::fs;
use tempfile::tempdir;

use modelsort_core::plan::{PLAN_FILE_NAME, PLAN_SCHEMA_VERSION};
use modelsort_core::{Error, OrganizeEngine, Plan, PlanOperation, RunConfig, SilentReporter};

fn plan_for_sample_tree() -> (tempfile::TempDir, Plan) {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    fs::write(root.join("a.stl"), "alpha").unwrap();
    fs::write(root.join("a.jpg"), "img").unwrap();
    fs::create_dir_all(root.join("n1/n2")).unwrap();
    fs::write(root.join("n1/n2/m.stl"), "nested model").unwrap();
    fs::write(root.join("stray.txt"), "orphan").unwrap();

    let plan = OrganizeEngine::new(RunConfig::new(root))
        .plan(&SilentReporter)
        .unwrap();
    (tmp, plan)
}

#[test]
fn plan_round_trips_through_json() {
    let (tmp, plan) = plan_for_sample_tree();

    let path = plan.save().unwrap();
    assert_eq!(path, tmp.path().join(PLAN_FILE_NAME).canonicalize().unwrap());

    let loaded = Plan::load(&path).unwrap();
    assert_eq!(loaded, plan);
}

#[test]
fn plan_file_is_human_readable_json() {
    let (_tmp, plan) = plan_for_sample_tree();
    let path = plan.save().unwrap();
    let text = fs::read_to_string(path).unwrap();
    assert!(text.contains("\"schema_version\""));
    assert!(text.contains("\"op\": \"move_file\""));
    assert!(text.lines().count() > 10, "expected pretty-printed output");
}

#[test]
fn version_mismatch_is_rejected() {
    let (tmp, mut plan) = plan_for_sample_tree();
    plan.schema_version = PLAN_SCHEMA_VERSION + 1;
    let path = tmp.path().join(PLAN_FILE_NAME);
    fs::write(&path, serde_json::to_string_pretty(&plan).unwrap()).unwrap();

    assert!(matches!(Plan::load(&path), Err(Error::PlanIntegrity(_))));
}

#[test]
fn malformed_plan_is_rejected() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join(PLAN_FILE_NAME);
    fs::write(&path, "{\"schema_version\": 1, \"operations\": oops").unwrap();
    assert!(matches!(Plan::load(&path), Err(Error::PlanIntegrity(_))));

    assert!(matches!(
        Plan::load(&tmp.path().join("missing.json")),
        Err(Error::PlanIntegrity(_))
    ));
}

#[test]
fn create_dir_precedes_moves_within_each_group() {
    let (_tmp, plan) = plan_for_sample_tree();

    for (i, op) in plan.operations.iter().enumerate() {
        if let PlanOperation::MoveFile { group, dst, .. } = op {
            let dir = dst.parent().unwrap();
            let created_before = plan.operations[..i].iter().any(|prev| {
                matches!(prev, PlanOperation::CreateDir { group: g, path } if g == group && path == dir)
            });
            let preexisting = !plan.operations.iter().any(|any| {
                matches!(any, PlanOperation::CreateDir { path, .. } if path == dir)
            });
            assert!(
                created_before || preexisting,
                "move at index {} has no preceding create_dir",
                i
            );
        }
    }
}

#[test]
fn empty_dirs_are_removed_deepest_first() {
    let (_tmp, plan) = plan_for_sample_tree();

    let removals: Vec<_> = plan
        .operations
        .iter()
        .filter_map(|op| match op {
            PlanOperation::RemoveEmptyDir { path } => Some(path.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(removals.len(), 2, "n1 and n1/n2 should both empty out");
    assert!(removals[0].ends_with("n1/n2"));
    assert!(removals[1].ends_with("n1"));

    // And removals come after every move.
    let last_move = plan
        .operations
        .iter()
        .rposition(|op| matches!(op, PlanOperation::MoveFile { .. }))
        .unwrap();
    let first_removal = plan
        .operations
        .iter()
        .position(|op| matches!(op, PlanOperation::RemoveEmptyDir { .. }))
        .unwrap();
    assert!(first_removal > last_move);
}

#[test]
fn saved_plan_is_invisible_to_the_next_scan() {
    let (tmp, plan) = plan_for_sample_tree();
    plan.save().unwrap();

    let replan = OrganizeEngine::new(RunConfig::new(tmp.path()))
        .plan(&SilentReporter)
        .unwrap();
    let mentions_plan_file = replan.operations.iter().any(|op| match op {
        PlanOperation::MoveFile { src, .. } => src.ends_with(PLAN_FILE_NAME),
        _ => false,
    });
    assert!(!mentions_plan_file);
    assert_eq!(replan.operations, plan.operations);
}

#[test]
fn executing_against_a_different_root_is_rejected() {
    let (_tmp, plan) = plan_for_sample_tree();

    let other = tempdir().unwrap();
    let engine = OrganizeEngine::new(
        RunConfig::new(other.path()).with_mode(modelsort_core::ExecutionMode::Commit),
    );
    let result = engine.execute(
        &plan,
        &std::sync::atomic::AtomicBool::new(false),
        &SilentReporter,
    );
    assert!(matches!(result, Err(Error::PlanIntegrity(_))));
}
