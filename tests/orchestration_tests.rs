mod common;

use assert_matches::assert_matches;
use chrono::Utc;
use flate2::read::GzDecoder;
use std::sync::Arc;
use std::time::Duration;

use common::{names, test_config, InMemoryHost, InMemoryStore, ORG};
use repo_maintenance::backup::ALREADY_BACKED_UP;
use repo_maintenance::{BackupOrchestrator, BackupResult, FatalError, KeyLayout, ProbeErrorPolicy};

const SCENARIO_NAMES: [&str; 4] = [
    "lecture-python.myst",
    "lecture-julia",
    "quantecon-notebooks-python",
    "other-repo",
];

fn orchestrator(
    config: &repo_maintenance::Config,
    host: &Arc<InMemoryHost>,
    store: &Arc<InMemoryStore>,
) -> BackupOrchestrator {
    BackupOrchestrator::new(config, host.clone(), store.clone()).expect("valid configuration")
}

fn assert_partitioned(result: &BackupResult) {
    assert_eq!(
        result.total_repos,
        result.successful.len() + result.failed.len() + result.skipped.len()
    );

    let mut seen: Vec<&str> = result
        .successful
        .iter()
        .map(|r| r.full_name.as_str())
        .chain(result.failed.iter().map(|(r, _)| r.full_name.as_str()))
        .chain(result.skipped.iter().map(|(r, _)| r.full_name.as_str()))
        .collect();
    let before = seen.len();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), before, "a repository landed in two buckets");
}

#[tokio::test]
async fn test_patterns_select_candidates_in_order() {
    let host = Arc::new(InMemoryHost::with_repositories(&SCENARIO_NAMES));
    let store = Arc::new(InMemoryStore::new());

    let config = test_config(&["lecture-.*", "quantecon-.*"]);
    let result = orchestrator(&config, &host, &store)
        .run(ORG, true)
        .await
        .unwrap();

    assert_eq!(
        names(&result.successful),
        vec!["lecture-python.myst", "lecture-julia", "quantecon-notebooks-python"]
    );
    assert_eq!(result.total_repos, 3);
    assert!(!host.fetched().contains(&"other-repo".to_string()));
    assert_eq!(
        store.keys(),
        vec![
            "backups/quantecon/lecture-julia.tar.gz",
            "backups/quantecon/lecture-python.myst.tar.gz",
            "backups/quantecon/quantecon-notebooks-python.tar.gz",
        ]
    );
    assert_partitioned(&result);
}

#[tokio::test]
async fn test_anchored_pattern_matches_exact_name_only() {
    let host = Arc::new(InMemoryHost::with_repositories(&[
        "specific-repo",
        "specific-repo-extra",
        "prefix-specific-repo",
    ]));
    let store = Arc::new(InMemoryStore::new());

    let config = test_config(&["^specific-repo$"]);
    let result = orchestrator(&config, &host, &store)
        .run(ORG, true)
        .await
        .unwrap();

    assert_eq!(names(&result.successful), vec!["specific-repo"]);
    assert_eq!(result.total_repos, 1);
}

#[tokio::test]
async fn test_existing_backup_is_skipped_without_upload() {
    let host = Arc::new(InMemoryHost::with_repositories(&["lecture-julia", "lecture-jax"]));
    let store = Arc::new(
        InMemoryStore::new().seeded("backups/quantecon/lecture-julia.tar.gz", 1024),
    );

    let config = test_config(&["lecture-.*"]);
    let result = orchestrator(&config, &host, &store)
        .run(ORG, true)
        .await
        .unwrap();

    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].0.name, "lecture-julia");
    assert_eq!(result.skipped[0].1, ALREADY_BACKED_UP);
    assert_eq!(names(&result.successful), vec!["lecture-jax"]);
    assert!(result.failed.is_empty());

    // Only lecture-jax was cloned and uploaded; the seeded object is untouched
    assert_eq!(host.fetched(), vec!["lecture-jax".to_string()]);
    assert_eq!(store.put_count(), 1);
    let seeded = store.object("backups/quantecon/lecture-julia.tar.gz").unwrap();
    assert_eq!(seeded.body.len(), 1024);
    assert!(seeded.metadata.is_none());
}

#[tokio::test]
async fn test_one_failure_does_not_abort_the_run() {
    let host = Arc::new(
        InMemoryHost::with_repositories(&["repo-a", "repo-b", "repo-c", "repo-d"]).failing("repo-b"),
    );
    let store = Arc::new(InMemoryStore::new().seeded("backups/quantecon/repo-d.tar.gz", 10));

    let config = test_config(&["repo-.*"]);
    let result = orchestrator(&config, &host, &store)
        .run(ORG, true)
        .await
        .unwrap();

    assert_eq!(result.total_repos, 4);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].0.name, "repo-b");
    assert!(result.failed[0].1.contains("not found"));
    assert_eq!(result.successful.len() + result.skipped.len(), 3);
    assert_eq!(names(&result.successful), vec!["repo-a", "repo-c"]);
    assert!(!result.is_success());
    assert_partitioned(&result);
}

#[tokio::test]
async fn test_concurrent_run_keeps_candidate_order() {
    // Earlier candidates finish last
    let host = Arc::new(
        InMemoryHost::with_repositories(&["repo-1", "repo-2", "repo-3", "repo-4", "repo-5"])
            .delayed("repo-1", Duration::from_millis(120))
            .delayed("repo-2", Duration::from_millis(90))
            .delayed("repo-3", Duration::from_millis(60))
            .delayed("repo-4", Duration::from_millis(30))
            .failing("repo-3"),
    );
    let store = Arc::new(InMemoryStore::new());

    let mut config = test_config(&["repo-"]);
    config.backup.max_parallel = 5;
    let result = orchestrator(&config, &host, &store)
        .run(ORG, true)
        .await
        .unwrap();

    assert_eq!(
        names(&result.successful),
        vec!["repo-1", "repo-2", "repo-4", "repo-5"]
    );
    assert_eq!(result.failed[0].0.name, "repo-3");
    assert_ne!(host.fetched()[0], "repo-1");
}

#[tokio::test]
async fn test_parallelism_is_bounded() {
    let names: Vec<String> = (0..8).map(|i| format!("repo-{}", i)).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let mut host = InMemoryHost::with_repositories(&refs);
    for name in &refs {
        host = host.delayed(name, Duration::from_millis(25));
    }
    let host = Arc::new(host);
    let store = Arc::new(InMemoryStore::new());

    let mut config = test_config(&["repo-"]);
    config.backup.max_parallel = 2;
    let result = orchestrator(&config, &host, &store)
        .run(ORG, true)
        .await
        .unwrap();

    assert_eq!(result.successful.len(), 8);
    assert!(host.peak_concurrency() <= 2);
    assert!(host.peak_concurrency() >= 1);
}

#[tokio::test]
async fn test_sequential_run_with_single_worker() {
    let host = Arc::new(InMemoryHost::with_repositories(&["b-repo", "a-repo", "c-repo"]));
    let store = Arc::new(InMemoryStore::new());

    let mut config = test_config(&[".*"]);
    config.backup.max_parallel = 1;
    let result = orchestrator(&config, &host, &store)
        .run(ORG, true)
        .await
        .unwrap();

    assert_eq!(host.fetched(), vec!["b-repo", "a-repo", "c-repo"]);
    assert_eq!(names(&result.successful), vec!["b-repo", "a-repo", "c-repo"]);
    assert_eq!(host.peak_concurrency(), 1);
}

#[tokio::test]
async fn test_second_run_skips_everything() {
    let host = Arc::new(InMemoryHost::with_repositories(&["lecture-julia", "lecture-jax"]));
    let store = Arc::new(InMemoryStore::new());
    let config = test_config(&["lecture-.*"]);

    let first = orchestrator(&config, &host, &store).run(ORG, true).await.unwrap();
    assert_eq!(first.successful.len(), 2);

    let second = orchestrator(&config, &host, &store).run(ORG, true).await.unwrap();
    assert!(second.successful.is_empty());
    assert_eq!(second.skipped.len(), 2);
    assert_eq!(store.put_count(), 2);
}

#[tokio::test]
async fn test_force_backs_up_existing_repositories() {
    let host = Arc::new(InMemoryHost::with_repositories(&["lecture-julia"]));
    let store = Arc::new(
        InMemoryStore::new().seeded("backups/quantecon/lecture-julia.tar.gz", 1024),
    );

    let config = test_config(&["lecture-.*"]);
    let result = orchestrator(&config, &host, &store)
        .run(ORG, false)
        .await
        .unwrap();

    assert_eq!(names(&result.successful), vec!["lecture-julia"]);
    assert_eq!(store.head_count(), 0);

    let stored = store.object("backups/quantecon/lecture-julia.tar.gz").unwrap();
    assert_ne!(stored.body.len(), 1024);
    let metadata = stored.metadata.unwrap();
    assert_eq!(metadata.repository, "quantecon/lecture-julia");
    assert_eq!(metadata.default_branch, "main");
    assert_eq!(metadata.size_bytes, stored.body.len() as u64);
}

#[tokio::test]
async fn test_uploaded_artifact_is_restorable() {
    let host = Arc::new(InMemoryHost::with_repositories(&["lecture-julia"]));
    let store = Arc::new(InMemoryStore::new());

    let config = test_config(&["lecture-julia"]);
    orchestrator(&config, &host, &store).run(ORG, true).await.unwrap();

    let stored = store.object("backups/quantecon/lecture-julia.tar.gz").unwrap();
    let restore = tempfile::TempDir::new().unwrap();
    tar::Archive::new(GzDecoder::new(stored.body.as_slice()))
        .unpack(restore.path())
        .unwrap();

    let head = std::fs::read_to_string(restore.path().join("lecture-julia.git/refs/heads/main")).unwrap();
    assert_eq!(head, "lecture-julia\n");
}

#[tokio::test]
async fn test_repeated_backups_are_byte_identical() {
    let host = Arc::new(InMemoryHost::with_repositories(&["lecture-julia"]));
    let store = Arc::new(InMemoryStore::new());
    let config = test_config(&["lecture-julia"]);

    orchestrator(&config, &host, &store).run(ORG, false).await.unwrap();
    let first = store.object("backups/quantecon/lecture-julia.tar.gz").unwrap().body;

    orchestrator(&config, &host, &store).run(ORG, false).await.unwrap();
    let second = store.object("backups/quantecon/lecture-julia.tar.gz").unwrap().body;

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_daily_layout_keys() {
    let host = Arc::new(InMemoryHost::with_repositories(&["lecture-julia"]));
    let store = Arc::new(InMemoryStore::new());

    let mut config = test_config(&["lecture-julia"]);
    config.backup.key_layout = KeyLayout::Daily;
    config.backup.s3.prefix = "archive".to_string();

    let before = Utc::now().date_naive();
    orchestrator(&config, &host, &store).run(ORG, true).await.unwrap();
    let after = Utc::now().date_naive();

    let keys = store.keys();
    assert_eq!(keys.len(), 1);
    let candidates = [before, after].map(|date| {
        format!(
            "archive/quantecon/lecture-julia/lecture-julia-{}.tar.gz",
            date.format("%Y%m%d")
        )
    });
    assert!(candidates.contains(&keys[0]), "unexpected key {}", keys[0]);
}

#[tokio::test]
async fn test_probe_error_proceeds_by_default() {
    let host = Arc::new(InMemoryHost::with_repositories(&["lecture-julia"]));
    let store = Arc::new(
        InMemoryStore::new().failing_head("backups/quantecon/lecture-julia.tar.gz"),
    );

    let config = test_config(&["lecture-julia"]);
    let result = orchestrator(&config, &host, &store)
        .run(ORG, true)
        .await
        .unwrap();

    assert_eq!(names(&result.successful), vec!["lecture-julia"]);
    assert_eq!(store.put_count(), 1);
}

#[tokio::test]
async fn test_probe_error_can_fail_the_repository() {
    let host = Arc::new(InMemoryHost::with_repositories(&["lecture-julia"]));
    let store = Arc::new(
        InMemoryStore::new().failing_head("backups/quantecon/lecture-julia.tar.gz"),
    );

    let mut config = test_config(&["lecture-julia"]);
    config.backup.on_probe_error = ProbeErrorPolicy::Fail;
    let result = orchestrator(&config, &host, &store)
        .run(ORG, true)
        .await
        .unwrap();

    assert_eq!(result.failed.len(), 1);
    assert!(result.failed[0].1.contains("SlowDown"));
    assert!(host.fetched().is_empty());
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn test_timeout_is_recorded_as_failure() {
    let host = Arc::new(
        InMemoryHost::with_repositories(&["fast", "slow"]).delayed("slow", Duration::from_secs(30)),
    );
    let store = Arc::new(InMemoryStore::new());

    let mut config = test_config(&[".*"]);
    config.backup.timeout = 1;
    let result = orchestrator(&config, &host, &store)
        .run(ORG, true)
        .await
        .unwrap();

    assert_eq!(names(&result.successful), vec!["fast"]);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].0.name, "slow");
    assert_eq!(result.failed[0].1, "timeout");
}

#[tokio::test]
async fn test_unknown_organization_aborts_without_result() {
    let host = Arc::new(InMemoryHost::missing_organization());
    let store = Arc::new(InMemoryStore::new());

    let config = test_config(&[".*"]);
    let result = orchestrator(&config, &host, &store).run("nope", true).await;

    assert_matches!(result, Err(FatalError::OrganizationNotFound(org)) if org == "nope");
    assert_eq!(store.head_count(), 0);
}

#[tokio::test]
async fn test_empty_pattern_set_is_a_valid_empty_run() {
    let host = Arc::new(InMemoryHost::with_repositories(&SCENARIO_NAMES));
    let store = Arc::new(InMemoryStore::new());

    let config = test_config(&[]);
    let result = orchestrator(&config, &host, &store)
        .run(ORG, true)
        .await
        .unwrap();

    assert_eq!(result, BackupResult::default());
    assert!(result.is_success());
    assert!(host.fetched().is_empty());
}

#[test]
fn test_invalid_pattern_is_a_configuration_error() {
    let host = Arc::new(InMemoryHost::with_repositories(&SCENARIO_NAMES));
    let store = Arc::new(InMemoryStore::new());

    let config = test_config(&["lecture-[", "quantecon-.*"]);
    let result = BackupOrchestrator::new(&config, host.clone(), store);

    assert_matches!(
        result.err(),
        Some(repo_maintenance::ConfigError::InvalidPattern { pattern, .. }) if pattern == "lecture-["
    );
    assert!(host.fetched().is_empty());
}

#[tokio::test]
async fn test_result_serializes_buckets() {
    let host = Arc::new(InMemoryHost::with_repositories(&["lecture-julia", "lecture-jax"]).failing("lecture-jax"));
    let store = Arc::new(InMemoryStore::new());

    let config = test_config(&["lecture-.*"]);
    let result = orchestrator(&config, &host, &store)
        .run(ORG, true)
        .await
        .unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["total_repos"], 2);
    assert_eq!(json["successful"][0]["full_name"], "quantecon/lecture-julia");
    assert_eq!(json["failed"][0][0]["name"], "lecture-jax");
    assert!(json["failed"][0][1].as_str().unwrap().starts_with("clone failed"));
}

#[quickcheck_macros::quickcheck]
fn prop_every_candidate_lands_in_exactly_one_bucket(plan: Vec<(bool, bool)>) -> bool {
    // (clone fails, already backed up) per repository
    let plan: Vec<(bool, bool)> = plan.into_iter().take(8).collect();
    let repo_names: Vec<String> = (0..plan.len()).map(|i| format!("repo-{}", i)).collect();
    let refs: Vec<&str> = repo_names.iter().map(String::as_str).collect();

    let mut host = InMemoryHost::with_repositories(&refs);
    let mut store = InMemoryStore::new();
    for (name, (fails, exists)) in refs.iter().zip(&plan) {
        if *fails {
            host = host.failing(name);
        }
        if *exists {
            store = store.seeded(&format!("backups/quantecon/{}.tar.gz", name), 64);
        }
    }
    let host = Arc::new(host);
    let store = Arc::new(store);

    let mut config = test_config(&["repo-"]);
    config.backup.max_parallel = 3;
    let result = tokio_test::block_on(orchestrator(&config, &host, &store).run(ORG, true))
        .expect("listing succeeds");

    let expected_skipped = plan.iter().filter(|(_, exists)| *exists).count();
    let expected_failed = plan.iter().filter(|(fails, exists)| *fails && !*exists).count();

    result.total_repos == plan.len()
        && result.total_repos
            == result.successful.len() + result.failed.len() + result.skipped.len()
        && result.skipped.len() == expected_skipped
        && result.failed.len() == expected_failed
        && store.put_count() == plan.len() - expected_skipped - expected_failed
}
