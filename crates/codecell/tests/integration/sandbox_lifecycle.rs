use codecell::ExecutionRequest;
use codecell::sandbox::SandboxBackend;
use codecell::types::ResourceLimits;

use super::{fixture_source, test_runner};

#[tokio::test]
#[ignore = "requires docker"]
async fn test_container_and_workspace_removed() {
    let staging = tempfile::tempdir().unwrap();
    let runner = test_runner(&staging);

    let request = ExecutionRequest::new("python", fixture_source("hello.py"));
    runner.submit(&request, None).await.expect("Request rejected");

    let created = runner.backend().created();
    assert_eq!(created.len(), 1);

    let managed = runner.backend().inner.list_managed().await.unwrap();
    assert!(!managed.contains(&created[0]));
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_timed_out_container_removed() {
    let staging = tempfile::tempdir().unwrap();
    let runner = test_runner(&staging);
    let limits = ResourceLimits::none().with_wall_time_limit(1.0);

    let request = ExecutionRequest::new("python", fixture_source("infinite_loop.py"));
    let result = runner.submit(&request, Some(&limits)).await.unwrap();
    assert!(result.timed_out);

    let created = runner.backend().created();
    let managed = runner.backend().inner.list_managed().await.unwrap();
    assert!(!managed.contains(&created[0]));
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_concurrent_runs_are_isolated() {
    let staging = tempfile::tempdir().unwrap();
    let runner = test_runner(&staging);

    let a = ExecutionRequest::new("python", "print('first')");
    let b = ExecutionRequest::new("python", "print('second')");
    let (ra, rb) = tokio::join!(runner.submit(&a, None), runner.submit(&b, None));

    assert_eq!(ra.unwrap().stdout, "first\n");
    assert_eq!(rb.unwrap().stdout, "second\n");

    let created = runner.backend().created();
    assert_eq!(created.len(), 2);
    assert_ne!(created[0], created[1]);
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_missing_image_reports_on_stderr() {
    let staging = tempfile::tempdir().unwrap();
    let mut runner_config = super::test_config(&staging);
    runner_config.pull_missing_images = false;
    if let Some(python) = runner_config.languages.get_mut("python") {
        python.image = "codecell-test/does-not-exist:never".to_owned();
    }
    let runner = codecell::Runner::new(runner_config, super::RecordingDocker::connect());

    let request = ExecutionRequest::new("python", "print(1)");
    let result = runner.submit(&request, None).await.unwrap();

    assert_eq!(result.stdout, "");
    assert!(!result.stderr.is_empty());
    assert!(runner.backend().created().is_empty());
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_remove_of_missing_container_is_ok() {
    let runner = test_runner(&tempfile::tempdir().unwrap());
    runner
        .backend()
        .remove("codecell-never-created")
        .await
        .expect("removing a missing container should succeed");
}
