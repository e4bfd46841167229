// ABOUTME: Rolling restarts and their health gate against the in-memory platform.
// ABOUTME: Checks success, timeout diagnostics, and that status reporting stops with the gate.

mod support;

use stagecraft::error::Error;
use stagecraft::platform::{PlatformError, ResourceKind};
use stagecraft::rollout;
use std::sync::Arc;
use std::time::Duration;
use support::Project;
use support::fake_platform::{Call, FakePlatform};

#[tokio::test(start_paused = true)]
async fn restart_waits_for_the_new_rollout() {
    support::init_tracing();
    let project = Project::new();
    let config = project.config();
    let platform = Arc::new(FakePlatform::new());
    platform.seed_namespace("shop");
    platform.seed_healthy_workload("web", 2);

    let result = rollout::restart(Arc::clone(&platform), &config).await.unwrap();

    assert!(result.passed);
    assert_eq!(result.attempts_used, 1);
    assert!(platform.calls().contains(&Call::Patch {
        kind: ResourceKind::Deployment,
        name: "web".to_string()
    }));
    let deployment = platform.object("Deployment", "web").unwrap();
    assert_eq!(
        deployment.pointer("/metadata/generation"),
        Some(&serde_json::json!(2))
    );
}

#[tokio::test(start_paused = true)]
async fn stalled_restart_times_out_and_stops_reporting() {
    support::init_tracing();
    let project = Project::new();
    let mut config = project.config();
    config.gates.report_interval = Duration::from_secs(10);
    let platform = Arc::new(FakePlatform::new());
    platform.seed_namespace("shop");
    platform.seed_healthy_workload("web", 2);
    platform.set_auto_ready(false);

    let err = rollout::restart(Arc::clone(&platform), &config)
        .await
        .unwrap_err();

    match err {
        Error::RolloutTimeout {
            ref workload,
            timeout,
            ref result,
        } => {
            assert_eq!(workload, "web");
            assert_eq!(timeout, Duration::from_secs(60));
            assert!(!result.passed);
        }
        ref other => panic!("expected a rollout timeout, got {}", other),
    }
    let bundle = err.diagnostics().unwrap();
    assert_eq!(bundle.description.as_deref(), Some("Name: web\nKind: Deployment"));
    assert!(!bundle.logs.is_empty());

    let lists = |calls: Vec<Call>| calls.into_iter().filter(|c| matches!(c, Call::List { .. })).count();
    let after_gate = lists(platform.calls());
    assert!(after_gate > 0);
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(lists(platform.calls()), after_gate);
}

#[tokio::test(start_paused = true)]
async fn restarting_a_missing_workload_fails_without_waiting() {
    let project = Project::new();
    let config = project.config();
    let platform = Arc::new(FakePlatform::new());
    platform.seed_namespace("shop");

    let started = tokio::time::Instant::now();
    let err = rollout::restart(Arc::clone(&platform), &config)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::PlatformRetry(ref e) if matches!(e.inner(), PlatformError::NotFound { .. })
    ));
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(
        !platform
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Get { .. }))
    );
}
