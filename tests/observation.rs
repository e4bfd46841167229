// ABOUTME: State probing, pod cleanup, and credential resolution against the in-memory platform.
// ABOUTME: Exercises each building block on its own, outside a full rollout.

mod support;

use serde_json::json;
use stagecraft::cleanup::CleanupOperator;
use stagecraft::config::{CredentialSpec, ProbeConfig};
use stagecraft::credentials::{CredentialError, CredentialManager, CredentialOrigin};
use stagecraft::plan::{ActionDecision, DeploymentState, decide};
use stagecraft::platform::{PlatformError, ResourceKind};
use stagecraft::probe::StateProbe;
use stagecraft::retry::RetryPolicy;
use stagecraft::types::ResourceName;
use std::time::Duration;
use support::fake_platform::{Call, FakePlatform, deployment_object};

fn policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(50), 2.0)
}

fn name(value: &str) -> ResourceName {
    ResourceName::new(value).unwrap()
}

async fn probe_with(platform: &FakePlatform, settings: &ProbeConfig) -> Result<DeploymentState, String> {
    let retry = policy();
    StateProbe::new(platform, &retry, settings, "app=web")
        .probe(&name("shop"), &name("web"))
        .await
        .map_err(|e| e.to_string())
}

async fn probe(platform: &FakePlatform) -> Result<DeploymentState, String> {
    probe_with(platform, &ProbeConfig::default()).await
}

mod probing {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn missing_namespace_short_circuits() {
        let platform = FakePlatform::new();

        let state = probe(&platform).await.unwrap();

        assert_eq!(state, DeploymentState::absent());
        assert_eq!(
            platform.calls(),
            vec![Call::Get {
                kind: ResourceKind::Namespace,
                name: "shop".to_string()
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_workload_is_reported_not_raised() {
        let platform = FakePlatform::new();
        platform.seed_namespace("shop");

        let state = probe(&platform).await.unwrap();

        assert!(state.namespace_exists);
        assert!(!state.workload_exists);
        assert_eq!(decide(&state), ActionDecision::FreshInstall);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_workload_is_checked_from_inside_a_pod() {
        let platform = FakePlatform::new();
        platform.seed_namespace("shop");
        platform.seed_healthy_workload("web", 2);

        let state = probe(&platform).await.unwrap();

        assert!(state.app_healthy);
        assert_eq!(state.ready_replicas, 2);
        assert_eq!(state.running_pod_count, 2);
        assert_eq!(decide(&state), ActionDecision::SkipAlreadyHealthy);
        let execs = platform
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Exec { .. }))
            .count();
        assert_eq!(execs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unaccepted_status_means_unhealthy() {
        let platform = FakePlatform::new();
        platform.seed_namespace("shop");
        platform.seed_healthy_workload("web", 2);
        platform.set_exec_stdout("502");

        let state = probe(&platform).await.unwrap();

        assert!(!state.app_healthy);
        assert_eq!(decide(&state), ActionDecision::IncrementalUpdate);
    }

    #[tokio::test(start_paused = true)]
    async fn degraded_workload_is_not_probed_over_http() {
        let platform = FakePlatform::new();
        platform.seed_namespace("shop");
        platform.seed(deployment_object("web", 3, 1));
        platform.seed_pod("web-0", "web", "Running", None);
        platform.seed_pod("web-1", "web", "Pending", Some("ImagePullBackOff"));
        platform.seed_pod("web-2", "web", "Failed", None);

        let state = probe(&platform).await.unwrap();

        assert!(!state.app_healthy);
        assert_eq!(state.failed_pod_count, 1);
        assert_eq!(state.stuck_pod_count, 1);
        assert!(!platform.calls().iter().any(|c| matches!(c, Call::Exec { .. })));
        assert_eq!(decide(&state), ActionDecision::CleanupThenInstall);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_reasons_are_configurable() {
        let platform = FakePlatform::new();
        platform.seed_namespace("shop");
        platform.seed(deployment_object("web", 1, 0));
        platform.seed_pod("web-0", "web", "Pending", Some("ContainerCreating"));

        let defaults = probe(&platform).await.unwrap();
        assert_eq!(defaults.stuck_pod_count, 0);

        let settings = ProbeConfig {
            stuck_reasons: vec!["ContainerCreating".to_string()],
            ..ProbeConfig::default()
        };
        let custom = probe_with(&platform, &settings).await.unwrap();
        assert_eq!(custom.stuck_pod_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_replica_counts_read_as_zero() {
        let platform = FakePlatform::new();
        platform.seed_namespace("shop");
        platform.seed(json!({
            "kind": "Deployment",
            "metadata": {"name": "web"},
            "spec": {"replicas": "three"},
            "status": {"readyReplicas": ""}
        }));

        let state = probe(&platform).await.unwrap();

        assert!(state.workload_exists);
        assert_eq!(state.ready_replicas, 0);
        assert_eq!(state.desired_replicas, 0);
        assert!(!state.app_healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_outage_is_retried() {
        let platform = FakePlatform::new();
        platform.seed_namespace("shop");
        platform.fail_next(
            "get",
            vec![PlatformError::Unavailable("TLS handshake timeout".to_string())],
        );

        let state = probe(&platform).await.unwrap();
        assert!(state.namespace_exists);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_outage_fails_the_probe() {
        let platform = FakePlatform::new();
        platform.set_reachable(false);

        let err = probe(&platform).await.unwrap_err();
        assert!(err.contains("unable to connect"));
        assert_eq!(platform.calls().len(), 3);
    }
}

mod cleaning {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn removes_bad_pods_and_stale_replica_sets_only() {
        let platform = FakePlatform::new();
        platform.seed_pod("web-0", "web", "Running", None);
        platform.seed_pod("web-1", "web", "Running", Some("CrashLoopBackOff"));
        platform.seed_pod("web-2", "web", "Failed", None);
        platform.seed_pod("api-0", "api", "Failed", None);
        platform.seed(json!({
            "kind": "ReplicaSet",
            "metadata": {"name": "web-old", "labels": {"app": "web"}},
            "spec": {"replicas": 0},
            "status": {"replicas": 0}
        }));
        platform.seed(json!({
            "kind": "ReplicaSet",
            "metadata": {"name": "web-current", "labels": {"app": "web"}},
            "spec": {"replicas": 1},
            "status": {"replicas": 1}
        }));

        let retry = policy();
        let reasons: Vec<String> = stagecraft::config::DEFAULT_STUCK_REASONS
            .iter()
            .map(|r| r.to_string())
            .collect();
        let started = tokio::time::Instant::now();
        let report = CleanupOperator::new(
            &platform,
            &retry,
            "app=web",
            &reasons,
            Duration::from_secs(10),
        )
        .run()
        .await
        .unwrap();

        let pods: Vec<&str> = report.deleted_pods.iter().map(|p| p.as_str()).collect();
        assert_eq!(pods, vec!["web-1", "web-2"]);
        let sets: Vec<&str> = report
            .deleted_replica_sets
            .iter()
            .map(|r| r.as_str())
            .collect();
        assert_eq!(sets, vec!["web-old"]);
        assert!(report.is_complete());
        assert_eq!(started.elapsed(), Duration::from_secs(10));

        assert!(platform.contains("Pod", "web-0"));
        assert!(platform.contains("Pod", "api-0"));
        assert!(platform.contains("ReplicaSet", "web-current"));
        assert!(platform.calls().contains(&Call::Delete {
            kind: ResourceKind::ReplicaSet,
            name: "web-old".to_string(),
            force: false
        }));
    }
}

mod credentials {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn resolving_twice_reuses_the_first_value() {
        let platform = FakePlatform::new();
        let retry = policy();
        let manager = CredentialManager::new(&platform, &retry);
        let spec = CredentialSpec::new(name("web-db"), "db-password");

        let first = manager.resolve(&spec).await.unwrap();
        let second = manager.resolve(&spec).await.unwrap();

        assert_eq!(first.origin, CredentialOrigin::Generated);
        assert_eq!(first.value.len(), 32);
        assert_eq!(second.origin, CredentialOrigin::Reused);
        assert_eq!(second.value, first.value);
        assert_eq!(
            platform.secret_value("web-db", "db-password").as_deref(),
            Some(first.value.as_str())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_stored_value_is_regenerated() {
        let platform = FakePlatform::new();
        platform.seed(json!({
            "kind": "Secret",
            "metadata": {"name": "web-db"},
            "data": {"db-password": "", "other": "a2VlcA=="}
        }));
        let retry = policy();
        let manager = CredentialManager::new(&platform, &retry);

        let record = manager
            .resolve(&CredentialSpec::new(name("web-db"), "db-password"))
            .await
            .unwrap();

        assert_eq!(record.origin, CredentialOrigin::Generated);
        assert!(!record.value.is_empty());
        assert_eq!(platform.secret_value("web-db", "other").as_deref(), Some("keep"));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_of_one_secret_are_written_together() {
        let platform = FakePlatform::new();
        let retry = policy();
        let manager = CredentialManager::new(&platform, &retry);
        let specs = vec![
            CredentialSpec::new(name("web-db"), "db-password"),
            CredentialSpec::new(name("web-db"), "replica-password"),
            CredentialSpec::new(name("web-cache"), "token"),
        ];

        let set = manager.resolve_all(&specs).await.unwrap();

        assert_eq!(set.records().len(), 3);
        assert!(set.any_generated());
        assert_eq!(platform.applied("Secret"), vec!["web-cache", "web-db"]);
        assert!(platform.secret_value("web-db", "replica-password").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn reading_existing_values_never_writes() {
        let platform = FakePlatform::new();
        platform.seed(json!({
            "kind": "Secret",
            "metadata": {"name": "web-db"},
            "data": {"db-password": "c3RvcmVkLXZhbHVl"}
        }));
        let retry = policy();
        let manager = CredentialManager::new(&platform, &retry);

        let set = manager
            .read_existing(&[CredentialSpec::new(name("web-db"), "db-password")])
            .await
            .unwrap();
        assert_eq!(set.records()[0].value, "stored-value");
        assert_eq!(set.records()[0].origin, CredentialOrigin::Reused);

        let err = manager
            .read_existing(&[
                CredentialSpec::new(name("web-db"), "db-password"),
                CredentialSpec::new(name("web-db"), "replica-password"),
            ])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CredentialError::Missing { ref secret, ref key } if secret == "web-db" && key == "replica-password"
        ));

        let err = manager
            .read_existing(&[CredentialSpec::new(name("web-cache"), "token")])
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::Missing { .. }));
        assert!(platform.applied_kinds().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_secret_is_an_error() {
        let platform = FakePlatform::new();
        platform.fail_next(
            "get",
            vec![PlatformError::Rejected("forbidden: secrets is forbidden".to_string())],
        );
        let retry = policy();
        let manager = CredentialManager::new(&platform, &retry);

        let err = manager
            .resolve(&CredentialSpec::new(name("web-db"), "db-password"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("web-db"));
        assert!(platform.applied_kinds().is_empty());
    }
}
