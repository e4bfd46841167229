// ABOUTME: Test support utilities.
// ABOUTME: Provides the in-memory platform, a scratch project with templates, and tracing setup.

use stagecraft::config::Config;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tempfile::TempDir;

// Each test binary only uses some of these helpers, so allow dead_code.
#[allow(dead_code)]
pub mod fake_platform;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("stagecraft=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

const CONFIG: &str = r#"cluster: test-cluster
namespace: shop
workload: web
domain: shop.example.com

credentials:
  - secret: web-db
    key: db-password
    binding: DB_PASSWORD

retry:
  max_attempts: 3
  base_delay: 10ms
  max_delay: 50ms
  multiplier: 2.0

gates:
  storage_timeout: 30s
  workload_timeout: 60s
  ingress_timeout: 30s
  poll_interval: 1s
  report_interval: 0s

cleanup:
  settle_delay: 0s

verify:
  transport: pod
  paths: [/, /health]
  attempts: 2
  interval: 1s
"#;

const NAMESPACE: &str = r#"apiVersion: v1
kind: Namespace
metadata:
  name: ${NAMESPACE}
"#;

const CONFIG_MAP: &str = r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: ${WORKLOAD}-config
data:
  cluster: ${CLUSTER_NAME}
"#;

const CLAIM: &str = r#"apiVersion: v1
kind: PersistentVolumeClaim
metadata:
  name: ${WORKLOAD}-data
spec:
  accessModes: [ReadWriteMany]
  resources:
    requests:
      storage: 5Gi
"#;

const DEPLOYMENT: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: ${WORKLOAD}
spec:
  replicas: 2
  selector:
    matchLabels:
      app: ${WORKLOAD}
  template:
    metadata:
      labels:
        app: ${WORKLOAD}
    spec:
      containers:
        - name: app
          image: registry.example.com/web:1.4.2
          env:
            - name: DB_PASSWORD
              value: "${DB_PASSWORD}"
"#;

const SERVICE: &str = r#"apiVersion: v1
kind: Service
metadata:
  name: ${WORKLOAD}
spec:
  selector:
    app: ${WORKLOAD}
  ports:
    - port: 80
"#;

const INGRESS: &str = r#"apiVersion: networking.k8s.io/v1
kind: Ingress
metadata:
  name: ${WORKLOAD}
  annotations:
    kubernetes.io/ingress.class: alb
# @if TLS_ENABLED
    alb.ingress.kubernetes.io/certificate-arn: ${CERTIFICATE_ARN}
# @endif
spec:
  rules:
    - host: ${DOMAIN}
"#;

const NETWORK_POLICY: &str = r#"apiVersion: networking.k8s.io/v1
kind: NetworkPolicy
metadata:
  name: ${WORKLOAD}-default
spec:
  podSelector: {}
"#;

/// A throwaway project directory with a config file and one template per
/// populated stage. Stages without a directory stay empty.
#[allow(dead_code)]
pub struct Project {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stagecraft.yml"), CONFIG).unwrap();
        let project = Self { dir };
        project.template("namespace", "namespace.yaml", NAMESPACE);
        project.template("secrets", "config.yaml", CONFIG_MAP);
        project.template("storage", "claim.yaml", CLAIM);
        project.template("workload", "deployment.yaml", DEPLOYMENT);
        project.template("service", "service.yaml", SERVICE);
        project.template("ingress", "ingress.yaml", INGRESS);
        project.template("network-policy", "default.yaml", NETWORK_POLICY);
        project
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn template(&self, stage: &str, file: &str, body: &str) -> PathBuf {
        let stage_dir = self.path().join("templates").join(stage);
        std::fs::create_dir_all(&stage_dir).unwrap();
        let path = stage_dir.join(file);
        std::fs::write(&path, body).unwrap();
        path
    }

    pub fn remove_stage(&self, stage: &str) {
        std::fs::remove_dir_all(self.path().join("templates").join(stage)).unwrap();
    }

    pub fn config(&self) -> Config {
        Config::discover(self.path()).unwrap()
    }

    pub fn read(&self, file: &str) -> String {
        std::fs::read_to_string(self.path().join(file)).unwrap()
    }

    /// Files in the project root whose names start with `prefix`.
    pub fn files_starting_with(&self, prefix: &str) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with(prefix))
            .collect();
        names.sort();
        names
    }
}
