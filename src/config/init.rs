// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates a commented stagecraft.yml template.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::ResourceName;

use super::CONFIG_FILENAME;

pub(super) const TEMPLATE_YAML: &str = r#"# Cluster and workload identity.
cluster: my-cluster
namespace: my-app
workload: my-app
# selector: app=my-app

templates_dir: templates

infra:
  # outputs: infra-outputs.json
  required: []

# Extra template bindings: literal, flag, or {env: VAR, default: value}.
bindings: {}

# Feature toggles, usable in templates as `# @if NAME` blocks.
features: {}

# domain: app.example.com
tls:
  enabled: false
  # certificate_arn: arn:aws:acm:region:account:certificate/id

# Credentials kept in platform secrets; generated once, then reused.
credentials: []
#  - secret: my-app-db
#    key: db-password
#    binding: DB_PASSWORD

retry:
  max_attempts: 5
  base_delay: 2s
  max_delay: 30s
  multiplier: 2.0

gates:
  storage_timeout: 5m
  workload_timeout: 10m
  ingress_timeout: 5m
  poll_interval: 5s
  report_interval: 30s

cleanup:
  settle_delay: 10s

probe:
  port: 80
  path: /health
  accepted_statuses: [200, 301, 302]

verify:
  transport: pod
  # paths: [/health]  # defaults to probe.path
  attempts: 3
"#;

pub fn init_config(
    dir: &Path,
    namespace: Option<&str>,
    workload: Option<&str>,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut yaml = TEMPLATE_YAML.to_string();

    if let Some(ns) = namespace {
        let ns = ResourceName::new(ns).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        yaml = yaml.replacen("namespace: my-app", &format!("namespace: {}", ns), 1);
    }

    if let Some(w) = workload {
        let w = ResourceName::new(w).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        yaml = yaml.replacen("workload: my-app", &format!("workload: {}", w), 1);
    }

    std::fs::write(&config_path, yaml)?;

    Ok(())
}
