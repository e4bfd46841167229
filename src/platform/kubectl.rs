// ABOUTME: Platform implementation that drives the cluster through the kubectl binary.
// ABOUTME: Runs each call as a child process with a timeout and classifies its stderr.

use super::{Document, Platform, PlatformError, ResourceKind};
use crate::types::{PodName, ResourceName};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// stderr fragments that indicate an outage rather than a bad request.
const TRANSIENT_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "i/o timeout",
    "tls handshake timeout",
    "unable to connect to the server",
    "the server is currently unable to handle the request",
    "serviceunavailable",
    "too many requests",
    "etcdserver",
    "unexpected eof",
    "no route to host",
];

/// How to invoke kubectl.
#[derive(Debug, Clone)]
pub struct KubectlConfig {
    pub binary: String,
    pub context: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    pub namespace: ResourceName,
    pub command_timeout: Duration,
}

impl KubectlConfig {
    pub fn new(namespace: ResourceName) -> Self {
        Self {
            binary: "kubectl".to_string(),
            context: None,
            kubeconfig: None,
            namespace,
            command_timeout: Duration::from_secs(120),
        }
    }
}

/// The production [`Platform`].
#[derive(Debug, Clone)]
pub struct KubectlPlatform {
    config: KubectlConfig,
}

impl KubectlPlatform {
    pub fn new(config: KubectlConfig) -> Self {
        Self { config }
    }

    pub fn namespace(&self) -> &ResourceName {
        &self.config.namespace
    }

    fn args(&self, namespaced: bool, rest: &[&str]) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(ref kubeconfig) = self.config.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(kubeconfig.display().to_string());
        }
        if let Some(ref context) = self.config.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        if namespaced {
            args.push("--namespace".to_string());
            args.push(self.config.namespace.to_string());
        }
        args.extend(rest.iter().map(|s| s.to_string()));
        args
    }

    /// Run kubectl, returning stdout on success and (stdout, stderr) on failure.
    async fn run(
        &self,
        args: Vec<String>,
        stdin: Option<&str>,
    ) -> Result<Result<String, (String, String)>, PlatformError> {
        tracing::debug!("{} {}", self.config.binary, args.join(" "));

        let mut child = Command::new(&self.config.binary)
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlatformError::Launch(format!("{}: {}", self.config.binary, e)))?;

        if let Some(input) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|e| PlatformError::Launch(format!("failed to write stdin: {}", e)))?;
            // Closing stdin lets kubectl see end of input.
            drop(pipe);
        }

        let output = tokio::time::timeout(self.config.command_timeout, child.wait_with_output())
            .await
            .map_err(|_| PlatformError::Timeout(self.config.command_timeout))?
            .map_err(|e| PlatformError::Launch(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if output.status.success() {
            Ok(Ok(stdout))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Ok(Err((stdout, stderr)))
        }
    }

    /// Run a command about one named object and classify any failure.
    async fn run_for(
        &self,
        args: Vec<String>,
        stdin: Option<&str>,
        target: Option<(ResourceKind, &str)>,
    ) -> Result<String, PlatformError> {
        self.run(args, stdin)
            .await?
            .map_err(|(_, stderr)| classify(&stderr, target))
    }

    fn parse_json(stdout: &str) -> Result<Value, PlatformError> {
        serde_json::from_str(stdout).map_err(|e| PlatformError::Parse(e.to_string()))
    }
}

/// Map kubectl stderr onto the error taxonomy.
fn classify(stderr: &str, target: Option<(ResourceKind, &str)>) -> PlatformError {
    let lower = stderr.to_lowercase();

    if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        return PlatformError::Unavailable(stderr.to_string());
    }

    if lower.contains("alreadyexists") || lower.contains("already exists") {
        return PlatformError::AlreadyExists(stderr.to_string());
    }

    if let Some((kind, name)) = target
        && (lower.contains("(notfound)") || lower.contains("not found"))
    {
        return PlatformError::NotFound {
            kind,
            name: name.to_string(),
        };
    }

    PlatformError::Rejected(stderr.to_string())
}

#[async_trait]
impl Platform for KubectlPlatform {
    async fn apply(&self, document: &Document) -> Result<(), PlatformError> {
        let args = self.args(true, &["apply", "-f", "-"]);
        self.run_for(args, Some(&document.body), None).await?;
        Ok(())
    }

    async fn get(&self, kind: ResourceKind, name: &str) -> Result<Value, PlatformError> {
        let args = self.args(
            !kind.is_cluster_scoped(),
            &["get", kind.as_str(), name, "-o", "json"],
        );
        let stdout = self.run_for(args, None, Some((kind, name))).await?;
        Self::parse_json(&stdout)
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        name: &str,
        force: bool,
    ) -> Result<(), PlatformError> {
        let mut rest = vec!["delete", kind.as_str(), name, "--ignore-not-found", "--wait=false"];
        if force {
            rest.extend(["--grace-period=0", "--force"]);
        }
        let args = self.args(!kind.is_cluster_scoped(), &rest);
        match self.run_for(args, None, Some((kind, name))).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other.map(|_| ()),
        }
    }

    async fn exec_in_pod(&self, pod: &PodName, command: &[String]) -> Result<String, PlatformError> {
        let mut rest = vec!["exec", pod.as_str(), "--"];
        rest.extend(command.iter().map(String::as_str));
        let args = self.args(true, &rest);
        match self.run(args, None).await? {
            Ok(stdout) => Ok(stdout),
            Err((stdout, stderr)) => {
                let lower = stderr.to_lowercase();
                if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
                    Err(PlatformError::Unavailable(stderr))
                } else if stderr.is_empty() {
                    Err(PlatformError::Exec(stdout.trim().to_string()))
                } else {
                    Err(PlatformError::Exec(stderr))
                }
            }
        }
    }

    async fn list(
        &self,
        kind: ResourceKind,
        selector: Option<&str>,
    ) -> Result<Vec<Value>, PlatformError> {
        let mut rest = vec!["get", kind.as_str(), "-o", "json"];
        if let Some(selector) = selector {
            rest.extend(["-l", selector]);
        }
        let args = self.args(!kind.is_cluster_scoped(), &rest);
        let stdout = self.run_for(args, None, None).await?;
        let list = Self::parse_json(&stdout)?;
        Ok(list
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn patch(
        &self,
        kind: ResourceKind,
        name: &str,
        patch: &Value,
    ) -> Result<(), PlatformError> {
        let body = patch.to_string();
        let args = self.args(
            !kind.is_cluster_scoped(),
            &["patch", kind.as_str(), name, "--type", "merge", "-p", body.as_str()],
        );
        self.run_for(args, None, Some((kind, name))).await?;
        Ok(())
    }

    async fn logs(&self, pod: &PodName, tail: u32) -> Result<String, PlatformError> {
        let tail = format!("--tail={}", tail);
        let args = self.args(true, &["logs", pod.as_str(), tail.as_str(), "--all-containers=true"]);
        self.run_for(args, None, Some((ResourceKind::Pod, pod.as_str())))
            .await
    }

    async fn events(&self, limit: usize) -> Result<Vec<String>, PlatformError> {
        let args = self.args(
            true,
            &["get", "events", "--sort-by=.lastTimestamp", "-o", "json"],
        );
        let stdout = self.run_for(args, None, None).await?;
        let list = Self::parse_json(&stdout)?;
        let lines: Vec<String> = list
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(format_event).collect())
            .unwrap_or_default();
        let skip = lines.len().saturating_sub(limit);
        Ok(lines.into_iter().skip(skip).collect())
    }

    async fn describe(&self, kind: ResourceKind, name: &str) -> Result<String, PlatformError> {
        let args = self.args(!kind.is_cluster_scoped(), &["describe", kind.as_str(), name]);
        self.run_for(args, None, Some((kind, name))).await
    }

    async fn server_version(&self) -> Result<String, PlatformError> {
        let args = self.args(false, &["version", "-o", "json"]);
        let stdout = self.run_for(args, None, None).await?;
        let version = Self::parse_json(&stdout)?;
        version
            .pointer("/serverVersion/gitVersion")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Unavailable("no server version reported".to_string()))
    }
}

fn format_event(event: &Value) -> String {
    let field = |p: &str| event.pointer(p).and_then(Value::as_str).unwrap_or("");
    format!(
        "{} {} {}/{}: {}",
        field("/type"),
        field("/reason"),
        field("/involvedObject/kind"),
        field("/involvedObject/name"),
        field("/message")
    )
}
