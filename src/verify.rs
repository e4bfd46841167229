// ABOUTME: Post-install functional probes and the persisted deployment summary.
// ABOUTME: Probes go out directly over HTTP/1.1 or through curl inside a running pod.

use crate::artifact::{Artifact, ArtifactError};
use crate::config::Config;
use crate::credentials::CredentialSet;
use crate::plan::{ActionDecision, DeploymentState};
use crate::platform::{Platform, PlatformError, list_pods, parse_http_code, retrying};
use crate::probe::curl_status_command;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::Local;
use http_body_util::Empty;
use hyper::Uri;
use hyper_util::rt::TokioIo;
use nonempty::NonEmpty;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid probe URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connection to {0} failed: {1}")]
    Connect(String, String),

    #[error("HTTP exchange failed: {0}")]
    Http(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("no running pod to probe from")]
    NoPod,

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Issues one GET and reports the status code.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    async fn status(&self, url: &str) -> Result<u16, ProbeError>;
}

/// HTTP/1.1 straight from this process. Only `http://` URLs.
#[derive(Debug, Clone)]
pub struct DirectHttp {
    timeout: Duration,
}

impl DirectHttp {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn get(url: &str) -> Result<u16, ProbeError> {
        let invalid = |reason: &str| ProbeError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };
        let uri: Uri = url.parse().map_err(|_| invalid("not a URI"))?;
        if uri.scheme_str() != Some("http") {
            return Err(invalid("direct probes support http:// only"));
        }
        let host = uri.host().ok_or_else(|| invalid("missing host"))?.to_string();
        let port = uri.port_u16().unwrap_or(80);
        let path = uri
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/")
            .to_string();
        let authority = format!("{}:{}", host, port);

        let stream = TcpStream::connect(&authority)
            .await
            .map_err(|e| ProbeError::Connect(authority.clone(), e.to_string()))?;
        let io = TokioIo::new(stream);

        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ProbeError::Http(format!("handshake failed: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!("probe connection error: {}", e);
            }
        });

        let req = hyper::Request::builder()
            .method("GET")
            .uri(path)
            .header("Host", host)
            .header("User-Agent", concat!("stagecraft/", env!("CARGO_PKG_VERSION")))
            .body(Empty::<bytes::Bytes>::new())
            .map_err(|e| ProbeError::Http(format!("failed to build request: {}", e)))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ProbeError::Http(format!("request failed: {}", e)))?;
        Ok(resp.status().as_u16())
    }
}

#[async_trait]
impl HttpProbe for DirectHttp {
    async fn status(&self, url: &str) -> Result<u16, ProbeError> {
        tokio::time::timeout(self.timeout, Self::get(url))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))?
    }
}

/// curl run inside a running application pod; reaches in-cluster and TLS URLs.
pub struct PodHttp<P: Platform + ?Sized> {
    platform: Arc<P>,
    selector: String,
    retry: RetryPolicy,
}

impl<P: Platform + ?Sized> PodHttp<P> {
    pub fn new(platform: Arc<P>, selector: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            platform,
            selector: selector.into(),
            retry,
        }
    }
}

#[async_trait]
impl<P: Platform + ?Sized + 'static> HttpProbe for PodHttp<P> {
    async fn status(&self, url: &str) -> Result<u16, ProbeError> {
        let pods = retrying(&self.retry, |_| list_pods(&*self.platform, &self.selector))
            .await
            .map_err(|e| ProbeError::Platform(e.into_inner()))?;
        let pod = pods
            .iter()
            .find(|p| p.is_running())
            .ok_or(ProbeError::NoPod)?;

        let command = curl_status_command(url);
        let stdout = self
            .platform
            .exec_in_pod(&pod.name, &command)
            .await?;
        match parse_http_code(&stdout) {
            0 => Err(ProbeError::Http(format!("no HTTP status from {}", url))),
            code => Ok(code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub url: String,
    pub status: Option<u16>,
    pub attempts: u32,
    pub passed: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationOutcome {
    pub endpoint: String,
    pub probes: Vec<ProbeResult>,
}

impl VerificationOutcome {
    pub fn passed(&self) -> bool {
        self.probes.iter().all(|p| p.passed)
    }
}

/// Read-only functional checks against known application paths.
pub struct VerificationReporter<'a> {
    probe: &'a dyn HttpProbe,
    paths: &'a NonEmpty<String>,
    accepted: &'a [u16],
    attempts: u32,
    interval: Duration,
}

impl<'a> VerificationReporter<'a> {
    pub fn new(
        probe: &'a dyn HttpProbe,
        paths: &'a NonEmpty<String>,
        accepted: &'a [u16],
        attempts: u32,
        interval: Duration,
    ) -> Self {
        Self {
            probe,
            paths,
            accepted,
            attempts: attempts.max(1),
            interval,
        }
    }

    pub async fn verify(&self, endpoint: &str) -> bool {
        self.run(endpoint).await.passed()
    }

    /// Probe every path, each up to the configured number of attempts.
    pub async fn run(&self, endpoint: &str) -> VerificationOutcome {
        let base = endpoint.trim_end_matches('/');
        let mut probes = Vec::with_capacity(self.paths.len());
        for path in self.paths.iter() {
            let url = format!("{}{}", base, path);
            probes.push(self.probe_path(url).await);
        }
        VerificationOutcome {
            endpoint: base.to_string(),
            probes,
        }
    }

    async fn probe_path(&self, url: String) -> ProbeResult {
        let mut result = ProbeResult {
            url,
            status: None,
            attempts: 0,
            passed: false,
            error: None,
        };
        while result.attempts < self.attempts {
            if result.attempts > 0 {
                tokio::time::sleep(self.interval).await;
            }
            result.attempts += 1;
            match self.probe.status(&result.url).await {
                Ok(code) => {
                    result.status = Some(code);
                    result.error = None;
                    if self.accepted.contains(&code) {
                        result.passed = true;
                        tracing::info!(url = %result.url, code, "verification probe passed");
                        return result;
                    }
                    tracing::debug!(url = %result.url, code, "unexpected status");
                }
                Err(e) => {
                    tracing::debug!(url = %result.url, "probe failed: {}", e);
                    result.error = Some(e.to_string());
                }
            }
        }
        tracing::warn!(url = %result.url, attempts = result.attempts, "verification probe failed");
        result
    }
}

/// Facts recorded in the deployment summary.
pub struct Summary<'a> {
    pub config: &'a Config,
    pub state: &'a DeploymentState,
    pub decision: ActionDecision,
    pub credentials: &'a CredentialSet,
    pub outcome: Option<&'a VerificationOutcome>,
}

impl Summary<'_> {
    pub fn to_artifact(&self) -> Artifact {
        let config = self.config;
        let host = gethostname::gethostname().to_string_lossy().to_string();

        let mut artifact = Artifact::new();
        artifact
            .comment("Deployment summary written by stagecraft")
            .entry("timestamp", Local::now().to_rfc3339())
            .entry("host", host)
            .blank()
            .entry("cluster", config.cluster.as_deref().unwrap_or(""))
            .entry("namespace", &config.namespace)
            .entry("workload", &config.workload)
            .entry("decision", self.decision)
            .entry("reason", self.decision.reason(self.state))
            .blank()
            .entry("domain", config.domain.as_deref().unwrap_or(""))
            .entry("tls", config.tls.enabled)
            .entry(
                "certificate_arn",
                config.tls.certificate_arn.as_deref().unwrap_or(""),
            )
            .entry("features", config.enabled_features().join(","))
            .entry("access_url", config.access_url().unwrap_or_default());

        if !self.credentials.is_empty() {
            artifact.blank().comment("Credentials (values are in the credentials export)");
            for record in self.credentials.records() {
                artifact.entry(
                    format!("credential.{}", record.binding),
                    format!("secret/{} key {} ({})", record.secret, record.key, record.origin),
                );
            }
        }

        if let Some(outcome) = self.outcome {
            artifact
                .blank()
                .entry("verification", if outcome.passed() { "passed" } else { "failed" });
            for probe in &outcome.probes {
                let status = probe
                    .status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "none".to_string());
                artifact.entry(format!("probe.{}", probe.url), status);
            }
        }
        artifact
    }

    pub fn write(&self, path: &Path) -> Result<Option<PathBuf>, ArtifactError> {
        self.to_artifact().write(path, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Scripted {
        responses: Mutex<VecDeque<Result<u16, ProbeError>>>,
        seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<u16, ProbeError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpProbe for Scripted {
        async fn status(&self, url: &str) -> Result<u16, ProbeError> {
            self.seen.lock().unwrap().push(url.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(500))
        }
    }

    fn paths(items: &[&str]) -> NonEmpty<String> {
        NonEmpty::from_vec(items.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_accepted_status() {
        let probe = Scripted::new(vec![
            Err(ProbeError::Timeout(Duration::from_secs(10))),
            Ok(503),
            Ok(200),
        ]);
        let paths = paths(&["/health"]);
        let reporter =
            VerificationReporter::new(&probe, &paths, &[200, 301, 302], 3, Duration::from_secs(5));

        let outcome = reporter.run("http://app.example.com/").await;
        assert!(outcome.passed());
        assert_eq!(outcome.probes[0].attempts, 3);
        assert_eq!(outcome.probes[0].url, "http://app.example.com/health");
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_bounded_attempts() {
        let probe = Scripted::new(vec![Ok(500), Ok(500), Ok(500), Ok(200)]);
        let paths = paths(&["/"]);
        let reporter = VerificationReporter::new(&probe, &paths, &[200], 2, Duration::from_secs(1));

        assert!(!reporter.verify("http://app").await);
        assert_eq!(probe.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn every_path_must_pass() {
        let probe = Scripted::new(vec![Ok(200), Ok(404)]);
        let paths = paths(&["/", "/login"]);
        let reporter = VerificationReporter::new(&probe, &paths, &[200], 1, Duration::ZERO);

        let outcome = reporter.run("http://app").await;
        assert!(!outcome.passed());
        assert_eq!(outcome.probes[1].status, Some(404));
    }

    #[tokio::test]
    async fn direct_probe_rejects_https() {
        let err = DirectHttp::new(Duration::from_secs(1))
            .status("https://app.example.com/")
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn direct_probe_reads_status_line() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 302 Found\r\nLocation: /login\r\nContent-Length: 0\r\n\r\n")
                .await
                .unwrap();
        });

        let code = DirectHttp::new(Duration::from_secs(5))
            .status(&format!("http://{}/", addr))
            .await
            .unwrap();
        assert_eq!(code, 302);
    }

    #[test]
    fn summary_lists_toggles_and_credentials() {
        let mut config = Config::template().unwrap();
        config.domain = Some("shop.example.com".to_string());
        config.tls.enabled = true;
        config.features.insert("BACKUPS".to_string(), true);
        config.features.insert("METRICS".to_string(), false);
        let state = DeploymentState::absent();
        let credentials = CredentialSet::default();

        let summary = Summary {
            config: &config,
            state: &state,
            decision: ActionDecision::FreshInstall,
            credentials: &credentials,
            outcome: None,
        };
        let artifact = summary.to_artifact();
        assert_eq!(artifact.get("decision"), Some("fresh_install"));
        assert_eq!(artifact.get("features"), Some("BACKUPS"));
        assert_eq!(artifact.get("access_url"), Some("https://shop.example.com"));
        assert_eq!(artifact.get("reason"), Some("namespace does not exist"));
        assert!(artifact.get("host").is_some());
    }
}
