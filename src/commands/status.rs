// ABOUTME: Status command implementation.
// ABOUTME: Probes the cluster and prints the planned decision without applying anything.

use serde::Serialize;
use stagecraft::config::Config;
use stagecraft::error::Result;
use stagecraft::output::Output;
use stagecraft::plan::{ActionDecision, DeploymentState};
use stagecraft::platform::Platform;
use stagecraft::rollout::observe;

#[derive(Serialize)]
struct StatusReport<'a> {
    namespace: &'a str,
    workload: &'a str,
    state: DeploymentState,
    decision: ActionDecision,
    reason: String,
}

pub async fn status<P: Platform + ?Sized>(config: &Config, platform: &P, output: &Output) -> Result<()> {
    let (state, decision) = observe(platform, config).await?;
    let report = StatusReport {
        namespace: config.namespace.as_str(),
        workload: config.workload.as_str(),
        state,
        decision,
        reason: decision.reason(&state),
    };
    output.report(&report, render);
    Ok(())
}

fn render(report: &StatusReport<'_>) -> String {
    let state = &report.state;
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    [
        format!("Namespace:  {} (exists: {})", report.namespace, yes_no(state.namespace_exists)),
        format!("Workload:   {} (exists: {})", report.workload, yes_no(state.workload_exists)),
        format!("Replicas:   {}/{} ready", state.ready_replicas, state.desired_replicas),
        format!(
            "Pods:       {} running, {} failed, {} stuck",
            state.running_pod_count, state.failed_pod_count, state.stuck_pod_count
        ),
        format!("Healthy:    {}", yes_no(state.app_healthy)),
        format!("Decision:   {} ({})", report.decision, report.reason),
    ]
    .join("\n")
}
