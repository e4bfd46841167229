// ABOUTME: Deploy command implementation.
// ABOUTME: Drives the rollout pipeline step by step and reports progress between steps.

use stagecraft::config::Config;
use stagecraft::diagnostics::Warning;
use stagecraft::error::{Error, Result};
use stagecraft::output::Output;
use stagecraft::platform::Platform;
use stagecraft::rollout::Rollout;
use stagecraft::stage::{ApplyReport, StageGraph, StageState, load_groups};
use std::sync::Arc;

/// Reconcile the cluster with the templates, then verify the application.
pub async fn deploy<P: Platform + ?Sized + 'static>(
    config: Config,
    platform: Arc<P>,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    output.progress(&format!(
        "Deploying {} to namespace {}",
        config.workload, config.namespace
    ));

    let graph = StageGraph::new(load_groups(&config)?)?;
    output.progress(&format!(
        "  → Stage order: {}",
        graph
            .order()
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" → ")
    ));

    let rollout = Rollout::new(platform, &config, &graph);

    output.progress("  → Running preflight checks...");
    let preflight = rollout.preflight().await?;
    output.progress(&format!(
        "  → Cluster reachable (server {}), {} infrastructure output(s)",
        preflight.server_version,
        preflight.infra.len()
    ));

    output.progress("  → Probing current state...");
    let (state, decision) = rollout.observe().await?;
    output.progress(&format!("  → Decision: {} ({})", decision, decision.reason(&state)));

    let bindings = rollout.bindings(&preflight)?;
    let mut report = match rollout.apply(decision, bindings).await {
        Ok(report) => report,
        Err((report, e)) => {
            print_stages(&output, &graph, &report);
            print_warnings(&output, report.diagnostics.warnings());
            return Err(e.into());
        }
    };
    print_stages(&output, &graph, &report);
    print_credentials(&output, &config, &report);

    output.progress(&format!(
        "  → Verifying {} ({:?} transport)...",
        config.verify_endpoint(),
        config.verify.transport
    ));
    let http = rollout.http_probe();
    let outcome = rollout.verify(&*http).await;
    for probe in &outcome.probes {
        let mark = if probe.passed { "✓" } else { "✗" };
        let status = probe
            .status
            .map(|s| s.to_string())
            .or_else(|| probe.error.clone())
            .unwrap_or_default();
        output.progress(&format!("  {} {} → {}", mark, probe.url, status));
    }

    if let Some(path) = rollout.write_summary(&state, decision, &mut report, &outcome) {
        output.progress(&format!("  → Summary written to {}", path.display()));
    }
    print_warnings(&output, report.diagnostics.warnings());

    if !outcome.passed() {
        return Err(Error::VerificationFailed(outcome.endpoint));
    }

    if let Some(url) = config.access_url() {
        output.progress(&format!("  → Application available at {}", url));
    }
    output.success("Deployment complete!");
    Ok(())
}

fn print_stages(output: &Output, graph: &StageGraph, report: &ApplyReport) {
    for (stage, state) in report.states_in(graph) {
        let mark = match state {
            StageState::Done => "✓",
            StageState::Failed => "✗",
            StageState::Skipped => "-",
            _ => "·",
        };
        output.progress(&format!("  {} {}: {}", mark, stage, state));
    }
    if let Some(ref cleanup) = report.cleanup {
        output.progress(&format!(
            "  → Cleanup removed {} pod(s) and {} replica set(s)",
            cleanup.deleted_pods.len(),
            cleanup.deleted_replica_sets.len()
        ));
    }
    if report.restarted {
        output.progress("  → Workload restarted to pick up new credentials");
    }
}

fn print_credentials(output: &Output, config: &Config, report: &ApplyReport) {
    if report.credentials.is_empty() {
        return;
    }
    for record in report.credentials.records() {
        output.progress(&format!(
            "  → Credential {} ({}/{}): {}",
            record.binding, record.secret, record.key, record.origin
        ));
    }
    output.progress(&format!(
        "  → Credentials exported to {}",
        config.artifacts.credentials_path().display()
    ));
}

fn print_warnings(output: &Output, warnings: &[Warning]) {
    for warning in warnings {
        output.warning(&warning.message);
    }
}
