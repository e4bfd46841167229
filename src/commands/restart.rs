// ABOUTME: Restart command implementation.
// ABOUTME: Triggers a rolling restart of the workload and waits for the rollout to finish.

use stagecraft::config::Config;
use stagecraft::error::Result;
use stagecraft::output::Output;
use stagecraft::platform::Platform;
use stagecraft::rollout;
use std::sync::Arc;

pub async fn restart<P: Platform + ?Sized + 'static>(
    config: Config,
    platform: Arc<P>,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    output.progress(&format!(
        "Restarting {} in namespace {}",
        config.workload, config.namespace
    ));
    output.progress(&format!(
        "  → Waiting up to {:?} for the rollout...",
        config.gates.workload_timeout
    ));

    let result = rollout::restart(platform, &config).await?;
    output.progress(&format!(
        "  ✓ Rollout complete after {} check(s)",
        result.attempts_used
    ));
    output.success("Restart complete!");
    Ok(())
}
