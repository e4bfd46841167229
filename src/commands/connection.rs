// ABOUTME: Shared setup for commands that talk to the cluster.
// ABOUTME: Loads configuration with overrides and builds the kubectl platform.

use stagecraft::config::{Config, Overrides};
use stagecraft::error::Result;
use stagecraft::output::Output;
use stagecraft::platform::KubectlPlatform;
use std::env;
use std::path::Path;
use std::sync::Arc;

/// The configuration at `path`, or the one discovered in the working
/// directory, with command-line overrides applied.
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::discover(&env::current_dir()?)?,
    };
    config.with_overrides(overrides)
}

/// A platform bound to the configured namespace and context.
pub fn connect(config: &Config, output: &Output) -> Arc<KubectlPlatform> {
    let kubectl = config.kubectl_config();
    output.progress(&format!(
        "  → Using {} (context: {}, namespace: {})",
        kubectl.binary,
        kubectl.context.as_deref().unwrap_or("current"),
        kubectl.namespace
    ));
    Arc::new(KubectlPlatform::new(kubectl))
}
