mod chat;
mod client;
mod connection;
mod core;
mod daemon_client;
mod editor;
mod mode;
mod pending;
mod roster;
mod runtime;
mod view;

use std::sync::Arc;

use chorus_core::paths::ChorusPaths;

pub use self::core::Settings;

/// Runs the interactive supervisor until the operator quits.
///
/// `projects` limits the event subscription and roster; empty means all.
pub async fn run(
    paths: &ChorusPaths,
    projects: Vec<String>,
    settings: Settings,
) -> anyhow::Result<()> {
    let client: Arc<dyn client::TuiClient> =
        Arc::new(daemon_client::DaemonTuiClient::new(paths.clone()));
    runtime::run(client, projects, settings).await
}
