use std::sync::Arc;

use signoff_core::config::{AppConfig, ConfigError, LoadOptions};
use signoff_core::destinations::DestinationStore;
use signoff_core::lifecycle::LifecyclePolicy;
use signoff_core::store::RequestStore;
use signoff_slack::api::HttpChatApi;
use signoff_slack::directory::HttpDirectory;
use signoff_slack::events::{
    BlockActionHandler, EventDispatcher, SlashCommandHandler, ViewSubmissionHandler,
};
use signoff_slack::socket::{NoopSocketTransport, ReconnectPolicy, SocketModeRunner};
use signoff_slack::workflow::ApprovalWorkflow;
use thiserror::Error;
use tracing::{info, warn};

use crate::audit::TracingAuditSink;

pub struct Application {
    pub config: AppConfig,
    pub store: Arc<RequestStore>,
    pub destinations: Option<Arc<DestinationStore>>,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Wires the workflow behind an event dispatcher and a socket runner.
///
/// A destination store that fails to open is not fatal: the workflow runs
/// without audit summaries and the health endpoint reports degraded until
/// the file is fixed.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let destinations = match DestinationStore::open(&config.audit.destinations_path) {
        Ok(store) => {
            info!(
                event_name = "system.bootstrap.destinations_loaded",
                correlation_id = "bootstrap",
                path = %store.path().display(),
                configured_teams = store.len(),
                "logging destinations loaded"
            );
            Some(Arc::new(store))
        }
        Err(error) => {
            warn!(
                event_name = "system.bootstrap.destinations_unavailable",
                correlation_id = "bootstrap",
                error = %error,
                "continuing without audit summaries"
            );
            None
        }
    };

    let store = Arc::new(RequestStore::new());
    let policy = LifecyclePolicy { enforce_roster: config.workflow.enforce_roster };
    let api = Arc::new(HttpChatApi::new(config.slack.bot_token.clone()));
    let directory = Arc::new(HttpDirectory::new(config.slack.bot_token.clone()));
    let workflow = Arc::new(ApprovalWorkflow::new(
        store.clone(),
        policy,
        api,
        directory,
        destinations.clone(),
        Arc::new(TracingAuditSink),
    ));

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler::with_shared(workflow.clone()));
    dispatcher.register(BlockActionHandler::with_shared(workflow.clone()));
    dispatcher.register(ViewSubmissionHandler::with_shared(workflow));
    info!(
        event_name = "system.bootstrap.dispatcher_ready",
        correlation_id = "bootstrap",
        handlers = dispatcher.handler_count(),
        enforce_roster = policy.enforce_roster,
        "event dispatcher wired"
    );

    let slack_runner = SocketModeRunner::new(
        Arc::new(NoopSocketTransport),
        dispatcher,
        ReconnectPolicy::default(),
    );

    Ok(Application { config, store, destinations, slack_runner })
}
