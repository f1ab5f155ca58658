pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

use application::bootstrap::{bootstrap_workspace, BootstrapResult};
use application::calendar_source::GoogleCalendarSource;
use application::engine::Engine;
use application::ports::AuthProvider;
use application::token_auth::TokenAuthProvider;
use infrastructure::activity_log::ActivityLog;
use infrastructure::credential_store::InMemoryCredentialStore;
use infrastructure::error::InfraError;
use infrastructure::google_calendar_client::ReqwestGoogleCalendarClient;
use presentation::console::{run_command_loop, ConsoleDisplay, ConsoleNotifier, COMMAND_HELP};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub fn init_logging() -> Result<(), InfraError> {
    let directive = "daycal=info"
        .parse()
        .map_err(|error| InfraError::InvalidConfig(format!("invalid log directive: {error}")))?;
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .try_init();
    Ok(())
}

/// Entry point of the `daycal` binary. The optional first argument is the
/// workspace root holding `config/` and `logs/`.
pub fn run() -> Result<(), InfraError> {
    let workspace_root = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir()?,
    };
    let bootstrap = bootstrap_workspace(&workspace_root)?;
    init_logging()?;
    info!(root = %bootstrap.workspace_root.display(), "workspace ready");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run_widget(bootstrap));
    runtime.shutdown_background();
    result
}

async fn run_widget(bootstrap: BootstrapResult) -> Result<(), InfraError> {
    let config = bootstrap.config;
    let fallback_zone = config.fallback_zone()?;

    let credential_store = Arc::new(InMemoryCredentialStore::default());
    let auth = Arc::new(TokenAuthProvider::new(
        credential_store,
        config.access_token_env.clone(),
    ));
    if let Err(error) = auth.login().await {
        info!(%error, "starting signed out");
    }

    let client = Arc::new(ReqwestGoogleCalendarClient::with_timeout(Duration::from_secs(
        config.request_timeout_seconds,
    ))?);
    let source = Arc::new(GoogleCalendarSource::new(
        client,
        auth.clone(),
        config.calendar_id.clone(),
    ));

    let (engine, handle) = Engine::new(
        source,
        auth,
        Arc::new(ConsoleDisplay::default()),
        Arc::new(ConsoleNotifier),
    );
    let activity_log = Arc::new(ActivityLog::new(&bootstrap.logs_dir));
    info!(path = %activity_log.path().display(), "activity log");
    let engine = engine
        .with_fallback_zone(fallback_zone)
        .with_activity_log(activity_log);
    let engine_task = tokio::spawn(engine.run());

    println!("{COMMAND_HELP}");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    if let Err(error) = run_command_loop(stdin, &handle).await {
        warn!(%error, "command input stopped");
        let _ = handle.shutdown();
    }

    engine_task.await.map_err(|error| {
        warn!(%error, "engine task ended abnormally");
        InfraError::EngineStopped
    })
}
