use crate::{api, cli::actions::Action, config::AppConfig, state::RuntimeState};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Execute the server action.
///
/// # Errors
/// Returns an error if the configuration cannot be loaded or the server fails
/// to start.
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server { config, debug: _ } => {
            let config = AppConfig::load(&config)
                .with_context(|| format!("Failed to load configuration: {}", config.display()))?;

            let state = Arc::new(RuntimeState::new(config)?);

            info!(host_identity = %state.host_identity, "runtime state initialized");

            RuntimeState::spawn_session_expirer(Arc::clone(&state));

            api::serve(state).await?;
        }
    }

    Ok(())
}
