use std::sync::Arc;

use anyhow::Context;
use cafe_session::logging::init_logging;
use cafe_session::{HttpAuthApi, SessionConfig, SessionEventBus, SessionManager};
use cafe_transport::TransportClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = SessionConfig::from_env_or_default();
    let (_logging, _guard) = init_logging(&config)?;

    let events = SessionEventBus::new();
    let transport = TransportClient::new(&config.transport_config(), events.clone())
        .with_context(|| format!("invalid API base URL: {}", config.api_base_url))?;
    let api = Arc::new(HttpAuthApi::new(Arc::new(transport)));

    let manager = SessionManager::builder(api, config.clone())
        .events(events)
        .build();

    tracing::info!(
        base_url = %config.api_base_url,
        refresh_interval_secs = config.refresh_interval().as_secs(),
        "cafe-session starting"
    );

    manager.init().await;

    if !manager.is_authenticated()
        && let Ok(phone_number) = std::env::var("CAFE_PHONE_NUMBER")
        && !phone_number.trim().is_empty()
    {
        if manager.login(phone_number.trim()).await {
            tracing::info!("Logged in from CAFE_PHONE_NUMBER");
        } else {
            let reason = manager.state().last_error.unwrap_or_default();
            tracing::warn!(reason = %reason, "Login from CAFE_PHONE_NUMBER failed");
        }
    }

    if let Some(session) = manager.session() {
        tracing::info!(user_id = session.id, name = %session.display_name(), "Session active");
    } else {
        tracing::info!("No active session");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    tracing::info!("Shutting down");
    manager.teardown();

    Ok(())
}
