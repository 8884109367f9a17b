//! Hosts the notification stream endpoints for local development.

mod routes;
mod settings;

use notify_stream::server::EndpointState;
use settings::Settings;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).compact().init();

    let settings = Settings::from_env()?;
    if settings.tokens.is_empty() {
        tracing::warn!("NOTIFY_TOKENS is empty, every stream request will be rejected");
    }

    let state = EndpointState::new(settings.verifier(), settings.server.clone())?;
    let listener = TcpListener::bind(settings.bind).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        heartbeat_secs = settings.server.heartbeat_interval.as_secs(),
        reconnect_after_secs = settings.server.reconnect_after.as_secs(),
        "Notification stream server listening"
    );

    // Open streams only end at their reconnect deadline, so shutdown does
    // not wait for them.
    let server = axum::serve(listener, routes::app(state)).into_future();
    tokio::select! {
        result = server => result?,
        _ = shutdown_signal() => tracing::info!("Shutdown signal received"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
}
