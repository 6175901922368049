use std::sync::Arc;

use compass_api::config::ApiConfig;
use compass_api::routes;
use compass_api::state::AppState;
use compass_store::Database;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = ApiConfig::from_env();
    let db = Arc::new(Database::connect(&config.store).await);

    let state = AppState::new(Arc::clone(&db));
    state.ensure_collections().await;

    let app = routes::router().with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("failed to bind {}: {e}", config.addr);
            std::process::exit(1);
        });

    let mode = db.mode().map_or_else(|| "unavailable".to_string(), |m| m.to_string());
    tracing::info!("compass-api listening on {} (database: {mode})", config.addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
    }

    db.close().await;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
