mod auth;
mod clubs;
mod error;
mod settings;
mod sqlite;
mod users;

use error::AppResult;
use settings::Settings;
use sqlite::Database;

use anyhow::Result;
use tokio::{net::TcpListener, time::Instant};

use axum::{extract::FromRef, routing::get, serve, Router};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, FromRef)]
pub(crate) struct AppState {
    db: Database,
    sessions: auth::SessionSettings,
}

fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/clubs", clubs::router())
        .with_state(app_state)
}

async fn create_app(settings: &Settings) -> Result<Router> {
    let pool = sqlite::create_pool(&settings.sqlite).await?;

    let app_state = AppState {
        db: Database::new(pool),
        sessions: settings.sessions.clone(),
    };

    Ok(router(app_state))
}

#[tokio::main]
async fn main() -> AppResult<()> {
    dotenv::dotenv().ok();
    dotenv::from_path("./api/.env").ok();

    let start = Instant::now();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let settings = Settings::load()?;
    let app = create_app(&settings).await?;

    let listener = TcpListener::bind(settings.server.address()?).await?;
    info!("Listening on {}", listener.local_addr()?);

    // Create a shutdown signal handler
    let shutdown = async move {
        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = signal::ctrl_c() => {},
            _ = terminate => {},
        }
        let duration = start.elapsed();
        info!("Shutting down gracefully... in {:?}", duration);
    };

    // Start the server with graceful shutdown
    let server = serve(listener, app).with_graceful_shutdown(shutdown);

    if let Err(e) = server.await {
        tracing::error!("Server error: {}", e);
    }

    Ok(())
}
