use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::Router;
use pairup::{auth, persist, ws, AppState};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,pairup=debug")),
        )
        .init();

    let addr = dotenv::var("PAIRUP_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    let data_dir = PathBuf::from(dotenv::var("PAIRUP_DATA_DIR").unwrap_or_else(|_| "./data".to_owned()));
    let save_secs = dotenv::var("PAIRUP_SAVE_SECS")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(30);

    let matcher = persist::load(&data_dir).unwrap();
    let app_state = AppState { matcher: Arc::new(Mutex::new(matcher)) };

    persist::start_save_cycle(app_state.clone(), data_dir, Duration::from_secs(save_secs));

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(12)));

    let app = Router::new()
        .merge(auth::router())
        .merge(ws::router())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
        .layer(session_layer);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    tracing::info!(%addr, "server started");
    axum::serve(listener, app).await.unwrap();
}
