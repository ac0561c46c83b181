//! PUG backend entrypoint wiring REST, WebSocket, SSE, the match store and the game server channel.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, bail};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pug_back::{
    config::AppConfig,
    dao::match_store::{MatchStore, memory::MemoryMatchStore},
    routes,
    services::{auth_service::TrustedPayloadProvider, rcon::SourceRconConnector, storage_supervisor},
    state::{AppState, SharedState},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreBackend {
    Memory,
    #[cfg(feature = "mongo-store")]
    Mongo,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let backend = store_backend()?;
    let connector = Arc::new(SourceRconConnector::new(&config.handoff));
    let app_state = AppState::new(config, Arc::new(TrustedPayloadProvider), connector);

    spawn_storage_supervisor(app_state.clone(), backend);
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, ?backend, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// `STORE_BACKEND` selects the match store; MongoDB is the default when compiled in.
fn store_backend() -> anyhow::Result<StoreBackend> {
    let requested = env::var("STORE_BACKEND").unwrap_or_default();
    match requested.trim() {
        "memory" => Ok(StoreBackend::Memory),
        #[cfg(feature = "mongo-store")]
        "" | "mongo" => Ok(StoreBackend::Mongo),
        #[cfg(not(feature = "mongo-store"))]
        "" => Ok(StoreBackend::Memory),
        other => bail!("unsupported STORE_BACKEND `{other}`"),
    }
}

fn spawn_storage_supervisor(state: SharedState, backend: StoreBackend) {
    match backend {
        StoreBackend::Memory => {
            let store = MemoryMatchStore::new();
            tokio::spawn(storage_supervisor::run(state, move || {
                let store = store.clone();
                async move { Ok(Arc::new(store) as Arc<dyn MatchStore>) }
            }));
        }
        #[cfg(feature = "mongo-store")]
        StoreBackend::Mongo => {
            let uri = env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
            let db_name = env::var("MONGO_DB").ok();
            tokio::spawn(storage_supervisor::run(state, move || {
                connect_mongo(uri.clone(), db_name.clone())
            }));
        }
    }
}

#[cfg(feature = "mongo-store")]
async fn connect_mongo(
    uri: String,
    db_name: Option<String>,
) -> Result<Arc<dyn MatchStore>, pug_back::dao::storage::StorageError> {
    use pug_back::dao::match_store::mongodb::{MongoConfig, MongoMatchStore};

    let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
    let store = MongoMatchStore::connect(config).await?;
    Ok(Arc::new(store) as Arc<dyn MatchStore>)
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
