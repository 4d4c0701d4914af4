use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{response::Json, routing::get, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, level_filters::LevelFilter};

use daemon::api::{self, AppState};
use daemon::autosave::AutosaveBuffer;
use daemon::config::Config;
use daemon::llm::GeminiClient;
use daemon::store::SqliteStore;
use daemon::workflow::ScriptingWorkflow;

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .init();

    let config = Config::load(None)?;
    let knowledge_base = config.load_knowledge_base()?;

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(SqliteStore::new(&config.database_path)?);
    info!("document store initialized at {:?}", config.database_path);

    let client = Arc::new(GeminiClient::new(&config.generative));
    let workflow = Arc::new(ScriptingWorkflow::new(
        store.clone(),
        client,
        knowledge_base,
    ));
    let autosave = Arc::new(AutosaveBuffer::new(
        store.clone(),
        Duration::from_millis(config.autosave_quiet_ms),
    ));

    let flusher = autosave.clone();
    let _flusher_handle = tokio::spawn(async move {
        flusher.run().await;
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = AppState {
        store,
        workflow,
        autosave,
    };
    let app = Router::new()
        .route("/health", get(health))
        .nest("/api", api::router(state))
        .layer(cors);

    let addr: SocketAddr = config.bind_addr.parse()?;
    info!("starting scriptdeck daemon on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
