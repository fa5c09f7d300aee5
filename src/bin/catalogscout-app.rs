use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use catalogscout::app::config::AppConfig;
use catalogscout::app::queue::WorkflowGate;
use catalogscout::app::runner::{WorkflowKind, WorkflowRunner};
use catalogscout::formats::ArticleRecord;
use catalogscout::pipeline::WorkflowState;
use catalogscout::portal::HttpPortal;
use catalogscout::progress::{ColorHint, StatusSlot};
use catalogscout::store::{KeyValueStore, LocalFsStore, STATUS_KEY, get_json, load_records};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Directory holding the `records` and `data` slots.
    #[arg(long, default_value = "catalogscout-store")]
    data_dir: PathBuf,
}

#[derive(Clone)]
struct AppState {
    store: Arc<dyn KeyValueStore>,
    gate: WorkflowGate,
    runner: Arc<WorkflowRunner>,
}

#[derive(Debug, Deserialize)]
struct StartQuery {
    url: Option<String>,
}

#[derive(Debug, Serialize)]
struct StartResponse {
    workflow: &'static str,
    url: String,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    catalogscout::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting catalogscout-app");

    let config = AppConfig::from_env()?;
    let layout = catalogscout::layout::load(config.layout_path.as_deref())?;
    let store: Arc<dyn KeyValueStore> = Arc::new(LocalFsStore::new(&args.data_dir));
    let cancel = CancellationToken::new();
    let runner = WorkflowRunner::new(
        Arc::new(HttpPortal::new()?),
        Arc::clone(&store),
        layout,
        config,
        cancel.clone(),
    )?;

    let state = AppState {
        store,
        gate: WorkflowGate::new(),
        runner: Arc::new(runner),
    };

    let app = Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/status", get(get_status))
        .route("/records", get(get_records))
        .route("/workflows/catalog", post(start_catalog))
        .route("/workflows/report", post(start_report))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(?err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down; cancelling running workflow");
    cancel.cancel();
}

async fn get_status(State(state): State<AppState>) -> Result<Json<StatusSlot>, StatusCode> {
    let slot: Option<StatusSlot> = get_json(state.store.as_ref(), STATUS_KEY)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(slot.unwrap_or(StatusSlot {
        kind: WorkflowState::Idle,
        text: String::new(),
        color: ColorHint::Info,
        value: 0.0,
        data: None,
    })))
}

async fn get_records(
    State(state): State<AppState>,
) -> Result<Json<Vec<ArticleRecord>>, StatusCode> {
    let records = load_records(state.store.as_ref())
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(records))
}

async fn start_catalog(
    State(state): State<AppState>,
    Query(q): Query<StartQuery>,
) -> Result<(StatusCode, Json<StartResponse>), (StatusCode, String)> {
    start(state, WorkflowKind::Catalog, q.url)
}

async fn start_report(
    State(state): State<AppState>,
    Query(q): Query<StartQuery>,
) -> Result<(StatusCode, Json<StartResponse>), (StatusCode, String)> {
    start(state, WorkflowKind::Report, q.url)
}

fn start(
    state: AppState,
    kind: WorkflowKind,
    requested: Option<String>,
) -> Result<(StatusCode, Json<StartResponse>), (StatusCode, String)> {
    let Some(url) = state.runner.target_url(kind, requested) else {
        return Err((StatusCode::BAD_REQUEST, "url is required".to_string()));
    };
    let Some(permit) = state.gate.try_enter() else {
        return Err((
            StatusCode::CONFLICT,
            "a workflow is already running".to_string(),
        ));
    };
    let orchestrator = state
        .runner
        .orchestrator(kind)
        .map_err(|err| (StatusCode::BAD_REQUEST, format!("{err:#}")))?;

    tracing::info!(?kind, url = %url, "workflow started");
    tokio::spawn(WorkflowRunner::run(orchestrator, kind, url.clone(), permit));

    let workflow = match kind {
        WorkflowKind::Catalog => "catalog",
        WorkflowKind::Report => "report",
    };
    Ok((StatusCode::ACCEPTED, Json(StartResponse { workflow, url })))
}
