use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    backend::ScanBackend,
    reconcile::SessionState,
    request::{self, HostScanForm},
    session::ScanSession,
    types::AliveEvent,
};

#[derive(Clone)]
pub struct AppState {
    backend: Arc<dyn ScanBackend>,
    inner: Arc<RwLock<ServerInner>>, // shared handle to the current session
}

#[derive(Default)]
struct ServerInner {
    session: Option<Arc<RwLock<SessionState>>>,
    cancel: Option<CancellationToken>,
}

/// Snapshot of the current session for pollers.
#[derive(Debug, Clone, Serialize, Default)]
pub struct StatusBody {
    pub phase: String,
    pub done: u32,
    pub total: u32,
    pub alive: usize,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NeighborScanBody {
    #[serde(default)]
    pub interface: Option<String>,
}

/// Serve the scan API and the static UI on `bind` until the process exits.
pub async fn spawn_server(bind: &str, backend: Arc<dyn ScanBackend>) -> Result<()> {
    let state = AppState {
        backend,
        inner: Arc::new(RwLock::new(ServerInner::default())),
    };

    let api = Router::new()
        .route("/status", get(get_status))
        .route("/alive", get(get_alive))
        .route("/report", get(get_report))
        .route("/scan", post(post_scan))
        .route("/cancel", post(post_cancel))
        .route("/neighbors", post(post_neighbors))
        .with_state(state.clone());

    let static_svc = ServeDir::new("ui").append_index_html_on_directories(true);

    let app = Router::new()
        .nest("/api", api)
        .fallback_service(static_svc)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    info!("serving UI on http://{bind}");
    axum::serve(tokio::net::TcpListener::bind(bind).await?, app).await?;
    Ok(())
}

async fn snapshot(app: &AppState) -> StatusBody {
    let inner = app.inner.read().await;
    match inner.session.as_ref() {
        Some(session) => {
            let st = session.read().await;
            StatusBody {
                phase: st.phase.as_str().to_string(),
                done: st.progress.done,
                total: st.progress.total,
                alive: st.rows.len(),
                error: st.error.clone(),
            }
        }
        None => StatusBody {
            phase: "idle".to_string(),
            ..StatusBody::default()
        },
    }
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(snapshot(&app).await))
}

/// The streamed alive rows as currently reconciled. Best-effort view; the
/// report endpoint is the authoritative one.
async fn get_alive(State(app): State<AppState>) -> impl IntoResponse {
    let inner = app.inner.read().await;
    let rows: Vec<AliveEvent> = match inner.session.as_ref() {
        Some(session) => session.read().await.rows.clone(),
        None => Vec::new(),
    };
    (StatusCode::OK, Json(rows))
}

async fn get_report(State(app): State<AppState>) -> impl IntoResponse {
    let inner = app.inner.read().await;
    let report = match inner.session.as_ref() {
        Some(session) => session.read().await.report.clone(),
        None => None,
    };
    match report {
        Some(report) => (StatusCode::OK, Json(report)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn post_scan(
    State(app): State<AppState>,
    Json(form): Json<HostScanForm>,
) -> impl IntoResponse {
    // Reject invalid forms before touching the session or the backend.
    if let Err(e) = request::build(&form) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }

    let session = ScanSession::new(app.backend.clone());
    let state_handle = session.state();
    let cancel = session.cancel_token();

    {
        let mut inner = app.inner.write().await;
        // Cancel any existing scan before replacing it.
        if let Some(previous) = inner.cancel.take() {
            previous.cancel();
        }
        inner.session = Some(state_handle);
        inner.cancel = Some(cancel);
    }

    tokio::spawn(async move {
        if let Err(e) = session.run_host_scan(&form).await {
            warn!("host scan ended with error: {e}");
        }
    });

    (StatusCode::ACCEPTED, Json(snapshot(&app).await)).into_response()
}

async fn post_cancel(State(app): State<AppState>) -> impl IntoResponse {
    let inner = app.inner.read().await;
    match inner.cancel.as_ref() {
        Some(cancel) => {
            cancel.cancel();
            StatusCode::OK
        }
        None => StatusCode::NO_CONTENT,
    }
}

/// Run a neighbor scan to completion and return its report directly; the
/// session's event channel only carries lifecycle for this scan type.
async fn post_neighbors(
    State(app): State<AppState>,
    Json(body): Json<NeighborScanBody>,
) -> impl IntoResponse {
    let session = ScanSession::new(app.backend.clone());
    {
        let mut inner = app.inner.write().await;
        if let Some(previous) = inner.cancel.take() {
            previous.cancel();
        }
        inner.session = Some(session.state());
        inner.cancel = Some(session.cancel_token());
    }

    match session.run_neighbor_scan(body.interface).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    }
}
