//! Status HTTP endpoint.

use std::net::SocketAddr;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use super::StatusTracker;

/// Routes for `/status` and `/health`.
pub fn router(tracker: StatusTracker) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(tracker)
}

/// Start the status server on `addr`.
///
/// Returns the serving task and the bound address, which differs from
/// `addr` when port 0 was requested. The server stops once `cancel` fires.
pub async fn start_status_server_on(
    addr: SocketAddr,
    tracker: StatusTracker,
    cancel: CancellationToken,
) -> std::io::Result<(JoinHandle<()>, SocketAddr)> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let app = router(tracker);

    tracing::info!("status server listening on http://{}", local_addr);

    let handle = tokio::spawn(async move {
        let serve = axum::serve(listener, app).with_graceful_shutdown(cancel.cancelled_owned());
        if let Err(e) = serve.await {
            tracing::error!(error = %e, "status server error");
        }
    });

    Ok((handle, local_addr))
}

async fn status_handler(State(tracker): State<StatusTracker>) -> impl IntoResponse {
    Json(tracker.snapshot().await)
}

async fn health_handler(State(tracker): State<StatusTracker>) -> impl IntoResponse {
    let state = tracker.renewal_state().await;
    let healthy = !state.is_some_and(|s| s.is_terminated());
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(json!({
            "healthy": healthy,
            "renewal_state": state,
        })),
    )
}
