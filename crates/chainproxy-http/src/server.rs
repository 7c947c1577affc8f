//! Inbound HTTP listener.
//!
//! A single `POST /` endpoint hands the raw body and headers to the
//! [`RequestRouter`] and writes its answer back with a JSON content type.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use http::{header, HeaderMap};
use tokio::net::TcpListener;

use chainproxy_core::router::{InboundRequest, RequestRouter};

/// Largest inbound body accepted (large `eth_sendRawTransaction` batches fit).
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Build the axum application around `router`.
pub fn app(router: Arc<RequestRouter>) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(router)
}

async fn handle_rpc(
    State(router): State<Arc<RequestRouter>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let resp = router.handle_inbound(InboundRequest { headers, body }).await;
    (
        resp.status,
        [(header::CONTENT_TYPE, resp.content_type())],
        resp.body,
    )
        .into_response()
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn serve<F>(
    listener: TcpListener,
    router: Arc<RequestRouter>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "listening");
    }
    axum::serve(listener, app(router))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signal"),
    }
}
