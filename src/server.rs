use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use serde::Serialize;
use tokio::{net::TcpListener, time::Instant};
use tracing::{field::Empty, Instrument};

use crate::{
    error::ServeError,
    metrics::{RequestMetrics, EXPOSITION_CONTENT_TYPE},
    middleware::tower::TraceLayer,
    pipeline::Pipeline,
};

pub const GREETING: &str = "hello from grafana demo";

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub metrics: Arc<RequestMetrics>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, metrics: RequestMetrics) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            metrics: Arc::new(metrics),
        }
    }
}

#[derive(Serialize)]
struct Greeting {
    message: &'static str,
}

/// Builds the router. Every path other than `/health` and `/metrics` runs the
/// simulated pipeline, whatever the method.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", any(health))
        .route("/metrics", any(scrape))
        .fallback(handle_root)
        .with_state(state)
        .layer(TraceLayer)
}

/// Serves `router(state)` on `listener` until SIGINT or SIGTERM.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), ServeError> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Binds the HTTP listener.
pub async fn bind(addr: &str) -> Result<TcpListener, ServeError> {
    TcpListener::bind(addr).await.map_err(|source| ServeError::Bind {
        addr: addr.to_string(),
        source,
    })
}

async fn health() -> &'static str {
    "ok"
}

async fn scrape(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        state.metrics.render(),
    )
}

async fn handle_root(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    let path = uri.path().to_string();
    let span = tracing::info_span!(
        "handle_root",
        http.request.method = %method,
        url.path = %path,
        otel.status_code = Empty,
        otel.status_message = Empty,
    );

    // Detached from the connection: a client going away does not cancel the
    // stages in flight.
    let task = tokio::spawn(run_request(state, method, path).instrument(span));
    match task.await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "request task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal failure").into_response()
        }
    }
}

async fn run_request(state: AppState, method: Method, path: String) -> Response {
    let start = Instant::now();
    let result = state.pipeline.run().await;

    let status = match result {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    state
        .metrics
        .record(&path, method.as_str(), status, start.elapsed());
    let latency_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(()) => {
            tracing::info!(
                path = %path,
                method = %method,
                status = status.as_u16(),
                latency_ms,
                "handled request"
            );
            Json(Greeting { message: GREETING }).into_response()
        }
        Err(err) => {
            let span = tracing::Span::current();
            span.record("otel.status_code", "ERROR");
            span.record("otel.status_message", "business logic failed");
            tracing::error!(
                path = %path,
                method = %method,
                status = status.as_u16(),
                latency_ms,
                error = %err,
                "business logic failed"
            );
            (status, "internal failure").into_response()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("signal received, starting graceful shutdown");
}
