use std::io;

use metrics_exporter_prometheus::BuildError;
use opentelemetry::trace::TraceError;
use thiserror::Error;
use tracing_subscriber::util::TryInitError;

/// Failures while installing the process-wide telemetry.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to initialize tracer: {0}")]
    Tracer(#[from] TraceError),

    #[error("failed to install subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid histogram buckets: {0}")]
    Buckets(#[from] BuildError),
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server failed: {0}")]
    Serve(#[from] io::Error),
}

/// Faults injected by the simulated pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("simulated business logic failure")]
    BusinessLogic,
}
