use std::{thread, time::Duration};

use opentelemetry::{
    global,
    propagation::TextMapCompositePropagator,
    trace::TraceError,
    KeyValue,
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{propagation::TraceContextPropagator, runtime, trace::Tracer, Resource};
use tokio::sync::oneshot;
use tracing_core::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::{config::AppConfig, error::SetupError, log_format};

/// Sets up tracing and JSON logging. Spans are batched and exported via otlp
/// over gRPC to [`AppConfig::collector_endpoint`], tagged with
/// [`AppConfig::service_name`]. Log lines go to stdout, filtered by `RUST_LOG`
/// (default `info`).
///
/// This should generally be the first statement of any server binary's main
/// function. If the tracer cannot be built, logging is still installed so the
/// caller can report the error before exiting.
pub fn setup(config: &AppConfig) -> Result<(), SetupError> {
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(opentelemetry_jaeger_propagator::Propagator::new()),
    ]));

    let (telemetry, tracer_result) =
        match init_tracer(&config.service_name, config.collector_endpoint()) {
            Ok(tracer) => (Some(tracing_opentelemetry::layer().with_tracer(tracer)), Ok(())),
            Err(err) => (None, Err(err)),
        };

    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy()
        }))
        .with(telemetry)
        .with(log_format::layer(std::io::stdout))
        .try_init()?;

    tracer_result?;
    Ok(())
}

fn init_tracer(service: &str, endpoint: String) -> Result<Tracer, TraceError> {
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(
            opentelemetry_sdk::trace::config().with_resource(Resource::new(vec![KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                service.to_string(),
            )])),
        )
        .install_batch(runtime::Tokio)
}

/// Flushes buffered spans and shuts the tracer provider down, giving up after
/// `grace`.
///
/// The shutdown runs on a plain thread outside the runtime, so a stuck
/// exporter cannot delay process exit past `grace`.
pub async fn teardown(grace: Duration) {
    let (done_tx, done_rx) = oneshot::channel();
    let spawned = thread::Builder::new()
        .name("tracer-shutdown".to_string())
        .spawn(move || {
            global::shutdown_tracer_provider();
            let _ = done_tx.send(());
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "failed to spawn tracer shutdown thread");
        return;
    }

    match tokio::time::timeout(grace, done_rx).await {
        Ok(Ok(())) => tracing::debug!("tracer provider shut down"),
        Ok(Err(_)) => tracing::warn!("tracer shutdown thread exited early"),
        Err(_) => tracing::warn!(
            grace_ms = grace.as_millis() as u64,
            "tracer shutdown exceeded grace period"
        ),
    }
}
