use std::{process::ExitCode, sync::Arc, time::Duration};

use grafana_demo_app::{
    config::AppConfig,
    metrics::RequestMetrics,
    pipeline::{Pipeline, RandomDelays},
    server::{self, AppState},
    setup,
};

/// How long buffered spans may take to flush on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// How often pending histogram samples are folded into their buckets.
const METRICS_UPKEEP: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    let config = AppConfig::from_env();

    if let Err(err) = setup::setup(&config) {
        tracing::error!(error = %err, "failed to initialize tracer");
        return ExitCode::FAILURE;
    }

    let metrics = match RequestMetrics::new() {
        Ok(metrics) => metrics,
        Err(err) => {
            tracing::error!(error = %err, "failed to initialize metrics");
            setup::teardown(SHUTDOWN_GRACE).await;
            return ExitCode::FAILURE;
        }
    };
    let pipeline = Pipeline::new(config.chaos, Arc::new(RandomDelays));
    let state = AppState::new(pipeline, metrics);
    let upkeep = RequestMetrics::spawn_upkeep(state.metrics.clone(), METRICS_UPKEEP);

    tracing::info!(
        port = %config.port,
        service = %config.service_name,
        chaos_error = config.chaos.error,
        chaos_db_failure = config.chaos.db_failure,
        chaos_slow_db = config.chaos.slow_db,
        "starting server"
    );

    let result = match server::bind(&config.listen_address()).await {
        Ok(listener) => server::serve(listener, state).await,
        Err(err) => Err(err),
    };

    let code = match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "server failed");
            ExitCode::FAILURE
        }
    };

    upkeep.abort();
    setup::teardown(SHUTDOWN_GRACE).await;
    tracing::info!("shutdown complete");
    code
}
